//! Price implied by a security returning to its historical P/E.

use crate::models::{FairValueEstimate, Provenance, Unavailable};

pub const DEFAULT_HORIZON_YEARS: u32 = 5;

pub fn estimate(
    historical_pe: f64,
    pe_provenance: Provenance,
    eps_ttm: f64,
    current_price: f64,
    growth_pct: f64,
    horizon_years: u32,
) -> Result<FairValueEstimate, Unavailable> {
    if !(eps_ttm.is_finite() && eps_ttm > 0.0) {
        return Err(Unavailable::missing(format!("trailing EPS is not positive ({eps_ttm})")));
    }
    if !(current_price.is_finite() && current_price > 0.0) {
        return Err(Unavailable::missing("no current price"));
    }
    let horizon_years = horizon_years.max(1);

    let fair_value = eps_ttm * historical_pe;
    let margin_of_safety_pct = (fair_value - current_price) / current_price * 100.0;

    let future_eps = eps_ttm * (1.0 + growth_pct / 100.0).powi(horizon_years as i32);
    let projected_price = future_eps * historical_pe;
    let growth_multiple = projected_price / current_price;
    let expected_cagr_pct = (growth_multiple.powf(1.0 / horizon_years as f64) - 1.0) * 100.0;

    Ok(FairValueEstimate {
        historical_pe,
        pe_provenance,
        eps_ttm,
        current_price,
        current_pe: current_price / eps_ttm,
        fair_value,
        margin_of_safety_pct,
        growth_pct,
        horizon_years,
        projected_price,
        expected_cagr_pct,
    })
}

//! Pull a named metric out of a provider report.
//!
//! Providers disagree on field names, so each metric carries a ranked list of
//! candidates. A derivation is consulted only when every candidate is absent or
//! null, and it fails closed.

use crate::models::FundamentalReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Eps,
    NetIncome,
    Shares,
    Revenue,
    TotalAssets,
    TotalLiabilities,
    StockholdersEquity,
    TotalDebt,
    Cash,
    Ebitda,
    Ebit,
    Depreciation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Quotient(Metric, Metric),
    Sum(Metric, Metric),
    Difference(Metric, Metric),
}

impl Metric {
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Self::Eps => &["DilutedEPS", "BasicEPS", "Diluted EPS", "Basic EPS"],
            Self::NetIncome => &[
                "NetIncomeCommonStockholders",
                "Net Income Common Stockholders",
                "NetIncome",
                "Net Income",
            ],
            Self::Shares => &[
                "DilutedAverageShares",
                "BasicAverageShares",
                "Diluted Average Shares",
                "Basic Average Shares",
                "OrdinarySharesNumber",
                "SharesOutstanding",
            ],
            Self::Revenue => &["TotalRevenue", "Total Revenue", "OperatingRevenue"],
            Self::TotalAssets => &["TotalAssets", "Total Assets"],
            Self::TotalLiabilities => &[
                "TotalLiabilitiesNetMinorityInterest",
                "Total Liabilities Net Minority Interest",
                "TotalLiabilities",
            ],
            Self::StockholdersEquity => &["StockholdersEquity", "Stockholders Equity"],
            Self::TotalDebt => &["TotalDebt", "Total Debt"],
            Self::Cash => &[
                "CashAndCashEquivalents",
                "Cash And Cash Equivalents",
                "CashCashEquivalentsAndShortTermInvestments",
            ],
            Self::Ebitda => &["EBITDA", "NormalizedEBITDA", "Normalized EBITDA"],
            Self::Ebit => &["EBIT"],
            Self::Depreciation => &["ReconciledDepreciation", "Reconciled Depreciation"],
        }
    }

    pub fn derivation(self) -> Option<Derivation> {
        match self {
            Self::Eps => Some(Derivation::Quotient(Self::NetIncome, Self::Shares)),
            Self::TotalLiabilities => {
                Some(Derivation::Difference(Self::TotalAssets, Self::StockholdersEquity))
            }
            Self::Ebitda => Some(Derivation::Sum(Self::Ebit, Self::Depreciation)),
            _ => None,
        }
    }

    pub fn extract(self, report: &FundamentalReport) -> Option<f64> {
        extract(report, self.candidates(), self.derivation().as_ref())
    }
}

impl Derivation {
    /// Operands come from candidate fields only; derivations do not nest.
    pub fn apply(&self, report: &FundamentalReport) -> Option<f64> {
        let operand = |m: Metric| first_candidate(report, m.candidates()).filter(|v| *v != 0.0);

        let value = match *self {
            Self::Quotient(a, b) => operand(a)? / operand(b)?,
            Self::Sum(a, b) => operand(a)? + operand(b)?,
            Self::Difference(a, b) => operand(a)? - operand(b)?,
        };
        value.is_finite().then_some(value)
    }
}

/// First present, non-null, finite candidate.
pub fn first_candidate(report: &FundamentalReport, candidates: &[&str]) -> Option<f64> {
    candidates.iter().find_map(|field| report.value(field))
}

pub fn extract(
    report: &FundamentalReport,
    candidates: &[&str],
    derivation: Option<&Derivation>,
) -> Option<f64> {
    first_candidate(report, candidates).or_else(|| derivation.and_then(|d| d.apply(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn report() -> FundamentalReport {
        FundamentalReport::new(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
    }

    #[test]
    fn test_first_non_null_candidate_wins() {
        let mut r = report().with("BasicEPS", 2.0).with("Diluted EPS", 3.0);
        r.fields.insert("DilutedEPS".into(), None);
        assert_eq!(Metric::Eps.extract(&r), Some(2.0));
    }

    #[test]
    fn test_nan_counts_as_null() {
        let r = report().with("DilutedEPS", f64::NAN).with("BasicEPS", 1.5);
        assert_eq!(Metric::Eps.extract(&r), Some(1.5));
    }

    #[test]
    fn test_derivation_used_only_when_candidates_absent() {
        let r = report()
            .with("NetIncomeCommonStockholders", 1_000.0)
            .with("BasicAverageShares", 500.0);
        assert_eq!(Metric::Eps.extract(&r), Some(2.0));

        let r = r.with("DilutedEPS", 1.9);
        assert_eq!(Metric::Eps.extract(&r), Some(1.9));
    }

    #[test]
    fn test_derivation_fails_closed() {
        // missing operand
        let r = report().with("NetIncome", 1_000.0);
        assert_eq!(Metric::Eps.extract(&r), None);
        // zero operand
        let r = report().with("NetIncome", 1_000.0).with("SharesOutstanding", 0.0);
        assert_eq!(Metric::Eps.extract(&r), None);
        // non-finite result
        let r = report().with("NetIncome", f64::MAX).with("SharesOutstanding", 1e-300);
        assert_eq!(Metric::Eps.extract(&r), None);
    }

    #[test]
    fn test_difference_and_sum_derivations() {
        let r = report().with("TotalAssets", 900.0).with("StockholdersEquity", 300.0);
        assert_eq!(Metric::TotalLiabilities.extract(&r), Some(600.0));

        let r = report().with("EBIT", 80.0).with("ReconciledDepreciation", 20.0);
        assert_eq!(Metric::Ebitda.extract(&r), Some(100.0));
    }

    #[test]
    fn test_metric_without_derivation_is_unavailable() {
        assert_eq!(Metric::Revenue.extract(&report()), None);
        assert_eq!(extract(&report(), &["Anything"], None), None);
    }
}

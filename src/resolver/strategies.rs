use crate::config::RatioPolicy;
use crate::models::{
    FundamentalReport, Granularity, Interval, Provenance, RatioKind, RatioSummary, Unavailable,
};
use crate::resolver::{Attempt, RatioRequest, RatioStrategy};
use crate::sources::{Providers, RemoteRatioTableProvider};
use crate::valuation::summarize_history;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

// ── Remote table ─────────────────────────────────────────────────────────────

/// Current ratios from an external statistics page, range-checked.
pub struct RemoteTableStrategy {
    remote: Option<Arc<dyn RemoteRatioTableProvider>>,
    policy: RatioPolicy,
}

impl RemoteTableStrategy {
    pub fn new(remote: Option<Arc<dyn RemoteRatioTableProvider>>, policy: RatioPolicy) -> Self {
        Self { remote, policy }
    }
}

#[async_trait]
impl RatioStrategy for RemoteTableStrategy {
    fn provenance(&self) -> Provenance {
        Provenance::Scraped
    }

    async fn attempt(&self, request: &RatioRequest, kinds: &[RatioKind]) -> Attempt {
        let Some(remote) = &self.remote else {
            return Attempt::new();
        };

        let table = match remote.ratio_table(&request.ticker).await {
            Ok(table) => table,
            Err(e) => {
                warn!("{}: remote ratio table failed: {}", request.ticker, e);
                let reason = Unavailable::source("remote_table", &e);
                return kinds.iter().map(|&k| (k, Err(reason.clone()))).collect();
            }
        };

        kinds
            .iter()
            .map(|&kind| {
                let outcome = match table.get(&kind) {
                    None => Err(Unavailable::missing(format!("{} not in remote table", kind))),
                    Some(&value) if self.policy.bound(kind).contains(value) => {
                        Ok(RatioSummary::point(value))
                    }
                    Some(&value) => Err(Unavailable::ImplausibleValue { kind, value }),
                };
                (kind, outcome)
            })
            .collect()
    }
}

// ── Calculated ───────────────────────────────────────────────────────────────

/// Ratios computed from monthly prices and reported fundamentals. Quarterly
/// reports are tried first; kinds they cannot resolve fall back to annual.
pub struct CalculatedStrategy {
    providers: Providers,
    policy: RatioPolicy,
    report_lag_days: i64,
}

impl CalculatedStrategy {
    pub fn new(providers: Providers, policy: RatioPolicy, report_lag_days: i64) -> Self {
        Self {
            providers,
            policy,
            report_lag_days,
        }
    }

    async fn reports(
        &self,
        ticker: &str,
        granularity: Granularity,
    ) -> Result<Vec<FundamentalReport>, Unavailable> {
        let mut reports = self
            .providers
            .fundamentals
            .reports(ticker, granularity)
            .await
            .map_err(|e| {
                warn!("{}: {} fundamentals failed: {}", ticker, granularity.as_str(), e);
                Unavailable::source("fundamentals", e)
            })?;

        if self.report_lag_days != 0 {
            let lag = Duration::days(self.report_lag_days);
            for report in &mut reports {
                report.effective_date += lag;
            }
        }
        Ok(reports)
    }
}

#[async_trait]
impl RatioStrategy for CalculatedStrategy {
    fn provenance(&self) -> Provenance {
        Provenance::Calculated
    }

    async fn attempt(&self, request: &RatioRequest, kinds: &[RatioKind]) -> Attempt {
        let ticker = &request.ticker;
        let prices = match self
            .providers
            .prices
            .price_history(ticker, request.window_start, Interval::Monthly)
            .await
        {
            Ok(prices) if prices.is_empty() => {
                let since = request.window_start;
                let reason = Unavailable::missing(format!("no monthly prices since {}", since));
                return kinds.iter().map(|&k| (k, Err(reason.clone()))).collect();
            }
            Ok(prices) => prices,
            Err(e) => {
                warn!("{}: price history failed: {}", ticker, e);
                let reason = Unavailable::source("prices", e);
                return kinds.iter().map(|&k| (k, Err(reason.clone()))).collect();
            }
        };

        let mut outcomes = Attempt::new();
        let mut pending = kinds.to_vec();

        for granularity in [Granularity::Quarterly, Granularity::Annual] {
            if pending.is_empty() {
                break;
            }
            let reports = match self.reports(ticker, granularity).await {
                Ok(reports) => reports,
                Err(reason) => {
                    for &kind in &pending {
                        outcomes.insert(kind, Err(reason.clone()));
                    }
                    continue;
                }
            };

            let summaries =
                summarize_history(&prices, &reports, granularity, &pending, &self.policy);
            for (kind, outcome) in summaries {
                if let Err(reason) = &outcome {
                    debug!("{} {} from {} reports: {}", ticker, kind, granularity.as_str(), reason);
                }
                outcomes.insert(kind, outcome);
            }
            pending.retain(|k| !matches!(outcomes.get(k), Some(Ok(_))));
        }
        outcomes
    }
}

// ── Static defaults ──────────────────────────────────────────────────────────

/// Configured fallback values. Kinds without a default are left out.
pub struct StaticDefaultStrategy {
    policy: RatioPolicy,
}

impl StaticDefaultStrategy {
    pub fn new(policy: RatioPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RatioStrategy for StaticDefaultStrategy {
    fn provenance(&self) -> Provenance {
        Provenance::Default
    }

    async fn attempt(&self, _request: &RatioRequest, kinds: &[RatioKind]) -> Attempt {
        kinds
            .iter()
            .filter_map(|&kind| {
                self.policy
                    .default_value(kind)
                    .map(|v| (kind, Ok(RatioSummary::point(v))))
            })
            .collect()
    }
}

//! Prioritized fallback across ratio sources.
//!
//! Each strategy is asked only for the kinds still pending after the ones
//! before it. The first success for a kind is kept as-is; results from
//! different strategies are never blended.

pub mod strategies;

use crate::models::{Provenance, RatioKind, RatioSummary, ResolvedRatio, Unavailable};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub use self::strategies::{CalculatedStrategy, RemoteTableStrategy, StaticDefaultStrategy};

#[derive(Debug, Clone, PartialEq)]
pub struct RatioRequest {
    pub ticker: String,
    pub lookback_years: u32,
    /// Earliest price date considered.
    pub window_start: NaiveDate,
}

pub type Attempt = BTreeMap<RatioKind, Result<RatioSummary, Unavailable>>;

#[async_trait]
pub trait RatioStrategy: Send + Sync {
    fn provenance(&self) -> Provenance;

    /// Outcomes for some or all of `kinds`. A kind left out of the map was
    /// not attempted and keeps whatever failure an earlier strategy recorded.
    async fn attempt(&self, request: &RatioRequest, kinds: &[RatioKind]) -> Attempt;
}

pub struct SourceResolver {
    strategies: Vec<Arc<dyn RatioStrategy>>,
}

impl SourceResolver {
    pub fn new(strategies: Vec<Arc<dyn RatioStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn resolve(
        &self,
        request: &RatioRequest,
        kinds: &[RatioKind],
    ) -> (BTreeMap<RatioKind, ResolvedRatio>, BTreeMap<RatioKind, Unavailable>) {
        let mut resolved = BTreeMap::new();
        let mut failures: BTreeMap<RatioKind, Unavailable> = BTreeMap::new();
        let mut pending: Vec<RatioKind> = kinds.to_vec();
        pending.sort();
        pending.dedup();

        for strategy in &self.strategies {
            if pending.is_empty() {
                break;
            }
            let provenance = strategy.provenance();
            let outcomes = strategy.attempt(request, &pending).await;

            for (kind, outcome) in outcomes {
                if !pending.contains(&kind) {
                    continue;
                }
                match outcome {
                    Ok(summary) => {
                        debug!(
                            "{} {}: {:.2} ({})",
                            request.ticker, kind, summary.central, provenance
                        );
                        failures.remove(&kind);
                        resolved.insert(
                            kind,
                            ResolvedRatio {
                                kind,
                                summary,
                                provenance,
                            },
                        );
                    }
                    Err(reason) => {
                        info!("{} {} not {}: {}", request.ticker, kind, provenance, reason);
                        failures.insert(kind, reason);
                    }
                }
            }
            pending.retain(|k| !resolved.contains_key(k));
        }

        for kind in pending {
            failures
                .entry(kind)
                .or_insert_with(|| Unavailable::missing("no strategy produced a value"));
        }
        (resolved, failures)
    }
}

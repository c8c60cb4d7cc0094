use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::report::{
    report_total, round_cents, CostReport, Discrepancy, EstimationMode, LiveFallback,
};
use crate::domain::resource::ResourceRequest;
use crate::errors::LiveServiceUnavailableError;
use crate::pricing::calculator::{CalculatorSession, CalculatorUrlBuilder};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveLineQuote {
    pub index: usize,
    pub monthly_cost: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveQuote {
    pub lines: Vec<LiveLineQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_monthly_cost: Option<Decimal>,
}

/// Authoritative per-line pricing for a calculator session.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, session: &CalculatorSession) -> Result<LiveQuote, LiveServiceUnavailableError>;
}

/// A line differs when either bound is exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscrepancyTolerance {
    pub absolute: Decimal,
    pub percent: Decimal,
}

impl Default for DiscrepancyTolerance {
    fn default() -> Self {
        Self { absolute: Decimal::new(50, 2), percent: Decimal::from(2) }
    }
}

impl DiscrepancyTolerance {
    fn exceeded(
        &self,
        local: Decimal,
        live: Decimal,
    ) -> Result<Option<Discrepancy>, LiveServiceUnavailableError> {
        let unrepresentable = || {
            LiveServiceUnavailableError::MalformedResponse(format!(
                "quoted amount {live} cannot be compared with local {local}"
            ))
        };
        let difference = live.checked_sub(local).ok_or_else(unrepresentable)?;
        let difference_pct = if local.is_zero() {
            None
        } else {
            let pct = difference
                .abs()
                .checked_div(local.abs())
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(unrepresentable)?;
            Some(pct.round_dp(2))
        };

        let over_absolute = difference.abs() > self.absolute;
        let over_percent = difference_pct.is_some_and(|pct| pct > self.percent);
        Ok((over_absolute || over_percent).then(|| Discrepancy {
            index: 0,
            resource_type: String::new(),
            local_subtotal: local,
            live_subtotal: live,
            difference,
            difference_pct,
        }))
    }
}

/// Local report with the live failure attached; line items, totals and the
/// generation timestamp are kept as estimated.
pub fn fallback_report(local: CostReport, error: &LiveServiceUnavailableError) -> CostReport {
    warn!(
        event_name = "pricing.live.fallback",
        error = %error,
        "live pricing unavailable, keeping local rates"
    );
    CostReport {
        estimation_mode: EstimationMode::LocalOnly,
        calculator_url: None,
        discrepancies: Vec::new(),
        fallback: Some(LiveFallback { reason: error.to_string() }),
        ..local
    }
}

/// Rejects quotes that cannot be priced: negative amounts and repeated
/// line indexes.
fn validate_quote(quote: &LiveQuote) -> Result<(), LiveServiceUnavailableError> {
    let mut seen = BTreeSet::new();
    for line in &quote.lines {
        if line.monthly_cost < Decimal::ZERO {
            return Err(LiveServiceUnavailableError::MalformedResponse(format!(
                "line {} has negative monthly_cost {}",
                line.index, line.monthly_cost
            )));
        }
        if !seen.insert(line.index) {
            return Err(LiveServiceUnavailableError::MalformedResponse(format!(
                "line {} is quoted more than once",
                line.index
            )));
        }
    }
    Ok(())
}

pub struct LiveReconciler<S> {
    source: S,
    calculator: CalculatorUrlBuilder,
    timeout: Duration,
    tolerance: DiscrepancyTolerance,
}

impl<S> LiveReconciler<S>
where
    S: QuoteSource,
{
    pub fn new(source: S, calculator: CalculatorUrlBuilder, timeout: Duration) -> Self {
        Self { source, calculator, timeout, tolerance: DiscrepancyTolerance::default() }
    }

    pub fn with_tolerance(mut self, tolerance: DiscrepancyTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub async fn reconcile(&self, requests: &[ResourceRequest], local: CostReport) -> CostReport {
        self.reconcile_at(requests, local, Utc::now()).await
    }

    /// Never fails: any live pricing problem yields the local report with a
    /// fallback reason attached. `generated_at` stamps reconciled reports only.
    pub async fn reconcile_at(
        &self,
        requests: &[ResourceRequest],
        local: CostReport,
        generated_at: DateTime<Utc>,
    ) -> CostReport {
        let reconciled = match self.fetch(requests).await {
            Ok((session, quote)) => self.merge(&local, session, quote, generated_at),
            Err(error) => Err(error),
        };

        match reconciled {
            Ok(report) => report,
            Err(error) => fallback_report(local, &error),
        }
    }

    async fn fetch(
        &self,
        requests: &[ResourceRequest],
    ) -> Result<(CalculatorSession, LiveQuote), LiveServiceUnavailableError> {
        let session = self
            .calculator
            .session(requests)
            .map_err(|error| LiveServiceUnavailableError::Session(error.to_string()))?;

        let quote = tokio::time::timeout(self.timeout, self.source.quote(&session))
            .await
            .map_err(|_| LiveServiceUnavailableError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        validate_quote(&quote)?;

        Ok((session, quote))
    }

    fn merge(
        &self,
        local: &CostReport,
        session: CalculatorSession,
        quote: LiveQuote,
        generated_at: DateTime<Utc>,
    ) -> Result<CostReport, LiveServiceUnavailableError> {
        let mut quoted = BTreeMap::new();
        for line in quote.lines {
            if line.index >= local.line_items.len() {
                warn!(
                    event_name = "pricing.live.unknown_line",
                    index = line.index,
                    session_id = %session.session_id,
                    "ignoring quote for unknown line"
                );
                continue;
            }
            quoted.insert(line.index, line.monthly_cost);
        }

        let mut discrepancies = Vec::new();
        let mut line_items = Vec::with_capacity(local.line_items.len());
        for line in &local.line_items {
            let Some(live) = quoted.get(&line.index) else {
                line_items.push(line.clone());
                continue;
            };
            let live_line = line.superseded_by_live(*live).ok_or_else(|| {
                LiveServiceUnavailableError::MalformedResponse(format!(
                    "line {} quote {live} implies an unrepresentable unit price",
                    line.index
                ))
            })?;
            if let Some(discrepancy) = self.tolerance.exceeded(line.subtotal, live_line.subtotal)? {
                discrepancies.push(Discrepancy {
                    index: line.index,
                    resource_type: line.resource_type.clone(),
                    ..discrepancy
                });
            }
            line_items.push(live_line);
        }

        let total = report_total(&line_items).ok_or_else(|| {
            LiveServiceUnavailableError::MalformedResponse(
                "quoted lines sum beyond the representable range".to_string(),
            )
        })?;
        if let Some(quoted_total) = quote.total_monthly_cost {
            if round_cents(quoted_total) != total {
                warn!(
                    event_name = "pricing.live.total_mismatch",
                    quoted_total = %quoted_total,
                    computed_total = %total,
                    "live total differs from merged line total"
                );
            }
        }

        info!(
            event_name = "pricing.live.reconciled",
            session_id = %session.session_id,
            live_lines = quoted.len(),
            discrepancies = discrepancies.len(),
            total = %total,
            "live reconciliation completed"
        );

        Ok(CostReport {
            line_items,
            total,
            estimation_mode: EstimationMode::LiveReconciled,
            calculator_url: Some(session.url),
            discrepancies,
            fallback: None,
            generated_at,
            ..local.clone()
        })
    }
}

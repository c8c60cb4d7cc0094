pub mod calculator;
pub mod estimator;
pub mod http;
pub mod inventory;
pub mod live;
pub mod rates;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;
use crate::domain::report::CostReport;
use crate::domain::resource::ResourceRequest;
use crate::errors::{ApplicationError, LiveServiceUnavailableError};

pub use calculator::{CalculatorSession, CalculatorUrlBuilder, DEFAULT_CALCULATOR_BASE_URL};
pub use estimator::LocalEstimator;
pub use http::HttpQuoteSource;
pub use inventory::{parse_inventory, ParseOptions};
pub use live::{
    fallback_report, DiscrepancyTolerance, LiveLineQuote, LiveQuote, LiveReconciler, QuoteSource,
};
pub use rates::{PriceModel, Rate, RateEntry, RateKey, RateTable, RateTableError};

/// Parse, price and optionally reconcile an inventory against a shared rate
/// table.
#[derive(Clone, Debug)]
pub struct PricingService {
    rates: Arc<RateTable>,
    parse_options: ParseOptions,
    calculator: CalculatorUrlBuilder,
    live_timeout: Duration,
    tolerance: DiscrepancyTolerance,
}

impl PricingService {
    pub fn new(rates: Arc<RateTable>, parse_options: ParseOptions) -> Self {
        Self {
            rates,
            parse_options,
            calculator: CalculatorUrlBuilder::default(),
            live_timeout: Duration::from_secs(10),
            tolerance: DiscrepancyTolerance::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let rates = match &config.pricing.rate_table_path {
            Some(path) => RateTable::from_path(path),
            None => RateTable::packaged(),
        }
        .map_err(|error| ApplicationError::RateData(error.to_string()))?;

        info!(
            event_name = "pricing.rates.loaded",
            entries = rates.len(),
            regions = rates.regions().len(),
            custom = config.pricing.rate_table_path.is_some(),
            "rate table loaded"
        );

        let parse_options = ParseOptions {
            default_region: config.pricing.default_region.clone(),
            allow_usage_overrun: config.pricing.allow_usage_overrun,
        };

        Ok(Self {
            calculator: CalculatorUrlBuilder::new(config.live.calculator_base_url.clone()),
            live_timeout: Duration::from_secs(config.live.timeout_secs),
            tolerance: DiscrepancyTolerance {
                absolute: config.live.tolerance_absolute,
                percent: config.live.tolerance_percent,
            },
            ..Self::new(Arc::new(rates), parse_options)
        })
    }

    pub fn with_live_timeout(mut self, timeout: Duration) -> Self {
        self.live_timeout = timeout;
        self
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn parse(&self, raw: &str) -> Result<Vec<ResourceRequest>, ApplicationError> {
        Ok(parse_inventory(raw, &self.parse_options)?)
    }

    pub fn estimate(&self, requests: &[ResourceRequest]) -> Result<CostReport, ApplicationError> {
        Ok(LocalEstimator::new(&self.rates).estimate(requests)?)
    }

    pub fn estimate_from_str(&self, raw: &str) -> Result<CostReport, ApplicationError> {
        let requests = self.parse(raw)?;
        self.estimate(&requests)
    }

    pub fn calculator_session(&self, raw: &str) -> Result<CalculatorSession, ApplicationError> {
        let requests = self.parse(raw)?;
        self.calculator
            .session(&requests)
            .map_err(|error| ApplicationError::Integration(error.to_string()))
    }

    /// Local estimate first; live problems only ever degrade to a fallback.
    pub async fn estimate_live<S>(&self, raw: &str, source: S) -> Result<CostReport, ApplicationError>
    where
        S: QuoteSource,
    {
        let requests = self.parse(raw)?;
        let local = self.estimate(&requests)?;
        let reconciler = LiveReconciler::new(source, self.calculator.clone(), self.live_timeout)
            .with_tolerance(self.tolerance);
        Ok(reconciler.reconcile(&requests, local).await)
    }

    /// Local estimate for when no quote source could be set up at all.
    pub fn estimate_live_unavailable(
        &self,
        raw: &str,
        error: &LiveServiceUnavailableError,
    ) -> Result<CostReport, ApplicationError> {
        let local = self.estimate_from_str(raw)?;
        Ok(fallback_report(local, error))
    }
}

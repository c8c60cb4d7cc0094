pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::report::{
    BillingUnit, CostComponent, CostLineItem, CostReport, Discrepancy, EstimationMode,
    LiveFallback, PriceSource,
};
pub use domain::resource::{ResourceRequest, ServiceKind, SpecValue};
pub use errors::{
    ApplicationError, DomainError, EstimateError, InvalidResourceError, InventoryError,
    LiveServiceUnavailableError, UnpricableResourceError,
};
pub use pricing::{PricingService, QuoteSource, RateTable};

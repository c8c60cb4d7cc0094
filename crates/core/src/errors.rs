use thiserror::Error;

use crate::domain::resource::ServiceKind;

/// A single inventory entry that cannot be accepted. `index` is the entry's
/// zero-based position in `resources`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid resource #{index} field `{field}`: {reason}")]
pub struct InvalidResourceError {
    pub index: usize,
    pub field: String,
    pub reason: String,
}

impl InvalidResourceError {
    pub fn new(index: usize, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { index, field: field.into(), reason: reason.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("inventory document could not be parsed: {0}")]
    Malformed(String),
    #[error("inventory must contain at least one entry under `resources`")]
    Empty,
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "resource #{index} `{resource_type}` cannot be priced: no {service} rate for `{signature}` in `{region}`"
)]
pub struct UnpricableResourceError {
    pub index: usize,
    pub resource_type: String,
    pub service: ServiceKind,
    pub signature: String,
    pub region: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EstimateError {
    #[error(transparent)]
    Unpricable(#[from] UnpricableResourceError),
    #[error("cannot estimate an empty inventory")]
    EmptyInventory,
    #[error("resource #{index} `{resource_type}` cost is too large to represent")]
    Overflow { index: usize, resource_type: String },
    #[error("report total is too large to represent")]
    TotalOverflow,
}

/// Live pricing failures. These never leave the reconciliation adapter; they
/// become the report's fallback reason.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LiveServiceUnavailableError {
    #[error("live pricing timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("live pricing transport failure: {0}")]
    Transport(String),
    #[error("live pricing returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("live pricing response could not be understood: {0}")]
    MalformedResponse(String),
    #[error("calculator session could not be built: {0}")]
    Session(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Estimate(#[from] EstimateError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("rate data failure: {0}")]
    RateData(String),
    #[error("rendering failure: {0}")]
    Rendering(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable machine-readable class for command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Inventory(_)) => "invalid_resource",
            Self::Domain(DomainError::Estimate(EstimateError::Unpricable(_))) => {
                "unpricable_resource"
            }
            Self::Domain(DomainError::Estimate(EstimateError::EmptyInventory)) => "empty_inventory",
            Self::Domain(DomainError::Estimate(
                EstimateError::Overflow { .. } | EstimateError::TotalOverflow,
            )) => "cost_overflow",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::RateData(_) => "rate_data",
            Self::Rendering(_) => "rendering",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "config_validation",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Domain(DomainError::Inventory(_))
            | Self::Domain(DomainError::Estimate(
                EstimateError::EmptyInventory
                | EstimateError::Overflow { .. }
                | EstimateError::TotalOverflow,
            ))
            | Self::Configuration(_) => 2,
            Self::Domain(DomainError::Estimate(EstimateError::Unpricable(_)))
            | Self::Domain(DomainError::InvariantViolation(_))
            | Self::RateData(_) => 3,
            Self::Rendering(_) | Self::Integration(_) => 4,
        }
    }
}

impl From<InventoryError> for ApplicationError {
    fn from(value: InventoryError) -> Self {
        Self::Domain(DomainError::Inventory(value))
    }
}

impl From<EstimateError> for ApplicationError {
    fn from(value: EstimateError) -> Self {
        Self::Domain(DomainError::Estimate(value))
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::report::BillingUnit;
use crate::domain::resource::{ServiceKind, SpecValue};

const PACKAGED_RATES: &str = include_str!("../../data/rates.toml");

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub unit_price: Decimal,
    pub unit: BillingUnit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum PriceModel {
    Flat { rate: Rate },
    Tiered { primary: Rate, secondary: Rate },
}

impl PriceModel {
    pub fn primary(&self) -> &Rate {
        match self {
            Self::Flat { rate } => rate,
            Self::Tiered { primary, .. } => primary,
        }
    }

    pub fn rates(&self) -> Vec<&Rate> {
        match self {
            Self::Flat { rate } => vec![rate],
            Self::Tiered { primary, secondary } => vec![primary, secondary],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateKey {
    pub service: ServiceKind,
    pub signature: String,
    pub region: String,
}

impl RateKey {
    pub fn new(service: ServiceKind, signature: &str, region: &str) -> Self {
        Self {
            service,
            signature: normalize_signature(signature),
            region: region.trim().to_ascii_lowercase(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateEntry {
    pub key: RateKey,
    pub model: PriceModel,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateLookupError {
    #[error("no {service} rate for `{signature}` in `{region}`")]
    NotFound { service: ServiceKind, signature: String, region: String },
    #[error("{service} rate lookup needs spec `{key}`")]
    MissingSpec { service: ServiceKind, key: &'static str },
}

#[derive(Debug, Error)]
pub enum RateTableError {
    #[error("could not read rate sheet `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse rate sheet: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rate sheet row {row}: {message}")]
    InvalidRow { row: usize, message: String },
    #[error("rate sheet has duplicate entry for {service} `{signature}` in `{region}`")]
    Duplicate { service: ServiceKind, signature: String, region: String },
}

/// Exact-match map of (service, spec signature, region) to a price model.
///
/// Immutable once built, so a single table can be shared across threads.
#[derive(Clone, Debug, Default)]
pub struct RateTable {
    entries: HashMap<RateKey, RateEntry>,
}

#[derive(Debug, Deserialize)]
struct RateSheet {
    #[serde(default)]
    rate: Vec<RateRow>,
}

#[derive(Debug, Deserialize)]
struct RateRow {
    service: ServiceKind,
    region: String,
    signature: String,
    unit: BillingUnit,
    usd: Decimal,
    secondary: Option<RateComponentRow>,
}

#[derive(Debug, Deserialize)]
struct RateComponentRow {
    unit: BillingUnit,
    usd: Decimal,
}

impl RateTable {
    /// Rates bundled with the binary.
    pub fn packaged() -> Result<Self, RateTableError> {
        Self::from_toml_str(PACKAGED_RATES)
    }

    pub fn from_path(path: &Path) -> Result<Self, RateTableError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RateTableError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RateTableError> {
        let sheet = toml::from_str::<RateSheet>(raw)?;
        let mut entries = Vec::with_capacity(sheet.rate.len());

        for (row_number, row) in sheet.rate.into_iter().enumerate() {
            let row_number = row_number + 1;
            let invalid = |message: String| RateTableError::InvalidRow { row: row_number, message };

            let allowed = row.service.billing_units();
            if allowed.first() != Some(&row.unit) {
                return Err(invalid(format!(
                    "{} rates must be billed per {} first",
                    row.service,
                    allowed.first().map(BillingUnit::as_str).unwrap_or("?")
                )));
            }
            if row.usd.is_sign_negative() {
                return Err(invalid("price must not be negative".to_string()));
            }
            if row.signature.trim().is_empty() || row.region.trim().is_empty() {
                return Err(invalid("signature and region are required".to_string()));
            }

            let primary = Rate { unit_price: row.usd, unit: row.unit };
            let model = match row.secondary {
                None => PriceModel::Flat { rate: primary },
                Some(secondary) => {
                    if secondary.unit == row.unit || !allowed.contains(&secondary.unit) {
                        return Err(invalid(format!(
                            "secondary unit `{}` is not valid for {}",
                            secondary.unit.as_str(),
                            row.service
                        )));
                    }
                    if secondary.usd.is_sign_negative() {
                        return Err(invalid("price must not be negative".to_string()));
                    }
                    PriceModel::Tiered {
                        primary,
                        secondary: Rate { unit_price: secondary.usd, unit: secondary.unit },
                    }
                }
            };

            entries.push(RateEntry {
                key: RateKey::new(row.service, &row.signature, &row.region),
                model,
            });
        }

        Self::from_entries(entries)
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = RateEntry>,
    ) -> Result<Self, RateTableError> {
        let mut table = HashMap::new();
        for entry in entries {
            let key = entry.key.clone();
            if table.insert(key.clone(), entry).is_some() {
                return Err(RateTableError::Duplicate {
                    service: key.service,
                    signature: key.signature,
                    region: key.region,
                });
            }
        }
        Ok(Self { entries: table })
    }

    pub fn lookup(
        &self,
        service: ServiceKind,
        specs: &BTreeMap<String, SpecValue>,
        region: &str,
    ) -> Result<&RateEntry, RateLookupError> {
        let signature = spec_signature(service, specs)?;
        let key = RateKey::new(service, &signature, region);

        self.entries.get(&key).ok_or(RateLookupError::NotFound {
            service,
            signature: key.signature,
            region: key.region,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted list of regions that carry at least one rate.
    pub fn regions(&self) -> Vec<String> {
        let mut regions: Vec<_> = self.entries.keys().map(|key| key.region.clone()).collect();
        regions.sort();
        regions.dedup();
        regions
    }
}

/// Normalised lookup signature derived from a service's specs.
pub fn spec_signature(
    service: ServiceKind,
    specs: &BTreeMap<String, SpecValue>,
) -> Result<String, RateLookupError> {
    let text = |key: &'static str| {
        specs
            .get(key)
            .map(SpecValue::as_text)
            .ok_or(RateLookupError::MissingSpec { service, key })
    };

    let signature = match service {
        ServiceKind::Ec2 => text("instance_type")?,
        ServiceKind::Rds => format!("{}/{}", text("instance_type")?, text("engine")?),
        ServiceKind::S3 => text("storage_class")?,
        ServiceKind::Sqs => text("queue_type")?,
        ServiceKind::Elasticache => text("node_type")?,
        ServiceKind::Elb => text("lb_type")?,
        ServiceKind::Cloudwatch => "custom-metric".to_string(),
        ServiceKind::Waf => "web-acl".to_string(),
    };

    Ok(normalize_signature(&signature))
}

fn normalize_signature(signature: &str) -> String {
    signature
        .split('/')
        .map(|part| part.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{spec_signature, PriceModel, RateLookupError, RateTable, RateTableError};
    use crate::domain::report::BillingUnit;
    use crate::domain::resource::{ServiceKind, SpecValue};

    fn specs(pairs: &[(&str, &str)]) -> BTreeMap<String, SpecValue> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), SpecValue::Text(value.to_string())))
            .collect()
    }

    #[test]
    fn packaged_sheet_loads_and_covers_reference_rates() {
        let table = RateTable::packaged().expect("packaged rates parse");
        assert!(!table.is_empty());
        assert!(table.regions().contains(&"us-east-1".to_string()));

        let entry = table
            .lookup(ServiceKind::Ec2, &specs(&[("instance_type", "t3.medium")]), "us-east-1")
            .expect("t3.medium is packaged");
        assert_eq!(entry.model.primary().unit_price, Decimal::new(416, 4));

        let entry = table
            .lookup(ServiceKind::S3, &specs(&[("storage_class", "Standard")]), "us-east-1")
            .expect("s3 standard is packaged");
        assert_eq!(entry.model.primary().unit_price, Decimal::new(23, 3));
        assert_eq!(entry.model.primary().unit, BillingUnit::GbMonth);
    }

    #[test]
    fn rds_entries_are_tiered_with_storage() {
        let table = RateTable::packaged().expect("packaged rates parse");
        let entry = table
            .lookup(
                ServiceKind::Rds,
                &specs(&[("instance_type", "db.t3.medium"), ("engine", "MySQL")]),
                "us-east-1",
            )
            .expect("rds mysql is packaged");

        assert!(matches!(
            &entry.model,
            PriceModel::Tiered { secondary, .. } if secondary.unit == BillingUnit::GbMonth
        ));
    }

    #[test]
    fn lookup_is_exact_and_region_scoped() {
        let table = RateTable::from_toml_str(
            r#"
[[rate]]
service = "ec2"
region = "us-east-1"
signature = "t3.medium"
unit = "instance-hour"
usd = "0.0416"
"#,
        )
        .expect("sheet parses");

        let missing_region = table.lookup(
            ServiceKind::Ec2,
            &specs(&[("instance_type", "t3.medium")]),
            "eu-central-1",
        );
        assert_eq!(
            missing_region,
            Err(RateLookupError::NotFound {
                service: ServiceKind::Ec2,
                signature: "t3.medium".to_string(),
                region: "eu-central-1".to_string(),
            })
        );

        let near_miss =
            table.lookup(ServiceKind::Ec2, &specs(&[("instance_type", "t3.mediu")]), "us-east-1");
        assert!(matches!(near_miss, Err(RateLookupError::NotFound { .. })));

        let case_insensitive =
            table.lookup(ServiceKind::Ec2, &specs(&[("instance_type", " T3.Medium ")]), "US-EAST-1");
        assert!(case_insensitive.is_ok());
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let row = r#"
[[rate]]
service = "waf"
region = "us-east-1"
signature = "web-acl"
unit = "month"
usd = "5.00"
"#;
        let error = RateTable::from_toml_str(&format!("{row}{row}")).expect_err("duplicate");
        assert!(matches!(error, RateTableError::Duplicate { service: ServiceKind::Waf, .. }));
    }

    #[test]
    fn rows_with_wrong_unit_or_negative_price_are_rejected() {
        let wrong_unit = RateTable::from_toml_str(
            r#"
[[rate]]
service = "ec2"
region = "us-east-1"
signature = "t3.micro"
unit = "gb-month"
usd = "0.01"
"#,
        );
        assert!(matches!(wrong_unit, Err(RateTableError::InvalidRow { row: 1, .. })));

        let negative = RateTable::from_toml_str(
            r#"
[[rate]]
service = "ec2"
region = "us-east-1"
signature = "t3.micro"
unit = "instance-hour"
usd = "-0.01"
"#,
        );
        assert!(matches!(negative, Err(RateTableError::InvalidRow { .. })));
    }

    #[test]
    fn signature_joins_rds_class_and_engine() {
        let signature = spec_signature(
            ServiceKind::Rds,
            &specs(&[("instance_type", "db.m5.large"), ("engine", " PostgreSQL ")]),
        )
        .expect("signature");
        assert_eq!(signature, "db.m5.large/postgresql");

        assert_eq!(
            spec_signature(ServiceKind::Rds, &specs(&[("instance_type", "db.m5.large")])),
            Err(RateLookupError::MissingSpec { service: ServiceKind::Rds, key: "engine" })
        );
    }
}

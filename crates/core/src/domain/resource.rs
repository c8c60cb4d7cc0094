use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::report::BillingUnit;

/// Hours in a billing month; unspecified usage means 24/7 operation.
pub const FULL_MONTH_HOURS: u32 = 730;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Ec2,
    Rds,
    S3,
    Sqs,
    Elasticache,
    Elb,
    Cloudwatch,
    Waf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecKind {
    Text,
    Number,
}

/// One recognised spec key for a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecRule {
    pub key: &'static str,
    pub kind: SpecKind,
    pub default: Option<&'static str>,
}

impl SpecRule {
    const fn required(key: &'static str, kind: SpecKind) -> Self {
        Self { key, kind, default: None }
    }

    const fn optional(key: &'static str, kind: SpecKind, default: &'static str) -> Self {
        Self { key, kind, default: Some(default) }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

const EC2_SPECS: &[SpecRule] = &[SpecRule::required("instance_type", SpecKind::Text)];
const RDS_SPECS: &[SpecRule] = &[
    SpecRule::required("instance_type", SpecKind::Text),
    SpecRule::required("engine", SpecKind::Text),
    SpecRule::required("storage_gb", SpecKind::Number),
];
const S3_SPECS: &[SpecRule] = &[
    SpecRule::required("storage_gb", SpecKind::Number),
    SpecRule::optional("storage_class", SpecKind::Text, "Standard"),
    SpecRule::optional("requests_thousands", SpecKind::Number, "0"),
];
const SQS_SPECS: &[SpecRule] = &[
    SpecRule::optional("queue_type", SpecKind::Text, "standard"),
    SpecRule::optional("requests_millions", SpecKind::Number, "1"),
];
const ELASTICACHE_SPECS: &[SpecRule] = &[SpecRule::required("node_type", SpecKind::Text)];
const ELB_SPECS: &[SpecRule] = &[SpecRule::optional("lb_type", SpecKind::Text, "application")];
const CLOUDWATCH_SPECS: &[SpecRule] = &[SpecRule::optional("metrics", SpecKind::Number, "1")];
const WAF_SPECS: &[SpecRule] = &[];

impl ServiceKind {
    pub const ALL: [ServiceKind; 8] = [
        Self::Ec2,
        Self::Rds,
        Self::S3,
        Self::Sqs,
        Self::Elasticache,
        Self::Elb,
        Self::Cloudwatch,
        Self::Waf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2 => "ec2",
            Self::Rds => "rds",
            Self::S3 => "s3",
            Self::Sqs => "sqs",
            Self::Elasticache => "elasticache",
            Self::Elb => "elb",
            Self::Cloudwatch => "cloudwatch",
            Self::Waf => "waf",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ec2 => "EC2",
            Self::Rds => "RDS",
            Self::S3 => "S3",
            Self::Sqs => "SQS",
            Self::Elasticache => "ElastiCache",
            Self::Elb => "Elastic Load Balancing",
            Self::Cloudwatch => "CloudWatch",
            Self::Waf => "WAF",
        }
    }

    /// Service code understood by the hosted pricing calculator.
    pub fn calculator_code(&self) -> &'static str {
        match self {
            Self::Ec2 => "AmazonEC2",
            Self::Rds => "AmazonRDS",
            Self::S3 => "AmazonS3",
            Self::Sqs => "AWSQueueService",
            Self::Elasticache => "AmazonElastiCache",
            Self::Elb => "AWSELB",
            Self::Cloudwatch => "AmazonCloudWatch",
            Self::Waf => "awswaf",
        }
    }

    pub fn spec_rules(&self) -> &'static [SpecRule] {
        match self {
            Self::Ec2 => EC2_SPECS,
            Self::Rds => RDS_SPECS,
            Self::S3 => S3_SPECS,
            Self::Sqs => SQS_SPECS,
            Self::Elasticache => ELASTICACHE_SPECS,
            Self::Elb => ELB_SPECS,
            Self::Cloudwatch => CLOUDWATCH_SPECS,
            Self::Waf => WAF_SPECS,
        }
    }

    /// Units a rate sheet may bill this service in, primary first.
    pub fn billing_units(&self) -> &'static [BillingUnit] {
        match self {
            Self::Ec2 | Self::Elasticache | Self::Elb => &[BillingUnit::InstanceHour],
            Self::Rds => &[BillingUnit::InstanceHour, BillingUnit::GbMonth],
            Self::S3 => &[BillingUnit::GbMonth, BillingUnit::ThousandRequests],
            Self::Sqs => &[BillingUnit::MillionRequests],
            Self::Cloudwatch => &[BillingUnit::MetricMonth],
            Self::Waf => &[BillingUnit::Month],
        }
    }

    pub fn supported_names() -> String {
        Self::ALL.iter().map(ServiceKind::as_str).collect::<Vec<_>>().join("|")
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownService(pub String);

impl FromStr for ServiceKind {
    type Err = UnknownService;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ec2" | "compute" => Ok(Self::Ec2),
            "rds" | "managed-database" | "database" => Ok(Self::Rds),
            "s3" | "object-storage" => Ok(Self::S3),
            "sqs" | "queue" => Ok(Self::Sqs),
            "elasticache" | "cache" => Ok(Self::Elasticache),
            "elb" | "load-balancer" => Ok(Self::Elb),
            "cloudwatch" | "monitoring" => Ok(Self::Cloudwatch),
            "waf" | "firewall" => Ok(Self::Waf),
            _ => Err(UnknownService(value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Number(Decimal),
    Text(String),
}

impl SpecValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(value) => value.normalize().to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<Decimal>().ok(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub service: ServiceKind,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub specs: BTreeMap<String, SpecValue>,
    pub region: String,
    pub quantity: u32,
    pub usage_hours: Decimal,
}

impl ResourceRequest {
    pub fn spec_text(&self, key: &str) -> Option<String> {
        self.specs.get(key).map(SpecValue::as_text)
    }

    pub fn spec_number(&self, key: &str) -> Option<Decimal> {
        self.specs.get(key).and_then(SpecValue::as_number)
    }

    /// Billable quantity of `unit` for this request: instance-hours, GB-months and so on.
    /// `None` when the product does not fit in a `Decimal`.
    pub fn billable_units(&self, unit: BillingUnit) -> Option<Decimal> {
        let quantity = Decimal::from(self.quantity);
        let spec = |key: &str| self.spec_number(key).unwrap_or(Decimal::ZERO);

        let per_unit = match unit {
            BillingUnit::InstanceHour => self.usage_hours,
            BillingUnit::GbMonth => spec("storage_gb"),
            BillingUnit::ThousandRequests => spec("requests_thousands"),
            BillingUnit::MillionRequests => spec("requests_millions"),
            BillingUnit::MetricMonth => spec("metrics"),
            BillingUnit::Month => Decimal::ONE,
        };
        quantity.checked_mul(per_unit)
    }

    /// Human label like `web_server (t3.medium)`.
    pub fn label(&self) -> String {
        let detail = match self.service {
            ServiceKind::Ec2 | ServiceKind::Rds => self.spec_text("instance_type"),
            ServiceKind::S3 => self.spec_text("storage_class"),
            ServiceKind::Sqs => self.spec_text("queue_type"),
            ServiceKind::Elasticache => self.spec_text("node_type"),
            ServiceKind::Elb => self.spec_text("lb_type"),
            ServiceKind::Cloudwatch | ServiceKind::Waf => None,
        };

        match detail {
            Some(detail) => format!("{} ({detail})", self.resource_type),
            None => self.resource_type.clone(),
        }
    }
}

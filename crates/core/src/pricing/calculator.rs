use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::report::CURRENCY;
use crate::domain::resource::{ResourceRequest, ServiceKind};

pub const DEFAULT_CALCULATOR_BASE_URL: &str = "https://calculator.aws/#/estimate";
const SESSION_ID_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorComponent {
    pub name: String,
    pub unit: String,
    pub monthly_quantity: Decimal,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorResource {
    pub index: usize,
    pub service: String,
    pub name: String,
    pub description: String,
    pub region: String,
    pub quantity: u32,
    pub cost_components: Vec<CalculatorComponent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorEstimate {
    pub resources: Vec<CalculatorResource>,
    pub currency: String,
    pub timeframe: String,
}

/// A shareable estimate: payload, stable id and calculator link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatorSession {
    pub session_id: String,
    pub url: String,
    pub estimate: CalculatorEstimate,
}

#[derive(Clone, Debug)]
pub struct CalculatorUrlBuilder {
    base_url: String,
}

impl Default for CalculatorUrlBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CALCULATOR_BASE_URL)
    }
}

impl CalculatorUrlBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self, requests: &[ResourceRequest]) -> Result<CalculatorSession, serde_json::Error> {
        let estimate = CalculatorEstimate {
            resources: requests
                .iter()
                .enumerate()
                .map(|(index, request)| calculator_resource(index, request))
                .collect(),
            currency: CURRENCY.to_string(),
            timeframe: "monthly".to_string(),
        };

        let payload = serde_json::to_vec(&estimate)?;
        let hash = blake3::hash(&payload).to_hex();
        let session_id = hash.as_str()[..SESSION_ID_LEN].to_string();
        let encoded = urlencoding::encode(&STANDARD.encode(&payload)).into_owned();
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}data={encoded}", self.base_url);

        Ok(CalculatorSession { session_id, url, estimate })
    }

    pub fn url(&self, requests: &[ResourceRequest]) -> Result<String, serde_json::Error> {
        self.session(requests).map(|session| session.url)
    }
}

fn calculator_resource(index: usize, request: &ResourceRequest) -> CalculatorResource {
    let mut cost_components = Vec::new();
    let text = |key: &str| request.spec_text(key).unwrap_or_default();
    let number = |key: &str| request.spec_number(key).unwrap_or(Decimal::ZERO);

    match request.service {
        ServiceKind::Ec2 => {
            let instance_type = text("instance_type");
            cost_components.push(component(
                "EC2 Instance",
                "hours",
                request.usage_hours,
                [
                    ("family", instance_family(&instance_type)),
                    ("instanceType", instance_type.clone()),
                    ("operatingSystem", "Linux".to_string()),
                ],
            ));
        }
        ServiceKind::Rds => {
            let instance_type = text("instance_type");
            cost_components.push(component(
                "Database Instance",
                "hours",
                request.usage_hours,
                [
                    ("databaseEngine", engine_display(&text("engine")).to_string()),
                    ("deploymentOption", "Single-AZ".to_string()),
                    ("family", instance_family(&instance_type)),
                    ("instanceType", instance_type.clone()),
                ],
            ));
            cost_components.push(component(
                "Storage",
                "GB",
                number("storage_gb"),
                [("storageType", "General Purpose".to_string())],
            ));
        }
        ServiceKind::S3 => {
            cost_components.push(component(
                "Storage",
                "GB",
                number("storage_gb"),
                [("storageClass", storage_class_display(&text("storage_class")).to_string())],
            ));
            cost_components.push(component("Requests", "1K requests", number("requests_thousands"), []));
        }
        ServiceKind::Sqs => cost_components.push(component(
            "Requests",
            "1M requests",
            number("requests_millions"),
            [("queueType", text("queue_type"))],
        )),
        ServiceKind::Elasticache => {
            let node_type = text("node_type");
            cost_components.push(component(
                "Cache Node",
                "hours",
                request.usage_hours,
                [("family", instance_family(&node_type)), ("nodeType", node_type.clone())],
            ));
        }
        ServiceKind::Elb => cost_components.push(component(
            "Load Balancer",
            "hours",
            request.usage_hours,
            [("loadBalancerType", text("lb_type"))],
        )),
        ServiceKind::Cloudwatch => {
            cost_components.push(component("Custom Metrics", "metrics", number("metrics"), []))
        }
        ServiceKind::Waf => cost_components.push(component("Web ACL", "months", Decimal::ONE, [])),
    }

    CalculatorResource {
        index,
        service: request.service.calculator_code().to_string(),
        name: request.label(),
        description: format!("{} - {} x {}", request.resource_type, request.quantity, request.label()),
        region: request.region.clone(),
        quantity: request.quantity,
        cost_components,
    }
}

fn component<const N: usize>(
    name: &str,
    unit: &str,
    monthly_quantity: Decimal,
    attributes: [(&str, String); N],
) -> CalculatorComponent {
    CalculatorComponent {
        name: name.to_string(),
        unit: unit.to_string(),
        monthly_quantity: monthly_quantity.normalize(),
        attributes: attributes.into_iter().map(|(key, value)| (key.to_string(), value)).collect(),
    }
}

/// `db.t3.medium` -> `db.t3`, `m5.large` -> `m5`.
fn instance_family(instance_type: &str) -> String {
    match instance_type.rsplit_once('.') {
        Some((family, _)) => family.to_string(),
        None => instance_type.to_string(),
    }
}

fn engine_display(engine: &str) -> &str {
    match engine.to_ascii_lowercase().as_str() {
        "mysql" => "MySQL",
        "postgres" | "postgresql" => "PostgreSQL",
        "mariadb" => "MariaDB",
        "oracle" => "Oracle",
        "sqlserver" => "SQL Server",
        _ => engine,
    }
}

fn storage_class_display(storage_class: &str) -> &str {
    match storage_class.to_ascii_lowercase().as_str() {
        "standard" => "General Purpose",
        "standard-ia" | "standardia" => "Infrequent Access",
        "onezone-ia" | "onezoneia" => "One Zone-IA",
        "intelligent-tiering" => "Intelligent-Tiering",
        "glacier" => "Glacier Flexible Retrieval",
        "deep-archive" | "deeparchive" => "Glacier Deep Archive",
        _ => storage_class,
    }
}

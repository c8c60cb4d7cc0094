use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::domain::resource::{
    ResourceRequest, ServiceKind, SpecKind, SpecValue, FULL_MONTH_HOURS,
};
use crate::errors::{InvalidResourceError, InventoryError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Region applied to entries that omit `region`.
    pub default_region: Option<String>,
    /// Accept `usage_hours` above a full month.
    pub allow_usage_overrun: bool,
}

#[derive(Debug, Deserialize)]
struct RawInventory {
    #[serde(default)]
    resources: Option<Vec<RawResource>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResource {
    service: Option<Value>,
    #[serde(rename = "type")]
    resource_type: Option<Value>,
    specs: Option<Value>,
    region: Option<Value>,
    quantity: Option<Value>,
    usage_hours: Option<Value>,
}

/// Parses a `resources:` document (YAML or JSON) into validated requests.
///
/// The first invalid entry rejects the whole document.
pub fn parse_inventory(
    raw: &str,
    options: &ParseOptions,
) -> Result<Vec<ResourceRequest>, InventoryError> {
    let document = serde_yaml_ng::from_str::<RawInventory>(raw)
        .map_err(|error| InventoryError::Malformed(error.to_string()))?;

    let entries = document.resources.unwrap_or_default();
    if entries.is_empty() {
        return Err(InventoryError::Empty);
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| validate_entry(index, entry, options).map_err(InventoryError::from))
        .collect()
}

fn validate_entry(
    index: usize,
    raw: RawResource,
    options: &ParseOptions,
) -> Result<ResourceRequest, InvalidResourceError> {
    let invalid = |field: &str, reason: String| InvalidResourceError::new(index, field, reason);

    let service_name = match raw.service {
        Some(Value::String(name)) => name,
        Some(other) => return Err(invalid("service", format!("expected a string, got `{other}`"))),
        None => return Err(invalid("service", "is required".to_string())),
    };
    let service = ServiceKind::from_str(&service_name).map_err(|_| {
        invalid(
            "service",
            format!(
                "unrecognized service `{service_name}` (expected {})",
                ServiceKind::supported_names()
            ),
        )
    })?;

    let resource_type = match raw.resource_type {
        Some(Value::String(label)) if !label.trim().is_empty() => label.trim().to_string(),
        Some(Value::String(_)) | None => {
            return Err(invalid("type", "a non-empty role label is required".to_string()))
        }
        Some(other) => return Err(invalid("type", format!("expected a string, got `{other}`"))),
    };

    let specs = validate_specs(index, service, raw.specs)?;

    let region = match raw.region {
        Some(Value::String(region)) => region,
        Some(other) => return Err(invalid("region", format!("expected a string, got `{other}`"))),
        None => match &options.default_region {
            Some(region) => region.clone(),
            None => return Err(invalid("region", "is required".to_string())),
        },
    };
    let region = region.trim().to_ascii_lowercase();
    if !is_region_identifier(&region) {
        return Err(invalid(
            "region",
            format!("`{region}` is not a region identifier (lowercase letters, digits, `-`)"),
        ));
    }

    let quantity = match raw.quantity {
        None => 1,
        Some(value) => value
            .as_u64()
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value >= 1)
            .ok_or_else(|| invalid("quantity", format!("must be an integer >= 1, got `{value}`")))?,
    };

    let usage_hours = match raw.usage_hours {
        None => Decimal::from(FULL_MONTH_HOURS),
        Some(value) => decimal_from_value(&value)
            .ok_or_else(|| invalid("usage_hours", format!("must be a number, got `{value}`")))?,
    };
    if usage_hours.is_sign_negative() {
        return Err(invalid("usage_hours", "must be >= 0".to_string()));
    }
    if usage_hours > Decimal::from(FULL_MONTH_HOURS) && !options.allow_usage_overrun {
        return Err(invalid(
            "usage_hours",
            format!("{usage_hours} exceeds a full month ({FULL_MONTH_HOURS} hours)"),
        ));
    }

    Ok(ResourceRequest { service, resource_type, specs, region, quantity, usage_hours })
}

fn validate_specs(
    index: usize,
    service: ServiceKind,
    raw: Option<Value>,
) -> Result<BTreeMap<String, SpecValue>, InvalidResourceError> {
    let raw = match raw {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(InvalidResourceError::new(
                index,
                "specs",
                format!("expected a mapping, got `{other}`"),
            ))
        }
    };

    let mut specs = BTreeMap::new();
    for (key, value) in raw {
        let value = match value {
            Value::String(text) => SpecValue::Text(text),
            Value::Number(number) => match decimal_from_number(&number) {
                Some(number) => SpecValue::Number(number),
                None => {
                    return Err(InvalidResourceError::new(
                        index,
                        format!("specs.{key}"),
                        format!("`{number}` is not representable"),
                    ))
                }
            },
            Value::Bool(flag) => SpecValue::Text(flag.to_string()),
            other => {
                return Err(InvalidResourceError::new(
                    index,
                    format!("specs.{key}"),
                    format!("expected a scalar, got `{other}`"),
                ))
            }
        };
        specs.insert(key, value);
    }

    for rule in service.spec_rules() {
        let field = format!("specs.{}", rule.key);
        match specs.get(rule.key) {
            None => match rule.default {
                Some(default) => {
                    let value = match rule.kind {
                        SpecKind::Number => Decimal::from_str(default)
                            .map(SpecValue::Number)
                            .unwrap_or_else(|_| SpecValue::Text(default.to_string())),
                        SpecKind::Text => SpecValue::Text(default.to_string()),
                    };
                    specs.insert(rule.key.to_string(), value);
                }
                None => {
                    return Err(InvalidResourceError::new(
                        index,
                        field,
                        format!("is required for {service}"),
                    ))
                }
            },
            Some(value) => match rule.kind {
                SpecKind::Number => {
                    let number = value.as_number().ok_or_else(|| {
                        InvalidResourceError::new(index, &field, "must be a number")
                    })?;
                    if number.is_sign_negative() {
                        return Err(InvalidResourceError::new(index, field, "must be >= 0"));
                    }
                    specs.insert(rule.key.to_string(), SpecValue::Number(number));
                }
                SpecKind::Text => {
                    if value.as_text().trim().is_empty() {
                        return Err(InvalidResourceError::new(index, field, "must not be empty"));
                    }
                }
            },
        }
    }

    Ok(specs)
}

fn is_region_identifier(region: &str) -> bool {
    !region.is_empty()
        && region.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        && !region.starts_with('-')
        && !region.ends_with('-')
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => decimal_from_number(number),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

fn decimal_from_number(number: &Number) -> Option<Decimal> {
    if let Some(value) = number.as_i64() {
        return Some(Decimal::from(value));
    }
    if let Some(value) = number.as_u64() {
        return Some(Decimal::from(value));
    }

    let text = number.to_string();
    Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
}

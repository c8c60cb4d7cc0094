//! Statement of Work rendering.
//!
//! A [`SowSpec`] is loaded from YAML, validated, and rendered through a Tera
//! template. The `standard` template is compiled into the binary; operators
//! can add their own `*.md.tera` files from a template directory.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use cloudplan_core::domain::report::CostReport;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{debug, info};

pub const DEFAULT_TEMPLATE: &str = "standard";
const TEMPLATE_SUFFIX: &str = ".md.tera";
const STANDARD_TEMPLATE: &str = include_str!("../templates/standard.md.tera");

#[derive(Debug, thiserror::Error)]
pub enum SowError {
    #[error("SOW config could not be parsed: {0}")]
    Parse(String),
    #[error("SOW field `{field}` {reason}")]
    Invalid { field: String, reason: String },
    #[error("unknown SOW template `{name}` (available: {available})")]
    UnknownTemplate { name: String, available: String },
    #[error("template error: {0}")]
    Template(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub phase: String,
    pub duration: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMilestone {
    pub milestone: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SowCost {
    pub total: Decimal,
    #[serde(default)]
    pub schedule: Vec<PaymentMilestone>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SowSpec {
    pub project_name: String,
    pub client_name: String,
    pub project_description: String,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelinePhase>,
    pub cost: SowCost,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl SowSpec {
    pub fn from_yaml(raw: &str) -> Result<Self, SowError> {
        let spec: Self =
            serde_yaml_ng::from_str(raw).map_err(|error| SowError::Parse(error.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), SowError> {
        let invalid = |field: &str, reason: &str| SowError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        for (field, value) in [
            ("project_name", &self.project_name),
            ("client_name", &self.client_name),
            ("project_description", &self.project_description),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if self.scope.iter().all(|item| item.trim().is_empty()) {
            return Err(invalid("scope", "needs at least one item"));
        }
        if self.deliverables.iter().all(|item| item.trim().is_empty()) {
            return Err(invalid("deliverables", "needs at least one item"));
        }
        if self.timeline.is_empty() {
            return Err(invalid("timeline", "needs at least one phase"));
        }
        if let Some(index) = self.timeline.iter().position(|phase| phase.phase.trim().is_empty()) {
            return Err(invalid(&format!("timeline[{index}].phase"), "must not be empty"));
        }

        if self.cost.total.is_sign_negative() {
            return Err(invalid("cost.total", "must not be negative"));
        }
        if let Some(index) =
            self.cost.schedule.iter().position(|item| item.amount.is_sign_negative())
        {
            return Err(invalid(&format!("cost.schedule[{index}].amount"), "must not be negative"));
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(invalid("end_date", "must not be before start_date"));
            }
        }

        Ok(())
    }
}

/// `money` filter: two decimals with thousands separators. Accepts numbers and
/// decimal strings, since `Decimal` serialises as a string.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::Number(number) => Decimal::from_str(&number.to_string())
            .map_err(|error| tera::Error::msg(format!("money filter: {error}")))?,
        tera::Value::String(text) => Decimal::from_str(text.trim())
            .map_err(|error| tera::Error::msg(format!("money filter: {error}")))?,
        tera::Value::Null => Decimal::ZERO,
        other => return Err(tera::Error::msg(format!("money filter expects a number, got {other}"))),
    };
    Ok(tera::Value::String(format_money(amount)))
}

pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    let fixed = format!("{:.2}", rounded.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (position, digit) in whole.chars().enumerate() {
        if position > 0 && (whole.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{cents}")
}

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

#[derive(Debug)]
pub struct SowRenderer {
    tera: Tera,
}

impl SowRenderer {
    /// Renderer with only the embedded templates.
    pub fn new() -> Result<Self, SowError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_template(&format!("{DEFAULT_TEMPLATE}{TEMPLATE_SUFFIX}"), STANDARD_TEMPLATE)
            .map_err(|error| SowError::Template(error.to_string()))?;
        Ok(Self { tera })
    }

    /// Embedded templates plus every `*.md.tera` file in `dir`. A file named
    /// `standard.md.tera` replaces the embedded one.
    pub fn with_template_dir(dir: &Path) -> Result<Self, SowError> {
        let mut renderer = Self::new()?;
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if path.is_file() && file_name.ends_with(TEMPLATE_SUFFIX) {
                files.push((path.clone(), file_name.to_string()));
            }
        }
        files.sort();

        for (path, name) in &files {
            debug!(event_name = "render.sow.template_loaded", template = %name, "loaded SOW template");
            renderer
                .tera
                .add_template_file(path, Some(name.as_str()))
                .map_err(|error| SowError::Template(error.to_string()))?;
        }
        Ok(renderer)
    }

    pub fn from_dir(dir: Option<&Path>) -> Result<Self, SowError> {
        match dir {
            Some(dir) => Self::with_template_dir(dir),
            None => Self::new(),
        }
    }

    pub fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tera
            .get_template_names()
            .filter_map(|name| name.strip_suffix(TEMPLATE_SUFFIX))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn render(
        &self,
        spec: &SowSpec,
        template: &str,
        estimate: Option<&CostReport>,
    ) -> Result<String, SowError> {
        spec.validate()?;

        let template_name = format!("{template}{TEMPLATE_SUFFIX}");
        if !self.tera.get_template_names().any(|name| name == template_name) {
            return Err(SowError::UnknownTemplate {
                name: template.to_string(),
                available: self.list_templates().join(", "),
            });
        }

        let mut context =
            Context::from_serialize(spec).map_err(|error| SowError::Template(error.to_string()))?;
        context.insert("start_date", &spec.start_date.map(display_date));
        context.insert("end_date", &spec.end_date.map(display_date));
        context.insert("estimate", &estimate);

        let document = self
            .tera
            .render(&template_name, &context)
            .map_err(|error| SowError::Template(error.to_string()))?;

        info!(
            event_name = "render.sow.completed",
            template = %template,
            project = %spec.project_name,
            with_estimate = estimate.is_some(),
            "SOW rendered"
        );
        Ok(document)
    }

    pub async fn render_to_file(
        &self,
        spec: &SowSpec,
        template: &str,
        estimate: Option<&CostReport>,
        output: &Path,
    ) -> Result<(), SowError> {
        let document = self.render(spec, template, estimate)?;
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, document).await?;
        Ok(())
    }
}

fn display_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

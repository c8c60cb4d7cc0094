use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::resource::ServiceKind;
use crate::errors::EstimateError;

pub const CURRENCY: &str = "USD";
pub const MULTI_REGION: &str = "multi-region";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BillingUnit {
    InstanceHour,
    GbMonth,
    ThousandRequests,
    MillionRequests,
    MetricMonth,
    Month,
}

impl BillingUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstanceHour => "instance-hour",
            Self::GbMonth => "gb-month",
            Self::ThousandRequests => "thousand-requests",
            Self::MillionRequests => "million-requests",
            Self::MetricMonth => "metric-month",
            Self::Month => "month",
        }
    }

    pub fn component_name(&self) -> &'static str {
        match self {
            Self::InstanceHour => "usage",
            Self::GbMonth => "storage",
            Self::ThousandRequests | Self::MillionRequests => "requests",
            Self::MetricMonth => "metrics",
            Self::Month => "subscription",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMode {
    LocalOnly,
    LiveReconciled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Local,
    Live,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostComponent {
    pub name: String,
    pub unit: BillingUnit,
    pub unit_price: Decimal,
    pub units: Decimal,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLineItem {
    pub index: usize,
    pub service: ServiceKind,
    pub resource_type: String,
    pub label: String,
    pub region: String,
    pub unit_price: Decimal,
    pub quantity_units: Decimal,
    pub unit: BillingUnit,
    pub components: Vec<CostComponent>,
    pub subtotal: Decimal,
    pub unrounded_subtotal: Decimal,
    pub currency: String,
    pub source: PriceSource,
}

impl CostLineItem {
    /// Replaces a locally priced line with an authoritative quoted amount.
    /// `None` when the implied unit price is not representable.
    pub fn superseded_by_live(&self, quoted: Decimal) -> Option<Self> {
        let unit_price = if self.quantity_units.is_zero() {
            quoted
        } else {
            quoted
                .checked_div(self.quantity_units)?
                .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
        };

        Some(Self {
            unit_price,
            components: vec![CostComponent {
                name: "live quote".to_string(),
                unit: self.unit,
                unit_price,
                units: self.quantity_units,
                amount: quoted,
            }],
            subtotal: round_cents(quoted),
            unrounded_subtotal: quoted,
            source: PriceSource::Live,
            ..self.clone()
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub index: usize,
    pub resource_type: String,
    pub local_subtotal: Decimal,
    pub live_subtotal: Decimal,
    pub difference: Decimal,
    pub difference_pct: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveFallback {
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    pub line_items: Vec<CostLineItem>,
    pub total: Decimal,
    pub currency: String,
    pub region: String,
    pub generated_at: DateTime<Utc>,
    pub estimation_mode: EstimationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculator_url: Option<String>,
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<LiveFallback>,
}

/// Rounds half away from zero to whole cents.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Report total: the exact line amounts are summed first and rounded once.
/// `None` on overflow.
pub fn report_total(line_items: &[CostLineItem]) -> Option<Decimal> {
    line_items
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.unrounded_subtotal))
        .map(round_cents)
}

fn report_region(line_items: &[CostLineItem]) -> String {
    let mut regions = line_items.iter().map(|line| line.region.as_str());
    let Some(first) = regions.next() else {
        return String::new();
    };

    if regions.all(|region| region == first) {
        first.to_string()
    } else {
        MULTI_REGION.to_string()
    }
}

impl CostReport {
    pub fn local(
        line_items: Vec<CostLineItem>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, EstimateError> {
        Ok(Self {
            total: report_total(&line_items).ok_or(EstimateError::TotalOverflow)?,
            currency: CURRENCY.to_string(),
            region: report_region(&line_items),
            line_items,
            generated_at,
            estimation_mode: EstimationMode::LocalOnly,
            calculator_url: None,
            discrepancies: Vec::new(),
            fallback: None,
        })
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn render_text(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();

        let _ = writeln!(out, "Cloud Cost Estimate");
        let _ = writeln!(out, "{rule}");
        for line in &self.line_items {
            let _ = writeln!(out, "{} [{}]", line.label, line.service.display_name());
            let _ = writeln!(
                out,
                "  unit price: ${} per {} x {} = ${:.2} ({})",
                line.unit_price.normalize(),
                line.unit.as_str(),
                line.quantity_units.normalize(),
                line.subtotal,
                match line.source {
                    PriceSource::Local => "local",
                    PriceSource::Live => "live",
                }
            );
            for component in line.components.iter().skip(1) {
                let _ = writeln!(
                    out,
                    "  + {}: ${} per {} x {} = ${:.2}",
                    component.name,
                    component.unit_price.normalize(),
                    component.unit.as_str(),
                    component.units.normalize(),
                    round_cents(component.amount)
                );
            }
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Total monthly cost: ${:.2} {}", self.total, self.currency);
        let _ = writeln!(out, "Region: {}", self.region);
        let mode = match self.estimation_mode {
            EstimationMode::LocalOnly => "local_only",
            EstimationMode::LiveReconciled => "live_reconciled",
        };
        let _ = writeln!(out, "Mode: {mode}");

        if let Some(url) = &self.calculator_url {
            let _ = writeln!(out, "Calculator: {url}");
        }
        if let Some(fallback) = &self.fallback {
            let _ = writeln!(out, "Live pricing unavailable, showing local rates: {}", fallback.reason);
        }
        if !self.discrepancies.is_empty() {
            let _ = writeln!(out, "Discrepancies:");
            for item in &self.discrepancies {
                let _ = writeln!(
                    out,
                    "  #{} {}: local ${:.2} vs live ${:.2} ({:+})",
                    item.index, item.resource_type, item.local_subtotal, item.live_subtotal, item.difference
                );
            }
        }

        out
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::report::{round_cents, CostComponent, CostLineItem, CostReport, PriceSource, CURRENCY};
use crate::domain::resource::ResourceRequest;
use crate::errors::{EstimateError, UnpricableResourceError};
use crate::pricing::rates::{RateLookupError, RateTable};

/// Offline estimator over an injected rate table. Pure computation; never
/// performs I/O.
#[derive(Clone, Copy, Debug)]
pub struct LocalEstimator<'a> {
    rates: &'a RateTable,
}

impl<'a> LocalEstimator<'a> {
    pub fn new(rates: &'a RateTable) -> Self {
        Self { rates }
    }

    pub fn estimate(&self, requests: &[ResourceRequest]) -> Result<CostReport, EstimateError> {
        self.estimate_at(requests, Utc::now())
    }

    /// All-or-nothing: the first unpricable request aborts the report.
    pub fn estimate_at(
        &self,
        requests: &[ResourceRequest],
        generated_at: DateTime<Utc>,
    ) -> Result<CostReport, EstimateError> {
        if requests.is_empty() {
            return Err(EstimateError::EmptyInventory);
        }

        let line_items = requests
            .iter()
            .enumerate()
            .map(|(index, request)| self.price_line(index, request))
            .collect::<Result<Vec<_>, _>>()?;

        let report = CostReport::local(line_items, generated_at)?;
        debug!(
            event_name = "pricing.estimate.completed",
            line_count = report.line_items.len(),
            total = %report.total,
            region = %report.region,
            "local estimate completed"
        );
        Ok(report)
    }

    pub fn price_line(&self, index: usize, request: &ResourceRequest) -> Result<CostLineItem, EstimateError> {
        let unpricable = |signature: String| UnpricableResourceError {
            index,
            resource_type: request.resource_type.clone(),
            service: request.service,
            signature,
            region: request.region.clone(),
        };
        let overflow =
            || EstimateError::Overflow { index, resource_type: request.resource_type.clone() };

        let entry = match self.rates.lookup(request.service, &request.specs, &request.region) {
            Ok(entry) => entry,
            Err(RateLookupError::NotFound { signature, .. }) => return Err(unpricable(signature).into()),
            Err(RateLookupError::MissingSpec { key, .. }) => {
                return Err(unpricable(format!("<missing {key}>")).into())
            }
        };

        let mut components = Vec::new();
        for rate in entry.model.rates() {
            let units = request.billable_units(rate.unit).ok_or_else(overflow)?;
            components.push(CostComponent {
                name: rate.unit.component_name().to_string(),
                unit: rate.unit,
                unit_price: rate.unit_price,
                units,
                amount: rate.unit_price.checked_mul(units).ok_or_else(overflow)?,
            });
        }

        let primary = entry.model.primary();
        let unrounded_subtotal = components
            .iter()
            .try_fold(Decimal::ZERO, |total, component| total.checked_add(component.amount))
            .ok_or_else(overflow)?;

        Ok(CostLineItem {
            index,
            service: request.service,
            resource_type: request.resource_type.clone(),
            label: request.label(),
            region: request.region.clone(),
            unit_price: primary.unit_price,
            quantity_units: request.billable_units(primary.unit).ok_or_else(overflow)?,
            unit: primary.unit,
            components,
            subtotal: round_cents(unrounded_subtotal),
            unrounded_subtotal,
            currency: CURRENCY.to_string(),
            source: PriceSource::Local,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::LocalEstimator;
    use crate::domain::report::{BillingUnit, EstimationMode, PriceSource};
    use crate::domain::resource::{ResourceRequest, ServiceKind, SpecValue};
    use crate::errors::EstimateError;
    use crate::pricing::rates::{PriceModel, Rate, RateEntry, RateKey, RateTable};

    fn flat(service: ServiceKind, signature: &str, usd: Decimal, unit: BillingUnit) -> RateEntry {
        RateEntry {
            key: RateKey::new(service, signature, "us-east-1"),
            model: PriceModel::Flat { rate: Rate { unit_price: usd, unit } },
        }
    }

    fn request(service: ServiceKind, label: &str, specs: &[(&str, SpecValue)]) -> ResourceRequest {
        ResourceRequest {
            service,
            resource_type: label.to_string(),
            specs: specs
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect::<BTreeMap<_, _>>(),
            region: "us-east-1".to_string(),
            quantity: 1,
            usage_hours: Decimal::from(730),
        }
    }

    fn text(value: &str) -> SpecValue {
        SpecValue::Text(value.to_string())
    }

    #[test]
    fn line_items_follow_input_order() {
        let table = RateTable::from_entries([
            flat(ServiceKind::Ec2, "t3.small", Decimal::new(208, 4), BillingUnit::InstanceHour),
            flat(ServiceKind::Ec2, "t3.large", Decimal::new(832, 4), BillingUnit::InstanceHour),
            flat(ServiceKind::Waf, "web-acl", Decimal::from(5), BillingUnit::Month),
        ])
        .expect("table");

        let requests = vec![
            request(ServiceKind::Waf, "edge", &[]),
            request(ServiceKind::Ec2, "large", &[("instance_type", text("t3.large"))]),
            request(ServiceKind::Ec2, "small", &[("instance_type", text("t3.small"))]),
        ];

        let report = LocalEstimator::new(&table).estimate(&requests).expect("estimate");
        let order: Vec<_> = report.line_items.iter().map(|line| line.resource_type.as_str()).collect();
        assert_eq!(order, ["edge", "large", "small"]);
        assert_eq!(report.line_items.iter().map(|line| line.index).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(report.estimation_mode, EstimationMode::LocalOnly);
        assert!(report.line_items.iter().all(|line| line.source == PriceSource::Local));
    }

    #[test]
    fn unpricable_resource_aborts_whole_report() {
        let table = RateTable::from_entries([flat(
            ServiceKind::Ec2,
            "t3.small",
            Decimal::new(208, 4),
            BillingUnit::InstanceHour,
        )])
        .expect("table");

        let requests = vec![
            request(ServiceKind::Ec2, "ok", &[("instance_type", text("t3.small"))]),
            request(ServiceKind::Ec2, "gpu_box", &[("instance_type", text("p4d.24xlarge"))]),
        ];

        let error = LocalEstimator::new(&table).estimate(&requests).expect_err("must fail");
        match error {
            EstimateError::Unpricable(error) => {
                assert_eq!(error.index, 1);
                assert_eq!(error.resource_type, "gpu_box");
                assert_eq!(error.signature, "p4d.24xlarge");
                assert_eq!(error.region, "us-east-1");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn tiered_rate_adds_storage_component() {
        let table = RateTable::from_entries([RateEntry {
            key: RateKey::new(ServiceKind::Rds, "db.t3.medium/mysql", "us-east-1"),
            model: PriceModel::Tiered {
                primary: Rate { unit_price: Decimal::new(68, 3), unit: BillingUnit::InstanceHour },
                secondary: Rate { unit_price: Decimal::new(115, 3), unit: BillingUnit::GbMonth },
            },
        }])
        .expect("table");

        let requests = vec![request(
            ServiceKind::Rds,
            "database",
            &[
                ("instance_type", text("db.t3.medium")),
                ("engine", text("mysql")),
                ("storage_gb", SpecValue::Number(Decimal::from(100))),
            ],
        )];

        let report = LocalEstimator::new(&table).estimate(&requests).expect("estimate");
        let line = &report.line_items[0];
        // 730 * 0.068 = 49.64, 100 * 0.115 = 11.50
        assert_eq!(line.components.len(), 2);
        assert_eq!(line.unit_price, Decimal::new(68, 3));
        assert_eq!(line.quantity_units, Decimal::from(730));
        assert_eq!(line.subtotal, Decimal::new(6114, 2));
        assert_eq!(report.total, Decimal::new(6114, 2));
    }

    #[test]
    fn empty_inventory_is_an_error() {
        let table = RateTable::default();
        assert_eq!(
            LocalEstimator::new(&table).estimate(&[]),
            Err(EstimateError::EmptyInventory)
        );
    }

    #[test]
    fn oversized_storage_is_an_overflow_error() {
        let table = RateTable::from_entries([flat(
            ServiceKind::S3,
            "standard",
            Decimal::new(23, 3),
            BillingUnit::GbMonth,
        )])
        .expect("table");
        let mut archive = request(
            ServiceKind::S3,
            "archive",
            &[
                ("storage_class", text("standard")),
                ("storage_gb", text("70000000000000000000000000000")),
            ],
        );
        archive.quantity = 2;

        assert_eq!(
            LocalEstimator::new(&table).estimate(&[archive]),
            Err(EstimateError::Overflow { index: 0, resource_type: "archive".to_string() })
        );
    }

    #[test]
    fn estimate_at_is_deterministic() {
        let table = RateTable::from_entries([flat(
            ServiceKind::Ec2,
            "t3.small",
            Decimal::new(208, 4),
            BillingUnit::InstanceHour,
        )])
        .expect("table");
        let requests = vec![request(ServiceKind::Ec2, "web", &[("instance_type", text("t3.small"))])];
        let at = Utc::now();

        let estimator = LocalEstimator::new(&table);
        assert_eq!(estimator.estimate_at(&requests, at), estimator.estimate_at(&requests, at));
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloudplan_core::domain::report::{EstimationMode, PriceSource};
use cloudplan_core::errors::LiveServiceUnavailableError;
use cloudplan_core::pricing::{
    CalculatorSession, LiveLineQuote, LiveQuote, ParseOptions, PricingService, QuoteSource,
    RateTable,
};
use cloudplan_core::{ApplicationError, DomainError, EstimateError};
use rust_decimal::Decimal;

const WEB_ONLY: &str = r#"
resources:
  - service: ec2
    type: web_server
    specs:
      instance_type: t3.medium
    region: us-east-1
    quantity: 2
    usage_hours: 730
"#;

const WEB_AND_ASSETS: &str = r#"
resources:
  - service: ec2
    type: web_server
    specs:
      instance_type: t3.medium
    region: us-east-1
    quantity: 2
    usage_hours: 730
  - service: s3
    type: static_assets
    specs:
      storage_gb: 500
      storage_class: Standard
    region: us-east-1
"#;

fn service() -> PricingService {
    let rates = RateTable::packaged().expect("packaged rates");
    PricingService::new(Arc::new(rates), ParseOptions::default())
}

#[test]
fn single_instance_line_matches_hand_calculation() {
    let report = service().estimate_from_str(WEB_ONLY).expect("estimate");

    assert_eq!(report.line_items.len(), 1);
    let line = &report.line_items[0];
    assert_eq!(line.unrounded_subtotal, Decimal::new(60_736, 3));
    assert_eq!(line.subtotal, Decimal::new(6074, 2));
    assert_eq!(report.total, Decimal::new(6074, 2));
    assert_eq!(report.estimation_mode, EstimationMode::LocalOnly);
    assert_eq!(report.region, "us-east-1");
}

#[test]
fn storage_line_adds_to_the_total() {
    let report = service().estimate_from_str(WEB_AND_ASSETS).expect("estimate");

    assert_eq!(report.line_items[1].subtotal, Decimal::new(1150, 2));
    assert_eq!(report.total, Decimal::new(7224, 2));
}

#[test]
fn total_is_rounded_sum_of_unrounded_subtotals() {
    let raw = r#"
resources:
  - { service: ec2, type: a, specs: { instance_type: t3.nano }, region: us-east-1, usage_hours: 1 }
  - { service: ec2, type: b, specs: { instance_type: t3.nano }, region: us-east-1, usage_hours: 1 }
  - { service: ec2, type: c, specs: { instance_type: t3.nano }, region: us-east-1, usage_hours: 1 }
"#;
    let report = service().estimate_from_str(raw).expect("estimate");
    let unrounded: Decimal = report.line_items.iter().map(|line| line.unrounded_subtotal).sum();

    // 3 x 0.0052 = 0.0156 -> 0.02, per-line rounding would give 0.03
    assert_eq!(report.total, Decimal::new(2, 2));
    assert_eq!(report.total, unrounded.round_dp(2));
}

#[test]
fn line_order_matches_input_order() {
    let raw = r#"
resources:
  - { service: waf, type: edge_firewall, region: us-east-1 }
  - { service: rds, type: database, specs: { instance_type: db.t3.medium, engine: mysql, storage_gb: 20 }, region: us-east-1 }
  - { service: sqs, type: jobs, region: us-east-1 }
  - { service: ec2, type: web_server, specs: { instance_type: t3.small }, region: us-east-1 }
"#;
    let report = service().estimate_from_str(raw).expect("estimate");
    let types: Vec<_> = report.line_items.iter().map(|line| line.resource_type.as_str()).collect();

    assert_eq!(types, ["edge_firewall", "database", "jobs", "web_server"]);
}

#[test]
fn missing_rate_aborts_without_partial_report() {
    let raw = r#"
resources:
  - { service: ec2, type: web_server, specs: { instance_type: t3.medium }, region: us-east-1 }
  - { service: ec2, type: tokyo_box, specs: { instance_type: t3.medium }, region: ap-northeast-1 }
"#;
    let error = service().estimate_from_str(raw).expect_err("must fail");

    match error {
        ApplicationError::Domain(DomainError::Estimate(EstimateError::Unpricable(error))) => {
            assert_eq!(error.index, 1);
            assert_eq!(error.resource_type, "tokyo_box");
            assert_eq!(error.region, "ap-northeast-1");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

struct StubQuote(LiveQuote);

#[async_trait]
impl QuoteSource for StubQuote {
    async fn quote(&self, _: &CalculatorSession) -> Result<LiveQuote, LiveServiceUnavailableError> {
        Ok(self.0.clone())
    }
}

struct NeverAnswers;

#[async_trait]
impl QuoteSource for NeverAnswers {
    async fn quote(&self, _: &CalculatorSession) -> Result<LiveQuote, LiveServiceUnavailableError> {
        std::future::pending().await
    }
}

fn stub() -> StubQuote {
    StubQuote(LiveQuote {
        lines: vec![
            LiveLineQuote { index: 0, monthly_cost: Decimal::new(6074, 2) },
            LiveLineQuote { index: 1, monthly_cost: Decimal::new(1200, 2) },
        ],
        total_monthly_cost: Some(Decimal::new(7274, 2)),
    })
}

#[tokio::test]
async fn live_reconciliation_is_idempotent_apart_from_timestamp() {
    let service = service();
    let mut first = service.estimate_live(WEB_AND_ASSETS, stub()).await.expect("first");
    let second = service.estimate_live(WEB_AND_ASSETS, stub()).await.expect("second");

    assert_eq!(first.estimation_mode, EstimationMode::LiveReconciled);
    assert_eq!(first.total, Decimal::new(7274, 2));
    assert!(first.line_items.iter().all(|line| line.source == PriceSource::Live));
    assert_eq!(first.calculator_url, second.calculator_url);

    first.generated_at = second.generated_at;
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );
}

#[tokio::test]
async fn discrepancy_is_informational() {
    let report = service().estimate_live(WEB_AND_ASSETS, stub()).await.expect("report");

    // 11.50 local vs 12.00 live: 0.50 absolute is within tolerance, 4.35% is not
    assert_eq!(report.discrepancies.len(), 1);
    assert_eq!(report.discrepancies[0].index, 1);
    assert_eq!(report.discrepancies[0].difference, Decimal::new(50, 2));
}

#[tokio::test]
async fn live_timeout_degrades_to_local_report() {
    let service = service().with_live_timeout(Duration::from_millis(25));
    let report = service.estimate_live(WEB_AND_ASSETS, NeverAnswers).await.expect("report");

    assert_eq!(report.estimation_mode, EstimationMode::LocalOnly);
    assert!(report.is_fallback());
    assert!(report.calculator_url.is_none());
    assert_eq!(report.total, Decimal::new(7224, 2));
}

#[test]
fn oversized_inventory_is_an_error_not_a_crash() {
    let raw = r#"
resources:
  - service: s3
    type: archive
    quantity: 2
    specs: { storage_gb: "70000000000000000000000000000" }
    region: us-east-1
"#;
    let error = service().estimate_from_str(raw).expect_err("must fail");

    assert!(matches!(
        &error,
        ApplicationError::Domain(DomainError::Estimate(EstimateError::Overflow { index: 0, .. }))
    ));
    assert_eq!(error.exit_code(), 2);
}

#[tokio::test]
async fn extreme_live_quote_degrades_to_local_report() {
    let raw = r#"
resources:
  - { service: ec2, type: burst, specs: { instance_type: t3.medium }, region: us-east-1, usage_hours: 0.01 }
"#;
    let quote = StubQuote(LiveQuote {
        lines: vec![LiveLineQuote {
            index: 0,
            monthly_cost: "70000000000000000000000000000".parse().expect("decimal"),
        }],
        total_monthly_cost: None,
    });

    let report = service().estimate_live(raw, quote).await.expect("report");

    assert!(report.is_fallback());
    assert_eq!(report.line_items[0].source, PriceSource::Local);
}

#[test]
fn unavailable_live_source_still_yields_local_report() {
    let error = LiveServiceUnavailableError::Transport("tls backend unavailable".to_string());
    let report = service().estimate_live_unavailable(WEB_AND_ASSETS, &error).expect("report");

    assert_eq!(report.estimation_mode, EstimationMode::LocalOnly);
    assert_eq!(report.total, Decimal::new(7224, 2));
    assert!(report.fallback.expect("fallback").reason.contains("tls backend unavailable"));
}

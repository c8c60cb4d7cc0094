use std::sync::Arc;

use cloudplan_core::pricing::ParseOptions;
use cloudplan_core::{PricingService, RateTable};
use cloudplan_render::{DiagramRenderer, DiagramSpec, SowRenderer, SowSpec};

const INVENTORY: &str = r#"
resources:
  - service: ec2
    type: web_server
    specs: { instance_type: t3.medium }
    region: us-east-1
    quantity: 2
  - service: s3
    type: static_assets
    specs: { storage_gb: 500, storage_class: Standard }
    region: us-east-1
"#;

const SOW: &str = r#"
project_name: Storefront
client_name: Example Retail
project_description: Host the storefront on AWS.
scope: [Provision compute, Configure storage]
deliverables: [Runbook]
timeline:
  - { phase: Build, duration: 3 weeks }
cost:
  total: 1234567
"#;

fn service() -> PricingService {
    PricingService::new(Arc::new(RateTable::packaged().expect("rates")), ParseOptions::default())
}

#[test]
fn sow_embeds_the_estimate_table_and_total() {
    let report = service().estimate_from_str(INVENTORY).expect("estimate");
    let spec = SowSpec::from_yaml(SOW).expect("sow");

    let document = SowRenderer::new()
        .expect("renderer")
        .render(&spec, "standard", Some(&report))
        .expect("render");

    assert!(document.contains("Total project cost: $1,234,567.00"));
    assert!(document.contains("| web_server (t3.medium) | us-east-1 | $60.74 |"));
    assert!(document.contains("Estimated monthly total: $72.24 USD"));
}

#[test]
fn sow_without_estimate_omits_the_section() {
    let spec = SowSpec::from_yaml(SOW).expect("sow");

    let document =
        SowRenderer::new().expect("renderer").render(&spec, "standard", None).expect("render");

    assert!(!document.contains("Estimated Monthly Infrastructure"));
}

#[tokio::test]
async fn inventory_diagram_is_written_as_dot() {
    let requests = service().parse(INVENTORY).expect("inventory");
    let spec = DiagramSpec::from_inventory(&requests);
    let dir = tempfile::tempdir().expect("tempdir");

    let output = DiagramRenderer::without_graphviz()
        .render(&spec, &dir.path().join("store"))
        .await
        .expect("render");

    assert_eq!(output.dot_path, dir.path().join("store.dot"));
    assert!(output.image_path.is_none());
    assert_eq!(std::fs::read_to_string(&output.dot_path).expect("dot"), spec.to_dot());
}

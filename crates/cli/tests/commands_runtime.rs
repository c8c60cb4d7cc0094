use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use cloudplan_agent::LlmClient;
use cloudplan_cli::commands::diagram::{self, DiagramSource};
use cloudplan_cli::commands::estimate::{self, EstimateArgs};
use cloudplan_cli::commands::generate::{self, GenerateArgs, GenerateKind};
use cloudplan_cli::commands::sow::{self, SowArgs};
use cloudplan_cli::commands::{calculator_url, config, doctor};
use cloudplan_core::config::{AppConfig, LoadOptions};
use cloudplan_render::DiagramRenderer;
use serde_json::Value;
use tempfile::TempDir;

const INVENTORY: &str = r#"
resources:
  - service: ec2
    type: web_server
    specs:
      instance_type: t3.medium
    region: us-east-1
    quantity: 2
  - service: ec2
    type: app_server
    specs:
      instance_type: t3.small
    region: us-east-1
  - service: rds
    type: database
    specs:
      instance_type: db.t3.medium
      engine: mysql
      storage_gb: 20
    region: us-east-1
"#;

const SOW_CONFIG: &str = r#"
project_name: Portal Migration
client_name: Acme Corporation
project_description: Move the customer portal to AWS.
scope:
  - Provision compute and database
deliverables:
  - Terraform modules
timeline:
  - phase: Build
    duration: 4 weeks
cost:
  total: 25000
  schedule:
    - milestone: Kickoff
      amount: 5000
    - milestone: Go-live
      amount: 20000
"#;

#[test]
fn estimate_prints_text_report() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(&dir, "resources.yaml", INVENTORY);

        let result = estimate::run(LoadOptions::default(), &estimate_args(resources, false));
        assert_eq!(result.exit_code, 0, "expected successful estimate: {}", result.output);
        assert!(result.output.starts_with("Cloud Cost Estimate"));
        assert!(result.output.contains("Mode: local_only"));
        assert!(result.output.contains("Region: us-east-1"));
    });
}

#[test]
fn estimate_json_report_keeps_input_order() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(&dir, "resources.yaml", INVENTORY);

        let result = estimate::run(LoadOptions::default(), &estimate_args(resources, true));
        assert_eq!(result.exit_code, 0);

        let report = parse_payload(&result.output);
        let types: Vec<&str> = report["line_items"]
            .as_array()
            .expect("line items")
            .iter()
            .filter_map(|line| line["resource_type"].as_str())
            .collect();
        assert_eq!(types, ["web_server", "app_server", "database"]);
        assert_eq!(report["line_items"][0]["subtotal"], "60.74");
    });
}

#[test]
fn estimate_writes_output_file() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(&dir, "resources.yaml", INVENTORY);
        let output = dir.path().join("reports/estimate.txt");
        let args = EstimateArgs { output: Some(output.clone()), ..estimate_args(resources, false) };

        let result = estimate::run(LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "estimate");
        assert_eq!(payload["status"], "ok");
        let written = fs::read_to_string(output).expect("report file");
        assert!(written.contains("Total monthly cost"));
    });
}

#[test]
fn estimate_rejects_unknown_service_with_input_exit_code() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(
            &dir,
            "resources.yaml",
            "resources:\n  - { service: lambda, type: fn, region: us-east-1 }\n",
        );

        let result = estimate::run(LoadOptions::default(), &estimate_args(resources, false));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_resource");
    });
}

#[test]
fn estimate_reports_unpricable_region_with_pricing_exit_code() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(
            &dir,
            "resources.yaml",
            "resources:\n  - { service: ec2, type: web, specs: { instance_type: t3.medium }, region: ap-northeast-1 }\n",
        );

        let result = estimate::run(LoadOptions::default(), &estimate_args(resources, false));
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "unpricable_resource");
    });
}

#[test]
fn live_estimate_without_endpoint_is_a_config_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(&dir, "resources.yaml", INVENTORY);
        let args = EstimateArgs { live: true, ..estimate_args(resources, false) };

        let result = estimate::run(LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn missing_inventory_file_is_an_input_failure() {
    with_env(&[], || {
        let args = estimate_args(PathBuf::from("does/not/exist.yaml"), false);

        let result = estimate::run(LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "input_unreadable");
    });
}

#[test]
fn calculator_url_is_deterministic() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(&dir, "resources.yaml", INVENTORY);

        let first = parse_payload(&calculator_url::run(LoadOptions::default(), &resources).output);
        let second = parse_payload(&calculator_url::run(LoadOptions::default(), &resources).output);

        assert_eq!(first["status"], "ok");
        assert_eq!(first["data"]["url"], second["data"]["url"]);
        assert_eq!(first["data"]["session_id"].as_str().map(str::len), Some(16));
        assert_eq!(first["data"]["resources"], 3);
    });
}

#[test]
fn diagram_from_inventory_writes_dot_without_graphviz() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let resources = write(&dir, "resources.yaml", INVENTORY);
        let output = dir.path().join("architecture.png");

        let result = diagram::run_with(
            LoadOptions::default(),
            &DiagramSource::Resources(resources),
            &output,
            DiagramRenderer::without_graphviz(),
        );
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["image_path"], Value::Null);
        let dot = fs::read_to_string(dir.path().join("architecture.dot")).expect("dot file");
        assert!(dot.contains("web_server_1"));
        assert!(dot.contains("DB Connection"));
    });
}

#[test]
fn diagram_config_with_unknown_node_is_rejected() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let config = write(
            &dir,
            "diagram.yaml",
            "nodes:\n  - { name: web, service: ec2 }\nconnections:\n  - { from: web, to: db }\n",
        );

        let result = diagram::run_with(
            LoadOptions::default(),
            &DiagramSource::Config(config),
            &dir.path().join("out.png"),
            DiagramRenderer::without_graphviz(),
        );
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_diagram");
    });
}

#[test]
fn sow_renders_with_estimate_section() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let args = SowArgs {
            config: write(&dir, "sow.yaml", SOW_CONFIG),
            template: "standard".to_string(),
            resources: Some(write(&dir, "resources.yaml", INVENTORY)),
            output: dir.path().join("out/sow.md"),
        };

        let result = sow::run(LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let document = fs::read_to_string(&args.output).expect("sow document");
        assert!(document.starts_with("# Statement of Work: Portal Migration"));
        assert!(document.contains("$25,000.00"));
        assert!(document.contains("Estimated Monthly Infrastructure"));
    });
}

#[test]
fn sow_with_unknown_template_lists_available_ones() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let args = SowArgs {
            config: write(&dir, "sow.yaml", SOW_CONFIG),
            template: "fancy".to_string(),
            resources: None,
            output: dir.path().join("sow.md"),
        };

        let result = sow::run(LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_sow");
        assert!(payload["message"].as_str().unwrap_or_default().contains("standard"));
    });
}

#[test]
fn sow_templates_include_custom_directory() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "brief.md.tera", "# {{ project_name }}\n");
    let dir_path = dir.path().display().to_string();

    with_env(&[("CLOUDPLAN_TEMPLATES_SOW_DIR", dir_path.as_str())], || {
        let payload = parse_payload(&sow::list_templates(LoadOptions::default()).output);

        assert_eq!(payload["data"]["templates"], serde_json::json!(["brief", "standard"]));
    });
}

struct CannedModel(&'static str);

#[async_trait]
impl LlmClient for CannedModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[test]
fn generate_writes_validated_resources() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let args = GenerateArgs {
            input: write(&dir, "notes.txt", "Two web servers on t3.medium."),
            kind: GenerateKind::Resources,
            output_dir: dir.path().join("generated"),
            with_sow: false,
        };
        let reply = "```yaml\nresources:\n  - service: ec2\n    type: web_server\n    specs:\n      instance_type: t3.medium\n    quantity: 2\n```";

        let result = generate::run_with_client(&AppConfig::default(), CannedModel(reply), &args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let written =
            fs::read_to_string(dir.path().join("generated/resources.yaml")).expect("resources");
        assert!(written.starts_with("resources:"));
    });
}

#[test]
fn generate_rejects_reply_that_fails_schema() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let args = GenerateArgs {
            input: write(&dir, "notes.txt", "A diagram please."),
            kind: GenerateKind::Diagram,
            output_dir: dir.path().join("generated"),
            with_sow: false,
        };

        let result = generate::run_with_client(
            &AppConfig::default(),
            CannedModel("nodes:\n  - { name: web, service: mainframe }\n"),
            &args,
        );
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "schema_mismatch");
        assert!(!dir.path().join("generated/diagram.yaml").exists());
    });
}

#[test]
fn generate_requires_api_key_for_hosted_provider() {
    with_env(&[("CLOUDPLAN_LLM_PROVIDER", "anthropic")], || {
        let dir = TempDir::new().expect("tempdir");
        let args = GenerateArgs {
            input: write(&dir, "notes.txt", "anything"),
            kind: GenerateKind::All,
            output_dir: dir.path().to_path_buf(),
            with_sow: false,
        };

        let result = generate::run(LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_defaults() {
    with_env(&[], || {
        let result = doctor::run(LoadOptions::default(), true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        let names: Vec<&str> = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(
            names,
            ["config_validation", "rate_table", "sow_templates", "graphviz", "live_pricing", "llm_credentials"]
        );
    });
}

#[test]
fn doctor_fails_on_invalid_config() {
    with_env(&[("CLOUDPLAN_LIVE_TIMEOUT_SECS", "0")], || {
        let result = doctor::run(LoadOptions::default(), false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [skip] rate_table"));
    });
}

#[test]
fn config_reports_env_source() {
    with_env(&[("CLOUDPLAN_LLM_MODEL", "claude-test")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.contains("- llm.model = claude-test (source: env (CLOUDPLAN_LLM_MODEL))"));
        assert!(output.contains("- pricing.default_region = us-east-1 (source: default)"));
    });
}

fn estimate_args(resources: PathBuf, json: bool) -> EstimateArgs {
    EstimateArgs { resources, live: false, json, output: None }
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLOUDPLAN_PRICING_DEFAULT_REGION",
        "CLOUDPLAN_PRICING_RATE_TABLE_PATH",
        "CLOUDPLAN_PRICING_ALLOW_USAGE_OVERRUN",
        "CLOUDPLAN_LIVE_ENABLED",
        "CLOUDPLAN_LIVE_ENDPOINT",
        "CLOUDPLAN_LIVE_CALCULATOR_BASE_URL",
        "CLOUDPLAN_LIVE_TIMEOUT_SECS",
        "CLOUDPLAN_LIVE_TOLERANCE_ABSOLUTE",
        "CLOUDPLAN_LIVE_TOLERANCE_PERCENT",
        "CLOUDPLAN_LLM_PROVIDER",
        "CLOUDPLAN_LLM_API_KEY",
        "CLOUDPLAN_LLM_BASE_URL",
        "CLOUDPLAN_LLM_MODEL",
        "CLOUDPLAN_LLM_TIMEOUT_SECS",
        "CLOUDPLAN_LLM_MAX_TOKENS",
        "CLOUDPLAN_TEMPLATES_SOW_DIR",
        "CLOUDPLAN_LOGGING_LEVEL",
        "CLOUDPLAN_LOGGING_FORMAT",
        "CLOUDPLAN_LOG_LEVEL",
        "CLOUDPLAN_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

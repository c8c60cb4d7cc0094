use cloudplan_core::config::{AppConfig, LoadOptions};
use cloudplan_core::PricingService;
use cloudplan_render::{DiagramRenderer, SowRenderer};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Readiness checks. Only failures affect the exit code; a missing Graphviz
/// install or unused live pricing is reported but not fatal.
pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { 2 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_rate_table(&config));
            checks.push(check_templates(&config));
            checks.push(check_graphviz());
            checks.push(check_live_pricing(&config));
            checks.push(check_llm(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["rate_table", "sow_templates", "graphviz", "live_pricing", "llm_credentials"]
            {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_rate_table(config: &AppConfig) -> DoctorCheck {
    match PricingService::from_config(config) {
        Ok(service) => DoctorCheck {
            name: "rate_table",
            status: CheckStatus::Pass,
            details: format!(
                "{} rates across {} region(s)",
                service.rates().len(),
                service.rates().regions().len()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "rate_table", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_templates(config: &AppConfig) -> DoctorCheck {
    match SowRenderer::from_dir(config.templates.sow_dir.as_deref()) {
        Ok(renderer) => DoctorCheck {
            name: "sow_templates",
            status: CheckStatus::Pass,
            details: format!("available: {}", renderer.list_templates().join(", ")),
        },
        Err(error) => DoctorCheck {
            name: "sow_templates",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_graphviz() -> DoctorCheck {
    if DiagramRenderer::new().has_graphviz() {
        DoctorCheck {
            name: "graphviz",
            status: CheckStatus::Pass,
            details: "`dot` found on PATH".to_string(),
        }
    } else {
        DoctorCheck {
            name: "graphviz",
            status: CheckStatus::Warn,
            details: "`dot` not found; diagrams are written as DOT source only".to_string(),
        }
    }
}

fn check_live_pricing(config: &AppConfig) -> DoctorCheck {
    match (&config.live.endpoint, config.live.enabled) {
        (Some(endpoint), enabled) => DoctorCheck {
            name: "live_pricing",
            status: CheckStatus::Pass,
            details: format!(
                "endpoint `{endpoint}` ({})",
                if enabled { "enabled by default" } else { "used with --live" }
            ),
        },
        (None, _) => DoctorCheck {
            name: "live_pricing",
            status: CheckStatus::Skipped,
            details: "no live.endpoint configured; estimates are local only".to_string(),
        },
    }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    match config.llm.require_credentials() {
        Ok(()) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Pass,
            details: format!("provider `{}`, model `{}`", config.llm.provider.as_str(), config.llm.model),
        },
        Err(error) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Warn,
            details: format!("{error}; `generate` is unavailable"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

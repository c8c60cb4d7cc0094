use std::path::PathBuf;
use std::time::Duration;

use cloudplan_core::config::LoadOptions;
use cloudplan_core::pricing::HttpQuoteSource;
use cloudplan_core::{CostReport, PricingService};
use serde_json::json;
use tracing::info;

use crate::commands::{load_config, read_input, runtime, write_output, CommandResult};

const COMMAND: &str = "estimate";

#[derive(Debug, Clone, Default)]
pub struct EstimateArgs {
    pub resources: PathBuf,
    pub live: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
}

pub fn run(mut options: LoadOptions, args: &EstimateArgs) -> CommandResult {
    if args.live {
        options.overrides.live_enabled = Some(true);
    }
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let raw = match read_input(COMMAND, &args.resources) {
        Ok(raw) => raw,
        Err(result) => return result,
    };
    let service = match PricingService::from_config(&config) {
        Ok(service) => service,
        Err(error) => return CommandResult::from_error(COMMAND, &error),
    };

    let report = if config.live.enabled {
        let Some(endpoint) = config.live.endpoint.as_deref() else {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                "live pricing requires live.endpoint",
                2,
            );
        };
        estimate_live(&service, &raw, endpoint, Duration::from_secs(config.live.timeout_secs))
    } else {
        service.estimate_from_str(&raw).map_err(|error| CommandResult::from_error(COMMAND, &error))
    };
    let report = match report {
        Ok(report) => report,
        Err(result) => return result,
    };

    info!(
        event_name = "cli.estimate.completed",
        lines = report.line_items.len(),
        total = %report.total,
        mode = ?report.estimation_mode,
        "estimate completed"
    );

    let rendered = match render(&report, args.json) {
        Ok(rendered) => rendered,
        Err(result) => return result,
    };

    match &args.output {
        Some(path) => match write_output(COMMAND, path, &rendered) {
            Ok(()) => CommandResult::success_with_data(
                COMMAND,
                format!("estimate written to {}", path.display()),
                Some(json!({
                    "total": report.total,
                    "currency": report.currency,
                    "estimation_mode": report.estimation_mode,
                    "path": path.display().to_string(),
                })),
            ),
            Err(result) => result,
        },
        None => CommandResult::raw(rendered),
    }
}

fn estimate_live(
    service: &PricingService,
    raw: &str,
    endpoint: &str,
    timeout: Duration,
) -> Result<CostReport, CommandResult> {
    let report = match HttpQuoteSource::new(endpoint, timeout) {
        Ok(source) => runtime(COMMAND)?.block_on(service.estimate_live(raw, source)),
        Err(error) => service.estimate_live_unavailable(raw, &error),
    };
    report.map_err(|error| CommandResult::from_error(COMMAND, &error))
}

fn render(report: &CostReport, as_json: bool) -> Result<String, CommandResult> {
    if !as_json {
        return Ok(report.render_text());
    }
    serde_json::to_string_pretty(report).map_err(|error| {
        CommandResult::failure(COMMAND, "serialization", error.to_string(), 4)
    })
}

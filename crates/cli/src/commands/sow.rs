use std::path::{Path, PathBuf};

use cloudplan_core::config::{AppConfig, LoadOptions};
use cloudplan_core::{CostReport, PricingService};
use cloudplan_render::{SowError, SowRenderer, SowSpec};
use serde_json::json;

use crate::commands::{load_config, read_input, runtime, CommandResult};

const COMMAND: &str = "sow";

#[derive(Debug, Clone)]
pub struct SowArgs {
    pub config: PathBuf,
    pub template: String,
    pub resources: Option<PathBuf>,
    pub output: PathBuf,
}

pub fn run(options: LoadOptions, args: &SowArgs) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let renderer = match SowRenderer::from_dir(config.templates.sow_dir.as_deref()) {
        Ok(renderer) => renderer,
        Err(error) => return sow_failure(&error),
    };

    let raw = match read_input(COMMAND, &args.config) {
        Ok(raw) => raw,
        Err(result) => return result,
    };
    let spec = match SowSpec::from_yaml(&raw) {
        Ok(spec) => spec,
        Err(error) => return sow_failure(&error),
    };

    let estimate = match &args.resources {
        Some(path) => match estimate_for(&config, path) {
            Ok(report) => Some(report),
            Err(result) => return result,
        },
        None => None,
    };

    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let rendered = runtime.block_on(renderer.render_to_file(
        &spec,
        &args.template,
        estimate.as_ref(),
        &args.output,
    ));

    match rendered {
        Ok(()) => CommandResult::success_with_data(
            COMMAND,
            format!("SOW written to {}", args.output.display()),
            Some(json!({
                "template": args.template,
                "path": args.output.display().to_string(),
                "estimated_monthly_total": estimate.as_ref().map(|report| report.total),
            })),
        ),
        Err(error) => sow_failure(&error),
    }
}

/// Lists the embedded templates and any found in `templates.sow_dir`.
pub fn list_templates(options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    match SowRenderer::from_dir(config.templates.sow_dir.as_deref()) {
        Ok(renderer) => {
            let templates = renderer.list_templates();
            CommandResult::success_with_data(
                COMMAND,
                templates.join(", "),
                Some(json!({ "templates": templates })),
            )
        }
        Err(error) => sow_failure(&error),
    }
}

fn estimate_for(config: &AppConfig, path: &Path) -> Result<CostReport, CommandResult> {
    let raw = read_input(COMMAND, path)?;
    PricingService::from_config(config)
        .and_then(|service| service.estimate_from_str(&raw))
        .map_err(|error| CommandResult::from_error(COMMAND, &error))
}

fn sow_failure(error: &SowError) -> CommandResult {
    let (class, exit_code) = match error {
        SowError::Parse(_) | SowError::Invalid { .. } | SowError::UnknownTemplate { .. } => {
            ("invalid_sow", 2)
        }
        SowError::Template(_) | SowError::Io(_) => ("rendering", 4),
    };
    CommandResult::failure(COMMAND, class, error.to_string(), exit_code)
}

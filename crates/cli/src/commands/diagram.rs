use std::path::{Path, PathBuf};

use cloudplan_core::config::LoadOptions;
use cloudplan_core::PricingService;
use cloudplan_render::{DiagramError, DiagramRenderer, DiagramSpec};
use serde_json::json;

use crate::commands::{load_config, read_input, runtime, CommandResult};

const COMMAND: &str = "diagram";

#[derive(Debug, Clone)]
pub enum DiagramSource {
    Config(PathBuf),
    Resources(PathBuf),
}

pub fn run(options: LoadOptions, source: &DiagramSource, output: &Path) -> CommandResult {
    run_with(options, source, output, DiagramRenderer::new())
}

pub fn run_with(
    options: LoadOptions,
    source: &DiagramSource,
    output: &Path,
    renderer: DiagramRenderer,
) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let spec = match source {
        DiagramSource::Config(path) => {
            let raw = match read_input(COMMAND, path) {
                Ok(raw) => raw,
                Err(result) => return result,
            };
            match DiagramSpec::from_yaml(&raw) {
                Ok(spec) => spec,
                Err(error) => return diagram_failure(&error),
            }
        }
        DiagramSource::Resources(path) => {
            let raw = match read_input(COMMAND, path) {
                Ok(raw) => raw,
                Err(result) => return result,
            };
            let requests = PricingService::from_config(&config)
                .and_then(|service| service.parse(&raw));
            match requests {
                Ok(requests) => DiagramSpec::from_inventory(&requests),
                Err(error) => return CommandResult::from_error(COMMAND, &error),
            }
        }
    };

    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    match runtime.block_on(renderer.render(&spec, output)) {
        Ok(rendered) => {
            let message = match &rendered.image_path {
                Some(image) => format!("diagram written to {}", image.display()),
                None => format!(
                    "graphviz not found; DOT source written to {}",
                    rendered.dot_path.display()
                ),
            };
            CommandResult::success_with_data(
                COMMAND,
                message,
                Some(json!({
                    "dot_path": rendered.dot_path.display().to_string(),
                    "image_path": rendered.image_path.map(|path| path.display().to_string()),
                    "nodes": spec.all_nodes().count(),
                    "connections": spec.connections.len(),
                })),
            )
        }
        Err(error) => diagram_failure(&error),
    }
}

fn diagram_failure(error: &DiagramError) -> CommandResult {
    let (class, exit_code) = match error {
        DiagramError::Graphviz { .. } | DiagramError::Io(_) => ("rendering", 4),
        _ => ("invalid_diagram", 2),
    };
    CommandResult::failure(COMMAND, class, error.to_string(), exit_code)
}

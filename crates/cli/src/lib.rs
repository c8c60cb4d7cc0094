pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};
use cloudplan_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::diagram::DiagramSource;
use crate::commands::estimate::EstimateArgs;
use crate::commands::generate::{GenerateArgs, GenerateKind};
use crate::commands::sow::SowArgs;

#[derive(Debug, Parser)]
#[command(
    name = "cloudplan",
    about = "Cloud cost estimation, SOW and architecture diagram toolkit",
    long_about = "Estimate monthly AWS costs from a resource inventory, optionally reconciled \
                  against a live pricing service, and render SOW documents and diagrams.",
    after_help = "Examples:\n  cloudplan estimate --resources resources.yaml\n  \
                  cloudplan estimate --resources resources.yaml --live --json\n  \
                  cloudplan diagram --resources resources.yaml --output architecture.png\n  \
                  cloudplan generate --input notes.txt --kind all --output-dir generated"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a cloudplan.toml config file")]
    config_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Region for resources that omit one")]
    region: Option<String>,
    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Estimate monthly cost for a resource inventory")]
    Estimate {
        #[arg(long, short = 'r', help = "Resource inventory (YAML or JSON)")]
        resources: PathBuf,
        #[arg(long, help = "Reconcile against the configured live pricing endpoint")]
        live: bool,
        #[arg(long, help = "Live pricing endpoint (overrides live.endpoint)")]
        endpoint: Option<String>,
        #[arg(long, help = "Emit the report as JSON")]
        json: bool,
        #[arg(long, short = 'o', help = "Write the report to a file")]
        output: Option<PathBuf>,
    },
    #[command(about = "Build a pricing calculator link for a resource inventory")]
    CalculatorUrl {
        #[arg(long, short = 'r')]
        resources: PathBuf,
    },
    #[command(about = "Render an architecture diagram")]
    #[command(group(ArgGroup::new("source").required(true).args(["config", "resources"])))]
    Diagram {
        #[arg(long, short = 'c', help = "Diagram config (YAML)")]
        config: Option<PathBuf>,
        #[arg(long, short = 'r', help = "Derive the diagram from a resource inventory")]
        resources: Option<PathBuf>,
        #[arg(long, short = 'o', default_value = "architecture.png")]
        output: PathBuf,
    },
    #[command(about = "Render a statement of work")]
    Sow {
        #[arg(long, short = 'c', required_unless_present = "list_templates")]
        config: Option<PathBuf>,
        #[arg(long, short = 't', default_value = cloudplan_render::sow::DEFAULT_TEMPLATE)]
        template: String,
        #[arg(long, short = 'r', help = "Include a monthly estimate for this inventory")]
        resources: Option<PathBuf>,
        #[arg(long, short = 'o', default_value = "sow.md")]
        output: PathBuf,
        #[arg(long, help = "Directory with additional *.md.tera templates")]
        template_dir: Option<PathBuf>,
        #[arg(long, help = "List available templates and exit")]
        list_templates: bool,
    },
    #[command(about = "Generate configs from a free-form description using the configured LLM")]
    Generate {
        #[arg(long, short = 'i', help = "Text file with the project description")]
        input: PathBuf,
        #[arg(long, short = 'k', value_enum, default_value = "all")]
        kind: GenerateKind,
        #[arg(long, default_value = "generated")]
        output_dir: PathBuf,
        #[arg(long, help = "Also generate a SOW config with --kind all")]
        with_sow: bool,
        #[arg(long, help = "LLM provider: anthropic, openai or ollama")]
        provider: Option<LlmProvider>,
        #[arg(long, help = "Model name for the selected provider")]
        model: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Check config, rate data, templates, Graphviz and LLM readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        config_path: cli.config_file.clone(),
        require_file: cli.config_file.is_some(),
        overrides: ConfigOverrides {
            default_region: cli.region.clone(),
            log_level: cli.log_level.clone(),
            ..ConfigOverrides::default()
        },
    };

    let command = cli.command;
    let options = command_overrides(&command, options);

    init_logging(&options);
    let result = dispatch(command, options);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn command_overrides(command: &Command, mut options: LoadOptions) -> LoadOptions {
    let overrides = &mut options.overrides;
    match command {
        Command::Estimate { endpoint, .. } => overrides.live_endpoint = endpoint.clone(),
        Command::Sow { template_dir, .. } => overrides.sow_template_dir = template_dir.clone(),
        Command::Generate { provider, model, .. } => {
            overrides.llm_provider = *provider;
            overrides.llm_model = model.clone();
        }
        _ => {}
    }
    options
}

fn dispatch(command: Command, options: LoadOptions) -> commands::CommandResult {
    match command {
        Command::Estimate { resources, live, json, output, .. } => {
            commands::estimate::run(options, &EstimateArgs { resources, live, json, output })
        }
        Command::CalculatorUrl { resources } => commands::calculator_url::run(options, &resources),
        Command::Diagram { config, resources, output } => {
            let source = match (config, resources) {
                (Some(path), _) => DiagramSource::Config(path),
                (None, Some(path)) => DiagramSource::Resources(path),
                (None, None) => {
                    return commands::CommandResult::failure(
                        "diagram",
                        "invalid_input",
                        "either --config or --resources is required",
                        2,
                    )
                }
            };
            commands::diagram::run(options, &source, &output)
        }
        Command::Sow { list_templates: true, .. } => commands::sow::list_templates(options),
        Command::Sow { config, template, resources, output, .. } => match config {
            Some(config) => {
                commands::sow::run(options, &SowArgs { config, template, resources, output })
            }
            None => commands::CommandResult::failure(
                "sow",
                "invalid_input",
                "--config is required",
                2,
            ),
        },
        Command::Generate { input, kind, output_dir, with_sow, .. } => {
            commands::generate::run(options, &GenerateArgs { input, kind, output_dir, with_sow })
        }
        Command::Config => commands::CommandResult::raw(commands::config::run(options)),
        Command::Doctor { json } => commands::doctor::run(options, json),
    }
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` overrides the
/// configured level.
fn init_logging(options: &LoadOptions) {
    let (level, format) = match AppConfig::load(options.clone()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

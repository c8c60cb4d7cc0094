use std::path::{Path, PathBuf};

use clap::ValueEnum;
use cloudplan_agent::generator::write_config;
use cloudplan_agent::{ConfigGenerator, GenerationError, HttpLlmClient, LlmClient};
use cloudplan_core::config::{AppConfig, LoadOptions};
use cloudplan_core::pricing::ParseOptions;
use serde_json::json;

use crate::commands::{load_config, read_input, runtime, CommandResult};

const COMMAND: &str = "generate";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GenerateKind {
    Resources,
    Diagram,
    Sow,
    All,
}

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub input: PathBuf,
    pub kind: GenerateKind,
    pub output_dir: PathBuf,
    pub with_sow: bool,
}

pub fn run(options: LoadOptions, args: &GenerateArgs) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let client = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", format!("{error:#}"), 2)
        }
    };
    run_with_client(&config, client, args)
}

/// Same as [`run`] with an injected model client.
pub fn run_with_client<C: LlmClient>(
    config: &AppConfig,
    client: C,
    args: &GenerateArgs,
) -> CommandResult {
    let description = match read_input(COMMAND, &args.input) {
        Ok(description) => description,
        Err(result) => return result,
    };
    let generator = ConfigGenerator::new(client).with_parse_options(ParseOptions {
        default_region: config.pricing.default_region.clone(),
        allow_usage_overrun: config.pricing.allow_usage_overrun,
    });

    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let written = runtime.block_on(generate(
        &generator,
        &description,
        args.kind,
        args.with_sow,
        &args.output_dir,
    ));

    match written {
        Ok(files) => {
            let paths: Vec<String> = files.iter().map(|path| path.display().to_string()).collect();
            CommandResult::success_with_data(
                COMMAND,
                format!("generated {} config file(s) in {}", paths.len(), args.output_dir.display()),
                Some(json!({ "files": paths })),
            )
        }
        Err(result) => result,
    }
}

async fn generate<C: LlmClient>(
    generator: &ConfigGenerator<C>,
    description: &str,
    kind: GenerateKind,
    with_sow: bool,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CommandResult> {
    let written = match kind {
        GenerateKind::All => {
            let bundle = generator.generate_all(description, with_sow).await.map_err(failure)?;
            bundle.write_all(output_dir).await
        }
        GenerateKind::Resources => {
            let generated = generator.generate_resources(description).await.map_err(failure)?;
            write_config(output_dir, generated.kind, &generated.yaml).await.map(|path| vec![path])
        }
        GenerateKind::Diagram => {
            let generated = generator.generate_diagram(description).await.map_err(failure)?;
            write_config(output_dir, generated.kind, &generated.yaml).await.map(|path| vec![path])
        }
        GenerateKind::Sow => {
            let generated = generator.generate_sow(description).await.map_err(failure)?;
            write_config(output_dir, generated.kind, &generated.yaml).await.map(|path| vec![path])
        }
    };

    written.map_err(|error| {
        CommandResult::failure(
            COMMAND,
            "output_unwritable",
            format!("could not write to `{}`: {error}", output_dir.display()),
            4,
        )
    })
}

fn failure(error: GenerationError) -> CommandResult {
    let (class, exit_code) = match &error {
        GenerationError::EmptyDescription => ("invalid_input", 2),
        GenerationError::SchemaMismatch { .. } => ("schema_mismatch", 4),
        GenerationError::Llm(_) => ("llm", 4),
    };
    CommandResult::failure(COMMAND, class, error.to_string(), exit_code)
}

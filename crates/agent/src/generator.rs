use std::fmt;
use std::path::{Path, PathBuf};

use cloudplan_core::domain::resource::ResourceRequest;
use cloudplan_core::pricing::{parse_inventory, ParseOptions};
use cloudplan_render::{DiagramSpec, SowSpec};
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::prompts;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKind {
    Resources,
    Diagram,
    Sow,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Diagram => "diagram",
            Self::Sow => "sow",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Resources => "resources.yaml",
            Self::Diagram => "diagram.yaml",
            Self::Sow => "sow.yaml",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Llm(String),
    #[error("generated {kind} config does not match the expected schema: {message}")]
    SchemaMismatch { kind: ConfigKind, message: String, raw: String },
    #[error("description must not be empty")]
    EmptyDescription,
}

/// A validated config together with the YAML text it was parsed from.
#[derive(Clone, Debug)]
pub struct Generated<T> {
    pub kind: ConfigKind,
    pub yaml: String,
    pub value: T,
}

#[derive(Clone, Debug)]
pub struct GeneratedBundle {
    pub resources: Generated<Vec<ResourceRequest>>,
    pub diagram: Generated<DiagramSpec>,
    pub sow: Option<Generated<SowSpec>>,
}

impl GeneratedBundle {
    /// Writes each config as `<kind>.yaml` under `dir`, creating it if needed.
    pub async fn write_all(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;

        let mut files = vec![
            (self.resources.kind, self.resources.yaml.as_str()),
            (self.diagram.kind, self.diagram.yaml.as_str()),
        ];
        if let Some(sow) = &self.sow {
            files.push((sow.kind, sow.yaml.as_str()));
        }

        let mut written = Vec::with_capacity(files.len());
        for (kind, yaml) in files {
            written.push(write_config(dir, kind, yaml).await?);
        }
        Ok(written)
    }
}

pub async fn write_config(dir: &Path, kind: ConfigKind, yaml: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(kind.file_name());
    let mut contents = yaml.trim_end().to_string();
    contents.push('\n');
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

/// Turns free-form descriptions into validated configs.
///
/// The model only translates text into YAML. Every reply goes through the
/// same parsers the CLI uses for hand-written files, and nothing it returns
/// is priced or rendered until that succeeds.
pub struct ConfigGenerator<C> {
    client: C,
    parse_options: ParseOptions,
}

impl<C: LlmClient> ConfigGenerator<C> {
    pub fn new(client: C) -> Self {
        Self { client, parse_options: ParseOptions::default() }
    }

    pub fn with_parse_options(mut self, parse_options: ParseOptions) -> Self {
        self.parse_options = parse_options;
        self
    }

    pub async fn generate_resources(
        &self,
        description: &str,
    ) -> Result<Generated<Vec<ResourceRequest>>, GenerationError> {
        let yaml = self.ask(ConfigKind::Resources, description, prompts::resources_prompt).await?;
        let value = parse_inventory(&yaml, &self.parse_options)
            .map_err(|error| mismatch(ConfigKind::Resources, error, &yaml))?;
        Ok(accepted(ConfigKind::Resources, yaml, value))
    }

    pub async fn generate_diagram(
        &self,
        description: &str,
    ) -> Result<Generated<DiagramSpec>, GenerationError> {
        let yaml = self.ask(ConfigKind::Diagram, description, prompts::diagram_prompt).await?;
        let value = DiagramSpec::from_yaml(&yaml)
            .map_err(|error| mismatch(ConfigKind::Diagram, error, &yaml))?;
        Ok(accepted(ConfigKind::Diagram, yaml, value))
    }

    pub async fn generate_sow(&self, description: &str) -> Result<Generated<SowSpec>, GenerationError> {
        let yaml = self.ask(ConfigKind::Sow, description, prompts::sow_prompt).await?;
        let value =
            SowSpec::from_yaml(&yaml).map_err(|error| mismatch(ConfigKind::Sow, error, &yaml))?;
        Ok(accepted(ConfigKind::Sow, yaml, value))
    }

    /// Resources, then diagram, then the SOW when requested. The first
    /// failure stops the run.
    pub async fn generate_all(
        &self,
        description: &str,
        with_sow: bool,
    ) -> Result<GeneratedBundle, GenerationError> {
        let resources = self.generate_resources(description).await?;
        let diagram = self.generate_diagram(description).await?;
        let sow = if with_sow { Some(self.generate_sow(description).await?) } else { None };
        Ok(GeneratedBundle { resources, diagram, sow })
    }

    async fn ask(
        &self,
        kind: ConfigKind,
        description: &str,
        prompt: fn(&str) -> String,
    ) -> Result<String, GenerationError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(GenerationError::EmptyDescription);
        }

        info!(event_name = "agent.generate.requested", kind = kind.as_str(), "requesting config");
        let reply = self
            .client
            .complete(&prompt(description))
            .await
            .map_err(|error| GenerationError::Llm(format!("{error:#}")))?;
        Ok(extract_yaml(&reply))
    }
}

fn accepted<T>(kind: ConfigKind, yaml: String, value: T) -> Generated<T> {
    info!(event_name = "agent.generate.accepted", kind = kind.as_str(), "generated config validated");
    Generated { kind, yaml, value }
}

fn mismatch(kind: ConfigKind, error: impl fmt::Display, raw: &str) -> GenerationError {
    warn!(
        event_name = "agent.generate.schema_mismatch",
        kind = kind.as_str(),
        error = %error,
        "generated config rejected"
    );
    GenerationError::SchemaMismatch { kind, message: error.to_string(), raw: raw.to_string() }
}

/// Pulls the YAML body out of a model reply: a ```yaml fence, else the first
/// bare fence, else the whole reply.
pub fn extract_yaml(reply: &str) -> String {
    for opener in ["```yaml", "```yml"] {
        if let Some(start) = reply.find(opener) {
            return fenced_body(&reply[start + opener.len()..]);
        }
    }
    if let Some(start) = reply.find("```") {
        let rest = &reply[start + 3..];
        // skip an unrecognised info string such as ```json
        let rest = match rest.find('\n') {
            Some(newline) if !rest[..newline].trim().contains(' ') => &rest[newline + 1..],
            _ => rest,
        };
        return fenced_body(rest);
    }
    reply.trim().to_string()
}

fn fenced_body(rest: &str) -> String {
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.trim().to_string()
}

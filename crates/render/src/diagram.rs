//! Architecture diagrams.
//!
//! Diagrams are described by a [`DiagramSpec`] (loaded from YAML or derived
//! from a resource inventory), emitted as Graphviz DOT, and rasterised with
//! the `dot` binary when it is installed.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use cloudplan_core::domain::resource::{ResourceRequest, ServiceKind};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

pub const SUPPORTED_SERVICES: [&str; 10] =
    ["ec2", "rds", "s3", "elb", "vpc", "ecs", "waf", "sqs", "cloudwatch", "elasticache"];

const DEFAULT_DIAGRAM_NAME: &str = "AWS Architecture Diagram";

#[derive(Debug, thiserror::Error)]
pub enum DiagramError {
    #[error("diagram config could not be parsed: {0}")]
    Parse(String),
    #[error("diagram has no nodes")]
    Empty,
    #[error("duplicate node name `{0}`")]
    DuplicateNode(String),
    #[error("node `{node}` uses unsupported service `{service}` (supported: {supported})")]
    UnsupportedService { node: String, service: String, supported: String },
    #[error("connection {from} -> {to} references undeclared node `{missing}`")]
    UnknownNode { from: String, to: String, missing: String },
    #[error("graphviz failed with status {status}: {stderr}")]
    Graphviz { status: String, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "TB")]
    TopBottom,
    #[default]
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "RL")]
    RightLeft,
    #[serde(rename = "BT")]
    BottomTop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopBottom => "TB",
            Self::LeftRight => "LR",
            Self::RightLeft => "RL",
            Self::BottomTop => "BT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub name: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramCluster {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<DiagramNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramConnection {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSpec {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub nodes: Vec<DiagramNode>,
    #[serde(default)]
    pub clusters: Vec<DiagramCluster>,
    #[serde(default)]
    pub connections: Vec<DiagramConnection>,
}

fn default_name() -> String {
    DEFAULT_DIAGRAM_NAME.to_string()
}

impl DiagramSpec {
    pub fn from_yaml(raw: &str) -> Result<Self, DiagramError> {
        let mut spec: Self =
            serde_yaml_ng::from_str(raw).map_err(|error| DiagramError::Parse(error.to_string()))?;
        for node in spec.all_nodes_mut() {
            node.service = node.service.trim().to_ascii_lowercase();
        }
        spec.validate()?;
        Ok(spec)
    }

    /// Standalone nodes first, then cluster members in declaration order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &DiagramNode> {
        self.nodes.iter().chain(self.clusters.iter().flat_map(|cluster| cluster.nodes.iter()))
    }

    fn all_nodes_mut(&mut self) -> impl Iterator<Item = &mut DiagramNode> {
        self.nodes
            .iter_mut()
            .chain(self.clusters.iter_mut().flat_map(|cluster| cluster.nodes.iter_mut()))
    }

    pub fn validate(&self) -> Result<(), DiagramError> {
        let mut names = HashSet::new();
        for node in self.all_nodes() {
            if !names.insert(node.name.as_str()) {
                return Err(DiagramError::DuplicateNode(node.name.clone()));
            }
            if !SUPPORTED_SERVICES.contains(&node.service.as_str()) {
                return Err(DiagramError::UnsupportedService {
                    node: node.name.clone(),
                    service: node.service.clone(),
                    supported: SUPPORTED_SERVICES.join(", "),
                });
            }
        }
        if names.is_empty() {
            return Err(DiagramError::Empty);
        }

        for connection in &self.connections {
            for endpoint in [&connection.from, &connection.to] {
                if !names.contains(endpoint.as_str()) {
                    return Err(DiagramError::UnknownNode {
                        from: connection.from.clone(),
                        to: connection.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Groups resources into tiers by the prefix of their type
    /// (`web_server` lands in "Web Tier"), then links web servers to app
    /// servers and app servers to the database tier.
    pub fn from_inventory(requests: &[ResourceRequest]) -> Self {
        let mut clusters: Vec<(String, DiagramCluster)> = Vec::new();
        let mut web = Vec::new();
        let mut app = Vec::new();
        let mut data = Vec::new();
        let mut per_type: BTreeMap<&str, usize> = BTreeMap::new();

        for request in requests {
            let key = match request.resource_type.split_once('_') {
                Some((prefix, _)) => prefix.to_ascii_lowercase(),
                None => request.service.as_str().to_string(),
            };

            let position = match clusters.iter().position(|(existing, _)| *existing == key) {
                Some(position) => position,
                None => {
                    let cluster = DiagramCluster { name: format!("{} Tier", capitalize(&key)), nodes: Vec::new() };
                    clusters.push((key.clone(), cluster));
                    clusters.len() - 1
                }
            };

            // Numbered per resource type across all clusters; the same type
            // can appear under more than one service.
            let ordinal = per_type.entry(request.resource_type.as_str()).or_default();
            *ordinal += 1;
            let name = format!("{}_{}", request.resource_type, ordinal);
            clusters[position].1.nodes.push(DiagramNode {
                name: name.clone(),
                service: request.service.as_str().to_string(),
                label: Some(format!("{} ({})", request.resource_type, request.service)),
            });

            let resource_type = request.resource_type.to_ascii_lowercase();
            match request.service {
                ServiceKind::Ec2 if resource_type.contains("web") => web.push(name),
                ServiceKind::Ec2 if resource_type.contains("app") => app.push(name),
                ServiceKind::Rds => data.push(name),
                _ if key == "database" || key == "db" => data.push(name),
                _ => {}
            }
        }

        let mut connections = Vec::new();
        for from in &web {
            for to in &app {
                connections.push(DiagramConnection {
                    from: from.clone(),
                    to: to.clone(),
                    label: Some("HTTP/S".to_string()),
                });
            }
        }
        for from in &app {
            for to in &data {
                connections.push(DiagramConnection {
                    from: from.clone(),
                    to: to.clone(),
                    label: Some("DB Connection".to_string()),
                });
            }
        }

        Self {
            name: DEFAULT_DIAGRAM_NAME.to_string(),
            direction: Direction::TopBottom,
            nodes: Vec::new(),
            clusters: clusters.into_iter().map(|(_, cluster)| cluster).collect(),
            connections,
        }
    }

    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph {} {{", quote(&self.name));
        let _ = writeln!(
            out,
            "  graph [label={}, labelloc=\"t\", rankdir={}, fontname=\"Helvetica\", fontsize=16];",
            quote(&self.name),
            self.direction.as_str()
        );
        let _ = writeln!(out, "  node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\"];");
        let _ = writeln!(out, "  edge [fontname=\"Helvetica\", fontsize=10];");

        for node in &self.nodes {
            write_node(&mut out, node, "  ");
        }
        for (index, cluster) in self.clusters.iter().enumerate() {
            let _ = writeln!(out, "  subgraph cluster_{index} {{");
            let _ = writeln!(out, "    label={};", quote(&cluster.name));
            let _ = writeln!(out, "    style=dashed;");
            for node in &cluster.nodes {
                write_node(&mut out, node, "    ");
            }
            let _ = writeln!(out, "  }}");
        }
        for connection in &self.connections {
            match &connection.label {
                Some(label) => {
                    let _ = writeln!(
                        out,
                        "  {} -> {} [label={}];",
                        quote(&connection.from),
                        quote(&connection.to),
                        quote(label)
                    );
                }
                None => {
                    let _ = writeln!(out, "  {} -> {};", quote(&connection.from), quote(&connection.to));
                }
            }
        }
        out.push_str("}\n");
        out
    }
}

fn write_node(out: &mut String, node: &DiagramNode, indent: &str) {
    let label = node.label.as_deref().unwrap_or(&node.name);
    let _ = writeln!(
        out,
        "{indent}{} [label={}, fillcolor=\"{}\"];",
        quote(&node.name),
        quote(&format!("{label}\n{}", service_caption(&node.service))),
        service_color(&node.service)
    );
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
    format!("\"{escaped}\"")
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn service_caption(service: &str) -> String {
    match service.parse::<ServiceKind>() {
        Ok(kind) => kind.display_name().to_string(),
        Err(_) => service.to_ascii_uppercase(),
    }
}

fn service_color(service: &str) -> &'static str {
    match service {
        "ec2" | "ecs" => "#FFD8A8",
        "rds" | "elasticache" => "#C5D8F7",
        "s3" => "#C8E6C9",
        "elb" | "vpc" => "#E1D5F5",
        "waf" => "#F8C8C8",
        "sqs" | "cloudwatch" => "#F5E6C8",
        _ => "#EEEEEE",
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagramOutput {
    pub dot_path: PathBuf,
    pub image_path: Option<PathBuf>,
}

/// Writes DOT files and runs Graphviz when available.
#[derive(Clone, Debug)]
pub struct DiagramRenderer {
    dot_binary: Option<PathBuf>,
}

impl Default for DiagramRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagramRenderer {
    pub fn new() -> Self {
        let dot_binary = which::which("dot").ok();
        match &dot_binary {
            Some(path) => info!(path = %path.display(), "graphviz dot found"),
            None => warn!("graphviz dot not found in PATH - diagrams will be written as .dot only"),
        }
        Self { dot_binary }
    }

    pub fn without_graphviz() -> Self {
        Self { dot_binary: None }
    }

    pub fn with_dot_binary(path: impl Into<PathBuf>) -> Self {
        Self { dot_binary: Some(path.into()) }
    }

    pub fn has_graphviz(&self) -> bool {
        self.dot_binary.is_some()
    }

    /// `output` may be given with or without a `.png` extension; the `.dot`
    /// and `.png` files share its stem.
    pub async fn render(&self, spec: &DiagramSpec, output: &Path) -> Result<DiagramOutput, DiagramError> {
        spec.validate()?;

        let stem = match output.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") || ext.eq_ignore_ascii_case("dot") => {
                output.with_extension("")
            }
            _ => output.to_path_buf(),
        };
        if let Some(parent) = stem.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dot_path = stem.with_extension("dot");
        tokio::fs::write(&dot_path, spec.to_dot()).await?;

        let Some(dot_binary) = &self.dot_binary else {
            warn!(
                event_name = "render.diagram.dot_only",
                path = %dot_path.display(),
                "graphviz unavailable, wrote DOT source only"
            );
            return Ok(DiagramOutput { dot_path, image_path: None });
        };

        let image_path = stem.with_extension("png");
        let result = Command::new(dot_binary)
            .arg("-Tpng")
            .arg("-o")
            .arg(&image_path)
            .arg(&dot_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            return Err(DiagramError::Graphviz {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        info!(
            event_name = "render.diagram.completed",
            nodes = spec.all_nodes().count(),
            edges = spec.connections.len(),
            path = %image_path.display(),
            "diagram rendered"
        );
        Ok(DiagramOutput { dot_path, image_path: Some(image_path) })
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cloudplan_core::config::{AppConfig, LoadOptions};
use toml::Value;

const CONFIG_FILE_NAMES: [&str; 2] = ["cloudplan.toml", "config/cloudplan.toml"];

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string()
    ];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key: &'static str, env_keys: &'static [&'static str], value: String| Field {
        key,
        env_keys,
        value,
    };
    let optional = |value: Option<String>| value.unwrap_or_else(|| "<unset>".to_string());

    vec![
        field(
            "pricing.default_region",
            &["CLOUDPLAN_PRICING_DEFAULT_REGION"],
            optional(config.pricing.default_region.clone()),
        ),
        field(
            "pricing.rate_table_path",
            &["CLOUDPLAN_PRICING_RATE_TABLE_PATH"],
            config
                .pricing
                .rate_table_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<packaged>".to_string()),
        ),
        field(
            "pricing.allow_usage_overrun",
            &["CLOUDPLAN_PRICING_ALLOW_USAGE_OVERRUN"],
            config.pricing.allow_usage_overrun.to_string(),
        ),
        field("live.enabled", &["CLOUDPLAN_LIVE_ENABLED"], config.live.enabled.to_string()),
        field("live.endpoint", &["CLOUDPLAN_LIVE_ENDPOINT"], optional(config.live.endpoint.clone())),
        field(
            "live.calculator_base_url",
            &["CLOUDPLAN_LIVE_CALCULATOR_BASE_URL"],
            config.live.calculator_base_url.clone(),
        ),
        field(
            "live.timeout_secs",
            &["CLOUDPLAN_LIVE_TIMEOUT_SECS"],
            config.live.timeout_secs.to_string(),
        ),
        field(
            "live.tolerance_absolute",
            &["CLOUDPLAN_LIVE_TOLERANCE_ABSOLUTE"],
            config.live.tolerance_absolute.to_string(),
        ),
        field(
            "live.tolerance_percent",
            &["CLOUDPLAN_LIVE_TOLERANCE_PERCENT"],
            config.live.tolerance_percent.to_string(),
        ),
        field("llm.provider", &["CLOUDPLAN_LLM_PROVIDER"], config.llm.provider.as_str().to_string()),
        field("llm.model", &["CLOUDPLAN_LLM_MODEL"], config.llm.model.clone()),
        field("llm.base_url", &["CLOUDPLAN_LLM_BASE_URL"], optional(config.llm.base_url.clone())),
        field(
            "llm.api_key",
            &["CLOUDPLAN_LLM_API_KEY"],
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        field("llm.timeout_secs", &["CLOUDPLAN_LLM_TIMEOUT_SECS"], config.llm.timeout_secs.to_string()),
        field("llm.max_tokens", &["CLOUDPLAN_LLM_MAX_TOKENS"], config.llm.max_tokens.to_string()),
        field(
            "templates.sow_dir",
            &["CLOUDPLAN_TEMPLATES_SOW_DIR"],
            optional(config.templates.sow_dir.as_ref().map(|path| path.display().to_string())),
        ),
        field(
            "logging.level",
            &["CLOUDPLAN_LOGGING_LEVEL", "CLOUDPLAN_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["CLOUDPLAN_LOGGING_FORMAT", "CLOUDPLAN_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    CONFIG_FILE_NAMES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

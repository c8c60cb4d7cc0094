use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::calculator::DEFAULT_CALCULATOR_BASE_URL;

const ENV_PREFIX: &str = "CLOUDPLAN_";
const CONFIG_FILE_NAMES: [&str; 2] = ["cloudplan.toml", "config/cloudplan.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub pricing: PricingConfig,
    pub live: LiveConfig,
    pub llm: LlmConfig,
    pub templates: TemplatesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub default_region: Option<String>,
    pub rate_table_path: Option<PathBuf>,
    pub allow_usage_overrun: bool,
}

#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub calculator_base_url: String,
    pub timeout_secs: u64,
    pub tolerance_absolute: Decimal,
    pub tolerance_percent: Decimal,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Default)]
pub struct TemplatesConfig {
    pub sow_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub default_region: Option<String>,
    pub rate_table_path: Option<PathBuf>,
    pub live_enabled: Option<bool>,
    pub live_endpoint: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub sow_template_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig {
                default_region: Some("us-east-1".to_string()),
                rate_table_path: None,
                allow_usage_overrun: false,
            },
            live: LiveConfig {
                enabled: false,
                endpoint: None,
                calculator_base_url: DEFAULT_CALCULATOR_BASE_URL.to_string(),
                timeout_secs: 10,
                tolerance_absolute: Decimal::new(50, 2),
                tolerance_percent: Decimal::from(2),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_tokens: 4096,
            },
            templates: TemplatesConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAMES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(pricing) = patch.pricing {
            if let Some(default_region) = pricing.default_region {
                self.pricing.default_region = non_empty(default_region);
            }
            if let Some(rate_table_path) = pricing.rate_table_path {
                self.pricing.rate_table_path = Some(rate_table_path);
            }
            if let Some(allow_usage_overrun) = pricing.allow_usage_overrun {
                self.pricing.allow_usage_overrun = allow_usage_overrun;
            }
        }

        if let Some(live) = patch.live {
            if let Some(enabled) = live.enabled {
                self.live.enabled = enabled;
            }
            if let Some(endpoint) = live.endpoint {
                self.live.endpoint = non_empty(endpoint);
            }
            if let Some(calculator_base_url) = live.calculator_base_url {
                self.live.calculator_base_url = calculator_base_url;
            }
            if let Some(timeout_secs) = live.timeout_secs {
                self.live.timeout_secs = timeout_secs;
            }
            if let Some(tolerance_absolute) = live.tolerance_absolute {
                self.live.tolerance_absolute = tolerance_absolute;
            }
            if let Some(tolerance_percent) = live.tolerance_percent {
                self.live.tolerance_percent = tolerance_percent;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(templates) = patch.templates {
            if let Some(sow_dir) = templates.sow_dir {
                self.templates.sow_dir = Some(sow_dir);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRICING_DEFAULT_REGION") {
            self.pricing.default_region = Some(value);
        }
        if let Some(value) = read_env("PRICING_RATE_TABLE_PATH") {
            self.pricing.rate_table_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("PRICING_ALLOW_USAGE_OVERRUN") {
            self.pricing.allow_usage_overrun = parse_env("PRICING_ALLOW_USAGE_OVERRUN", &value)?;
        }

        if let Some(value) = read_env("LIVE_ENABLED") {
            self.live.enabled = parse_env("LIVE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LIVE_ENDPOINT") {
            self.live.endpoint = Some(value);
        }
        if let Some(value) = read_env("LIVE_CALCULATOR_BASE_URL") {
            self.live.calculator_base_url = value;
        }
        if let Some(value) = read_env("LIVE_TIMEOUT_SECS") {
            self.live.timeout_secs = parse_env("LIVE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LIVE_TOLERANCE_ABSOLUTE") {
            self.live.tolerance_absolute = parse_env("LIVE_TOLERANCE_ABSOLUTE", &value)?;
        }
        if let Some(value) = read_env("LIVE_TOLERANCE_PERCENT") {
            self.live.tolerance_percent = parse_env("LIVE_TOLERANCE_PERCENT", &value)?;
        }

        if let Some(value) = read_env("LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("TEMPLATES_SOW_DIR") {
            self.templates.sow_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("LOGGING_LEVEL").or_else(|| read_env("LOG_LEVEL")) {
            self.logging.level = value;
        }
        if let Some(value) = read_env("LOGGING_FORMAT").or_else(|| read_env("LOG_FORMAT")) {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(default_region) = overrides.default_region {
            self.pricing.default_region = Some(default_region);
        }
        if let Some(rate_table_path) = overrides.rate_table_path {
            self.pricing.rate_table_path = Some(rate_table_path);
        }
        if let Some(enabled) = overrides.live_enabled {
            self.live.enabled = enabled;
        }
        if let Some(endpoint) = overrides.live_endpoint {
            self.live.endpoint = Some(endpoint);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(sow_dir) = overrides.sow_template_dir {
            self.templates.sow_dir = Some(sow_dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_pricing(&self.pricing)?;
        validate_live(&self.live)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

impl LlmConfig {
    /// Credentials are only checked when a client is built, so commands that
    /// never call a model work without them. Ollama needs none; an unset
    /// `base_url` means the provider's public endpoint (or localhost for
    /// Ollama).
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.provider == LlmProvider::Ollama {
            return Ok(());
        }

        let missing = self
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider (set CLOUDPLAN_LLM_API_KEY)",
                self.provider.as_str()
            )));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_NAMES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if let Some(region) = &pricing.default_region {
        let well_formed = region
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
        if region.is_empty() || !well_formed {
            return Err(ConfigError::Validation(format!(
                "pricing.default_region `{region}` must look like `us-east-1`"
            )));
        }
    }

    if let Some(path) = &pricing.rate_table_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "pricing.rate_table_path `{}` does not exist",
                path.display()
            )));
        }
    }

    Ok(())
}

fn validate_live(live: &LiveConfig) -> Result<(), ConfigError> {
    if live.timeout_secs == 0 || live.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "live.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if live.tolerance_absolute.is_sign_negative() || live.tolerance_percent.is_sign_negative() {
        return Err(ConfigError::Validation(
            "live.tolerance_absolute and live.tolerance_percent must not be negative".to_string(),
        ));
    }

    if !is_http_url(&live.calculator_base_url) {
        return Err(ConfigError::Validation(
            "live.calculator_base_url must start with http:// or https://".to_string(),
        ));
    }

    match &live.endpoint {
        Some(endpoint) if !is_http_url(endpoint) => Err(ConfigError::Validation(
            "live.endpoint must start with http:// or https://".to_string(),
        )),
        None if live.enabled => Err(ConfigError::Validation(
            "live.enabled is true but live.endpoint is not configured".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.trim().is_empty() && !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn read_env(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    pricing: Option<PricingPatch>,
    live: Option<LivePatch>,
    llm: Option<LlmPatch>,
    templates: Option<TemplatesPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    default_region: Option<String>,
    rate_table_path: Option<PathBuf>,
    allow_usage_overrun: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LivePatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    calculator_base_url: Option<String>,
    timeout_secs: Option<u64>,
    tolerance_absolute: Option<Decimal>,
    tolerance_percent: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TemplatesPatch {
    sow_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

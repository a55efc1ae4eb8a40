//! Service configuration with layered loading.
//!
//! The priority chain (later overrides earlier):
//! 1. Built-in defaults ([`ServiceConfig::default()`])
//! 2. An optional TOML file passed by the caller (`--config`)
//! 3. Environment variables listed in [`ENV_MAPPINGS`] (`HEADLESS`, `PPSR_*`)
//! 4. CLI flags, applied by the binary on the returned config
//!
//! Each overridden field in the final [`EffectiveConfig`] is annotated with
//! the [`ConfigSource`] that determined its value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Login page of the PPSR transact portal.
pub const DEFAULT_TARGET_URL: &str = "https://transact.ppsr.gov.au/ppsr/Login";

/// Config files larger than this are rejected.
const MAX_CONFIG_FILE_SIZE: u64 = 256 * 1024;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Top-level configuration for the lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Root of the rotated log file and of every per-call artifact directory.
    pub log_dir: PathBuf,
    /// Number of daily log files kept on disk.
    pub log_retention_days: usize,
    /// Page the runner opens first.
    pub target_url: String,
    pub browser: BrowserConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            log_dir: PathBuf::from("logs"),
            log_retention_days: 7,
            target_url: DEFAULT_TARGET_URL.into(),
            browser: BrowserConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Directory holding screenshots and the trace archive of one call.
    pub fn artifact_dir(&self, request_id: &str) -> PathBuf {
        self.log_dir.join(request_id)
    }
}

/// Browser session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; discovered when unset.
    pub binary_path: Option<PathBuf>,
    /// Delay inserted before every input action.
    pub slow_mo_ms: u64,
    /// Emulated round-trip latency added to every request.
    pub network_latency_ms: u64,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// How long to wait for the DevTools endpoint after spawning Chrome.
    pub launch_timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            binary_path: None,
            slow_mo_ms: 1500,
            network_latency_ms: 350,
            user_agent: DEFAULT_USER_AGENT.into(),
            viewport_width: 1280,
            viewport_height: 800,
            launch_timeout_secs: 15,
            extra_args: Vec::new(),
        }
    }
}

/// Interpret an environment toggle: `1`, `true`, `yes`, `on` (any case) are true.
pub fn parse_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    BuiltinDefault,
    File(PathBuf),
    EnvVar(String),
    CliFlag(String),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::BuiltinDefault => write!(f, "built-in default"),
            ConfigSource::File(p) => write!(f, "file: {}", p.display()),
            ConfigSource::EnvVar(name) => write!(f, "env var: {name}"),
            ConfigSource::CliFlag(name) => write!(f, "CLI flag: {name}"),
        }
    }
}

/// Merged configuration plus the source of every overridden field.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: ServiceConfig,
    /// Dot-separated field path -> the source that set it.
    pub sources: HashMap<String, ConfigSource>,
}

impl EffectiveConfig {
    /// Source of a field, defaulting to the built-in value.
    pub fn source_of(&self, path: &str) -> ConfigSource {
        self.sources
            .get(path)
            .cloned()
            .unwrap_or(ConfigSource::BuiltinDefault)
    }

    /// Record a CLI override applied after loading.
    pub fn record_cli(&mut self, path: &str, flag: &str) {
        self.sources
            .insert(path.to_string(), ConfigSource::CliFlag(flag.to_string()));
    }
}

/// How an environment variable maps onto the config tree.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Str,
    Bool,
    Int,
}

/// An environment variable mapped to a config field.
#[derive(Debug, Clone, Copy)]
pub struct EnvMapping {
    pub env_var: &'static str,
    pub toml_path: &'static [&'static str],
    kind: EnvKind,
}

/// All supported environment overrides.
pub const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        env_var: "HEADLESS",
        toml_path: &["browser", "headless"],
        kind: EnvKind::Bool,
    },
    EnvMapping {
        env_var: "PPSR_LISTEN",
        toml_path: &["listen"],
        kind: EnvKind::Str,
    },
    EnvMapping {
        env_var: "PPSR_LOG_DIR",
        toml_path: &["log_dir"],
        kind: EnvKind::Str,
    },
    EnvMapping {
        env_var: "PPSR_TARGET_URL",
        toml_path: &["target_url"],
        kind: EnvKind::Str,
    },
    EnvMapping {
        env_var: "PPSR_BROWSER_BIN",
        toml_path: &["browser", "binary_path"],
        kind: EnvKind::Str,
    },
    EnvMapping {
        env_var: "PPSR_SLOW_MO_MS",
        toml_path: &["browser", "slow_mo_ms"],
        kind: EnvKind::Int,
    },
];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Layered configuration loader.
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment and no config file.
    pub fn new() -> Self {
        Self {
            file: None,
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Merge a TOML file on top of the defaults.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment lookup (tests).
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(lookup);
        self
    }

    /// Load and merge configuration from all sources.
    pub fn load(&self) -> Result<EffectiveConfig, ConfigError> {
        let mut sources = HashMap::new();

        let mut merged = toml::Value::try_from(ServiceConfig::default())
            .map_err(|e| ConfigError::Invalid(format!("failed to serialize defaults: {e}")))?;

        if let Some(path) = &self.file {
            let content = read_config_file(path)?;
            let layer: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            deep_merge(&mut merged, &layer);
            record_sources(&layer, "", &mut sources, &ConfigSource::File(path.clone()));
        }

        for mapping in ENV_MAPPINGS {
            let Some(raw) = (self.env)(mapping.env_var) else {
                continue;
            };
            let value = env_value_to_toml(mapping, &raw)?;
            set_nested_value(&mut merged, mapping.toml_path, value);
            sources.insert(
                mapping.toml_path.join("."),
                ConfigSource::EnvVar(mapping.env_var.to_string()),
            );
        }

        let config: ServiceConfig = merged
            .try_into()
            .map_err(|e| ConfigError::Invalid(format!("failed to parse merged config: {e}")))?;
        validate_config(&config)?;

        Ok(EffectiveConfig { config, sources })
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    let read_err = |reason: String| ConfigError::Read {
        path: path.display().to_string(),
        reason,
    };
    let metadata = std::fs::metadata(path).map_err(|e| read_err(e.to_string()))?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(read_err(format!(
            "file exceeds maximum size of {MAX_CONFIG_FILE_SIZE} bytes"
        )));
    }
    std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))
}

fn env_value_to_toml(mapping: &EnvMapping, raw: &str) -> Result<toml::Value, ConfigError> {
    if raw.contains('\0') {
        return Err(ConfigError::Env {
            var: mapping.env_var.to_string(),
            reason: "contains null bytes".into(),
        });
    }
    match mapping.kind {
        EnvKind::Str => Ok(toml::Value::String(raw.trim().to_string())),
        EnvKind::Bool => Ok(toml::Value::Boolean(parse_truthy(raw))),
        EnvKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| ConfigError::Env {
                var: mapping.env_var.to_string(),
                reason: format!("must be numeric: {e}"),
            }),
    }
}

fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn record_sources(
    layer: &toml::Value,
    prefix: &str,
    sources: &mut HashMap<String, ConfigSource>,
    source: &ConfigSource,
) {
    if let toml::Value::Table(table) = layer {
        for (key, value) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            sources.insert(path.clone(), source.clone());
            record_sources(value, &path, sources, source);
        }
    }
}

fn set_nested_value(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let toml::Value::Table(table) = root else {
        return;
    };
    if rest.is_empty() {
        table.insert(first.to_string(), value);
        return;
    }
    let entry = table
        .entry(first.to_string())
        .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    set_nested_value(entry, rest, value);
}

fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.log_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("log_dir cannot be empty".into()));
    }
    if !(config.target_url.starts_with("http://") || config.target_url.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "target_url must be an http(s) URL, got {:?}",
            config.target_url
        )));
    }
    if config.log_retention_days == 0 {
        return Err(ConfigError::Invalid(
            "log_retention_days must be at least 1".into(),
        ));
    }
    if config.browser.viewport_width == 0 || config.browser.viewport_height == 0 {
        return Err(ConfigError::Invalid("viewport dimensions must be non-zero".into()));
    }
    Ok(())
}

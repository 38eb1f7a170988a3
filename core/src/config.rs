use crate::error::{Result, SmartFilterError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_ENV: &str = "SMARTFILTER_CONFIG";
pub const LOCAL_CONFIG_FILE: &str = "smartfilter.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub filter: FilterConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    /// Model name passed to the backend
    pub name: String,
    pub endpoint: String,
    /// Environment variable holding the API key; `API_KEY` then `GEMINI_API_KEY` when unset
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Gemini,
            name: "gemini-3-flash-preview".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: None,
            timeout_secs: 60,
        }
    }
}

/// Which columns the model is told to return when the request does not mention any
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionDefault {
    /// Keep every header unless the user explicitly narrows the view
    #[default]
    AllHeaders,
    /// Keep only the columns relevant to the request
    RequestedOnly,
}

impl FromStr for ProjectionDefault {
    type Err = SmartFilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all_headers" | "all" => Ok(Self::AllHeaders),
            "requested_only" | "requested" => Ok(Self::RequestedOnly),
            other => Err(SmartFilterError::config(format!(
                "unknown projection default '{other}' (expected all_headers or requested_only)"
            ))),
        }
    }
}

impl fmt::Display for ProjectionDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllHeaders => write!(f, "all_headers"),
            Self::RequestedOnly => write!(f, "requested_only"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Sample records shown to the model (capped at 10)
    pub sample_rows: usize,
    pub history_limit: usize,
    pub projection: ProjectionDefault,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sample_rows: 10,
            history_limit: 10,
            projection: ProjectionDefault::AllHeaders,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub include_header: bool,
    pub delimiter: char,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_header: true,
            delimiter: ',',
        }
    }
}

impl Config {
    /// Apply `SMARTFILTER_*` environment overrides on top of file settings
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(model) = env::var("SMARTFILTER_MODEL") {
            if !model.trim().is_empty() {
                self.model.name = model.trim().to_string();
            }
        }
        if let Ok(timeout) = env::var("SMARTFILTER_TIMEOUT_SECS") {
            self.model.timeout_secs = timeout.trim().parse().map_err(|_| {
                SmartFilterError::config(format!("SMARTFILTER_TIMEOUT_SECS is not a number: {timeout}"))
            })?;
        }
        if let Ok(projection) = env::var("SMARTFILTER_PROJECTION") {
            self.filter.projection = projection.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.timeout_secs == 0 {
            return Err(SmartFilterError::config("model.timeout_secs must be greater than zero"));
        }
        if self.filter.history_limit == 0 {
            return Err(SmartFilterError::config("filter.history_limit must be greater than zero"));
        }
        if self.model.name.trim().is_empty() {
            return Err(SmartFilterError::config("model.name must not be empty"));
        }
        Ok(())
    }
}

pub fn global_config_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home_dir) => home_dir.join(".smartfilter"),
        None => PathBuf::from(".smartfilter"),
    }
}

pub fn global_config_path() -> PathBuf {
    global_config_dir().join("global.toml")
}

pub fn local_config_path() -> Result<PathBuf> {
    Ok(env::current_dir()?.join(LOCAL_CONFIG_FILE))
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str::<toml::Table>(&content)?)
}

/// Later files override earlier ones key by key, so a local file only needs the settings it changes
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let value = match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

/// Load one config file, failing loudly on unreadable or malformed content
pub fn load_config_file(path: &Path) -> Result<Config> {
    let mut config: Config = toml::Value::Table(read_table(path)?).try_into()?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

pub fn get_config() -> Result<Config> {
    // Priority order (highest to lowest):
    // 1. Explicit config file via SMARTFILTER_CONFIG
    // 2. Local config file (smartfilter.toml), merged over
    // 3. Global config file (~/.smartfilter/global.toml)
    // 4. Defaults
    // Environment overrides apply on top of whichever was chosen.

    if let Ok(config_path) = env::var(CONFIG_ENV) {
        return load_config_file(Path::new(&config_path));
    }

    let mut table = toml::Table::new();
    let candidates = [Some(global_config_path()), local_config_path().ok()];
    for path in candidates.into_iter().flatten() {
        if !path.exists() {
            continue;
        }
        match read_table(&path) {
            Ok(overlay) => {
                log::debug!("Loaded configuration from {}", path.display());
                merge_tables(&mut table, overlay);
            }
            Err(e) => log::warn!("Ignoring unreadable config {}: {e}", path.display()),
        }
    }

    let mut config: Config = toml::Value::Table(table).try_into()?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let config_toml = toml::to_string_pretty(config)?;
    fs::write(path, config_toml)?;
    Ok(())
}

/// Where the active configuration came from, for `config show`
#[derive(Debug, Clone, Serialize)]
pub struct ConfigResolutionInfo {
    pub config_source: String,
    pub config_paths: Vec<String>,
    pub resolution_order: Vec<String>,
}

pub fn get_config_resolution_info() -> Result<ConfigResolutionInfo> {
    let mut resolution_order = Vec::new();
    let mut config_paths = Vec::new();

    if let Ok(env_config) = env::var(CONFIG_ENV) {
        resolution_order.push(format!("{CONFIG_ENV} environment variable: {env_config}"));
        resolution_order.push("Environment overrides (SMARTFILTER_MODEL, SMARTFILTER_TIMEOUT_SECS, SMARTFILTER_PROJECTION)".to_string());
        return Ok(ConfigResolutionInfo {
            config_source: "environment_variable".to_string(),
            config_paths: vec![env_config],
            resolution_order,
        });
    }

    let local = local_config_path()?;
    let global = global_config_path();
    resolution_order.push(format!("Current directory config: {}", local.display()));
    resolution_order.push(format!("Global config: {}", global.display()));
    resolution_order.push("Environment overrides (SMARTFILTER_MODEL, SMARTFILTER_TIMEOUT_SECS, SMARTFILTER_PROJECTION)".to_string());
    resolution_order.push("Built-in defaults".to_string());

    let mut config_source = "default";
    if global.exists() {
        config_source = "global";
        config_paths.push(global.to_string_lossy().to_string());
    }
    if local.exists() {
        config_source = "current_directory";
        config_paths.push(local.to_string_lossy().to_string());
    }

    Ok(ConfigResolutionInfo {
        config_source: config_source.to_string(),
        config_paths,
        resolution_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model.name, "gemini-3-flash-preview");
        assert_eq!(config.model.timeout_secs, 60);
        assert_eq!(config.filter.sample_rows, 10);
        assert_eq!(config.filter.history_limit, 10);
        assert_eq!(config.filter.projection, ProjectionDefault::AllHeaders);
        assert!(config.export.include_header);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_content = r#"
[model]
name = "gemini-2.5-pro"

[filter]
projection = "requested_only"
"#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.model.name, "gemini-2.5-pro");
        assert_eq!(config.model.timeout_secs, 60);
        assert_eq!(config.filter.projection, ProjectionDefault::RequestedOnly);
        assert_eq!(config.filter.history_limit, 10);
        assert_eq!(config.export.delimiter, ',');
    }

    #[test]
    fn test_local_settings_merge_over_global() {
        let mut global: toml::Table = toml::from_str(
            r#"
[model]
name = "global-model"
timeout_secs = 30

[export]
delimiter = ";"
"#,
        )
        .unwrap();
        let local: toml::Table = toml::from_str("[model]\nname = \"local-model\"\n").unwrap();
        merge_tables(&mut global, local);

        let config: Config = toml::Value::Table(global).try_into().unwrap();
        assert_eq!(config.model.name, "local-model");
        assert_eq!(config.model.timeout_secs, 30);
        assert_eq!(config.export.delimiter, ';');
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("smartfilter.toml");
        let mut config = Config::default();
        config.filter.history_limit = 3;
        config.model.api_key_env = Some("MY_KEY".to_string());

        save_config(&config, &path).unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.filter.history_limit, 3);
        assert_eq!(loaded.model.api_key_env.as_deref(), Some("MY_KEY"));
    }

    #[test]
    fn test_malformed_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[model\nname = ").unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(SmartFilterError::Toml(_))
        ));
    }

    #[test]
    fn test_projection_parsing() {
        assert_eq!("requested-only".parse::<ProjectionDefault>().unwrap(), ProjectionDefault::RequestedOnly);
        assert_eq!("ALL_HEADERS".parse::<ProjectionDefault>().unwrap(), ProjectionDefault::AllHeaders);
        assert!("some".parse::<ProjectionDefault>().is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.filter.history_limit = 0;
        assert!(config.validate().is_err());
    }
}

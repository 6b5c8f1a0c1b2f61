use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_TENANTS};
use crate::common::error::ConfigError;

/// Config file read when `LOAN_SYNC_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "loan_sync.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub warehouse: WarehouseConfig,
    pub registry: RegistryConfig,
    pub tenants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub schema_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            sources: SourcesConfig::default(),
            warehouse: WarehouseConfig::default(),
            registry: RegistryConfig::default(),
            tenants: DEFAULT_TENANTS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/sources"),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::Sqlite,
            root: PathBuf::from("data/warehouse"),
        }
    }
}

impl Config {
    /// Load `.env`, then the config file (`LOAN_SYNC_CONFIG` or `loan_sync.toml`, optional
    /// when using the default path), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], but an explicit path takes the place of `LOAN_SYNC_CONFIG`.
    /// Environment overrides apply either way.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::layered(path, |name| env::var(name).ok())
    }

    /// File layer, then override layer, then validation. `lookup` resolves variable names.
    fn layered<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match lookup("LOAN_SYNC_CONFIG") {
                Some(path) => Self::read_file(Path::new(&path))?,
                None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                    Self::read_file(Path::new(DEFAULT_CONFIG_PATH))?
                }
                None => Self::default(),
            },
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("LOAN_SYNC_CHUNK_SIZE") {
            self.pipeline.chunk_size = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("LOAN_SYNC_CHUNK_SIZE is not a number: '{}'", raw))
            })?;
        }
        if let Some(root) = lookup("LOAN_SYNC_SOURCE_ROOT") {
            self.sources.root = PathBuf::from(root);
        }
        if let Some(root) = lookup("LOAN_SYNC_WAREHOUSE_ROOT") {
            self.warehouse.root = PathBuf::from(root);
        }
        if let Some(tenants) = lookup("LOAN_SYNC_TENANTS") {
            self.tenants = parse_tenant_list(&tenants);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.chunk_size == 0 {
            return Err(ConfigError::Invalid("pipeline.chunk_size must be at least 1".to_string()));
        }
        if self.tenants.is_empty() {
            return Err(ConfigError::Invalid("no tenants configured".to_string()));
        }
        Ok(())
    }
}

fn parse_tenant_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::Builder;

use crate::error::MigrateError;
use crate::pagination::{PaginationConfig, ParamValue};

pub const DEFAULT_CONFIG_FILE: &str = "pokemon-migrate.json";
pub const DEFAULT_LIST_URL: &str = "https://pokeapi.co/api/v2/pokemon";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub source: SourceConfig,
}

/// Editable migration settings. `promoted` holds opaque entity ids that are
/// stored and echoed back but never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub limit: Option<ParamValue>,
    pub offset: Option<ParamValue>,
    pub promoted: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            limit: Some(ParamValue::Number(151)),
            offset: Some(ParamValue::Number(0)),
            promoted: Vec::new(),
        }
    }
}

impl Settings {
    pub fn pagination(&self) -> PaginationConfig {
        PaginationConfig::new(self.limit.clone(), self.offset.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub list_url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub request_options: Value,
    pub cache_dir: Option<Utf8PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            list_url: DEFAULT_LIST_URL.to_string(),
            method: "GET".to_string(),
            headers: BTreeMap::from([("Accept".to_string(), "application/json".to_string())]),
            request_options: Value::Object(Default::default()),
            cache_dir: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn config_path(path: Option<&str>) -> PathBuf {
        match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Loads the config file. A missing default file yields the defaults; an
    /// explicitly named file must exist.
    pub fn resolve(path: Option<&str>) -> Result<Config, MigrateError> {
        let config_path = Self::config_path(path);

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MigrateError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    /// Like `resolve`, but a missing file of any name yields the defaults so
    /// a new settings file can be started at that path.
    pub fn resolve_or_default(path: Option<&str>) -> Result<Config, MigrateError> {
        if !Self::config_path(path).exists() {
            return Ok(Config::default());
        }
        Self::resolve(path)
    }

    pub fn parse(content: &str) -> Result<Config, MigrateError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|err| MigrateError::ConfigParse(err.to_string()))?;
        if !config.source.request_options.is_object() && !config.source.request_options.is_null() {
            return Err(MigrateError::ConfigParse(
                "source.request_options must be an object".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn save(config: &Config, path: &Utf8Path) -> Result<(), MigrateError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(config)
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("pokemon-migrate-config")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

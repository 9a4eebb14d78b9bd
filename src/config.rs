use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::compare::DEFAULT_THRESHOLD;
use crate::domain::IdMode;
use crate::error::SampleError;

pub const DEFAULT_CONFIG_FILE: &str = "wwsm.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub mapping_file: Option<String>,
    #[serde(default)]
    pub sites_file: Option<String>,
    #[serde(default)]
    pub id_mode: Option<IdMode>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub date_prefix: Option<bool>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub mapping_file: Option<Utf8PathBuf>,
    pub sites_file: Option<Utf8PathBuf>,
    pub id_mode: IdMode,
    pub suffix: Option<String>,
    pub date_prefix: bool,
    pub threshold: f64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            mapping_file: None,
            sites_file: None,
            id_mode: IdMode::Current,
            suffix: None,
            date_prefix: false,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the default `wwsm.json` is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SampleError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SampleError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SampleError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SampleError> {
        let threshold = config.threshold.unwrap_or(DEFAULT_THRESHOLD);
        validate_threshold(threshold)?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            mapping_file: config.mapping_file.map(Utf8PathBuf::from),
            sites_file: config.sites_file.map(Utf8PathBuf::from),
            id_mode: config.id_mode.unwrap_or_default(),
            suffix: config.suffix,
            date_prefix: config.date_prefix.unwrap_or(false),
            threshold,
        })
    }
}

pub fn validate_threshold(threshold: f64) -> Result<(), SampleError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(SampleError::InvalidThreshold(threshold))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.id_mode, IdMode::Current);
        assert_eq!(resolved.threshold, DEFAULT_THRESHOLD);
        assert!(!resolved.date_prefix);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = Config {
            threshold: Some(1.5),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(SampleError::InvalidThreshold(_))
        );
    }
}

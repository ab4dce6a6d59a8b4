use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_DATABASE_PATH;
use crate::dispatch::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
use crate::error::DexError;
use crate::pokeapi::DEFAULT_BASE_URL;
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;

pub const DEFAULT_CONFIG_FILE: &str = "dex-catalog.json";
pub const DEFAULT_LISTING_LIMIT: usize = 1025;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Contents of `dex-catalog.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub listing_limit: Option<usize>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub snapshot_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub database_path: Option<Utf8PathBuf>,
}

/// Command-line values that win over the config file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub concurrency: Option<usize>,
    pub listing_limit: Option<usize>,
    pub snapshot_path: Option<Utf8PathBuf>,
    pub database_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub base_url: String,
    pub listing_limit: usize,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub snapshot_path: Utf8PathBuf,
    pub database_path: Utf8PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            listing_limit: DEFAULT_LISTING_LIMIT,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            snapshot_path: Utf8PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            database_path: Utf8PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), DexError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(DexError::InvalidConcurrency(self.concurrency));
        }
        if self.listing_limit == 0 {
            return Err(DexError::InvalidListingLimit(self.listing_limit));
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `dex-catalog.json` when present, then applies `overrides`.
    ///
    /// Only an explicitly named file has to exist.
    pub fn resolve(
        path: Option<&Utf8Path>,
        overrides: ConfigOverrides,
    ) -> Result<PipelineConfig, DexError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = Utf8Path::new(DEFAULT_CONFIG_FILE);
                if default_path.as_std_path().exists() {
                    Self::read(default_path)?
                } else {
                    Config::default()
                }
            }
        };
        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<PipelineConfig, DexError> {
        let defaults = PipelineConfig::default();
        let resolved = PipelineConfig {
            base_url: config.base_url.unwrap_or(defaults.base_url),
            listing_limit: overrides
                .listing_limit
                .or(config.listing_limit)
                .unwrap_or(defaults.listing_limit),
            concurrency: overrides
                .concurrency
                .or(config.concurrency)
                .unwrap_or(defaults.concurrency),
            request_timeout: config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            snapshot_path: overrides
                .snapshot_path
                .or(config.snapshot_path)
                .unwrap_or(defaults.snapshot_path),
            database_path: overrides
                .database_path
                .or(config.database_path)
                .unwrap_or(defaults.database_path),
        };
        resolved.validate()?;
        Ok(resolved)
    }

    fn read(path: &Utf8Path) -> Result<Config, DexError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| DexError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| DexError::ConfigParse(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved =
            ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default()).unwrap();
        assert_eq!(resolved, PipelineConfig::default());
        assert_eq!(resolved.concurrency, 100);
        assert_eq!(resolved.snapshot_path, "data/dex.json");
    }

    #[test]
    fn overrides_win_over_file() {
        let config = Config {
            concurrency: Some(8),
            listing_limit: Some(151),
            ..Config::default()
        };
        let overrides = ConfigOverrides {
            concurrency: Some(2),
            ..ConfigOverrides::default()
        };
        let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
        assert_eq!(resolved.concurrency, 2);
        assert_eq!(resolved.listing_limit, 151);
    }
}

//! Read-only access to the shared engine configuration.
//!
//! The base configuration is a Freqtrade JSON document owned by the user.
//! The orchestrator only reads job identities out of it; every other key is
//! passed through to the worker untouched.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, Result};

/// Base config path used when `--config` is not given.
pub const DEFAULT_BASE_CONFIG: &str = "user_config/config.json";

/// Tried when the default base config is missing.
pub const FALLBACK_BASE_CONFIG: &str = "user_data/config.json";

#[derive(Debug, Default, Deserialize)]
struct RawBaseConfig {
    #[serde(default)]
    exchange: RawExchange,
    #[serde(default)]
    freqai: RawFreqai,
}

#[derive(Debug, Default, Deserialize)]
struct RawExchange {
    #[serde(default)]
    pair_whitelist: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFreqai {
    #[serde(default)]
    feature_parameters: RawFeatureParameters,
}

#[derive(Debug, Default, Deserialize)]
struct RawFeatureParameters {
    #[serde(default)]
    include_corr_pairlist: Option<Vec<String>>,
}

/// The parts of the base configuration the orchestrator cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseConfig {
    path: PathBuf,
    pairs: Vec<String>,
    corr_pairs: Vec<String>,
}

impl BaseConfig {
    /// Parse base configuration JSON read from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn parse_json(path: &Path, content: &str) -> Result<Self> {
        let raw: RawBaseConfig =
            serde_json::from_str(content).map_err(|source| ConfigError::ParseJson {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            pairs: raw.exchange.pair_whitelist.unwrap_or_default(),
            corr_pairs: raw
                .freqai
                .feature_parameters
                .include_corr_pairlist
                .unwrap_or_default(),
        })
    }

    /// Load the base configuration from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_json(path, &content)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pairs from `exchange.pair_whitelist`, in file order.
    #[must_use]
    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Whitelist plus `freqai.feature_parameters.include_corr_pairlist`,
    /// sorted and deduplicated. These all need data coverage.
    #[must_use]
    pub fn data_pairs(&self) -> Vec<String> {
        let mut all: Vec<String> = self.pairs.iter().chain(&self.corr_pairs).cloned().collect();
        all.sort();
        all.dedup();
        all
    }

    /// The job identities for this run: the explicit list if one was given,
    /// otherwise the whitelist.
    ///
    /// # Errors
    ///
    /// Returns an error if neither source yields a pair.
    pub fn job_pairs(&self, explicit: Option<&[String]>) -> Result<Vec<String>> {
        if let Some(pairs) = explicit.filter(|p| !p.is_empty()) {
            return Ok(pairs.to_vec());
        }
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs {
                path: self.path.clone(),
            }
            .into());
        }
        Ok(self.pairs.clone())
    }
}

/// Resolve which base configuration file to use.
///
/// An existing `requested` path wins. When the default path is requested but
/// missing, [`FALLBACK_BASE_CONFIG`] is used if present.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when no candidate exists.
pub fn resolve_base_path(requested: &Path) -> Result<PathBuf> {
    if requested.exists() {
        return Ok(requested.to_path_buf());
    }

    let fallback = Path::new(FALLBACK_BASE_CONFIG);
    if requested == Path::new(DEFAULT_BASE_CONFIG) && fallback.exists() {
        info!(
            path = %fallback.display(),
            "default config not found; falling back"
        );
        return Ok(fallback.to_path_buf());
    }

    Err(ConfigError::NotFound {
        path: requested.to_path_buf(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const CONFIG: &str = r#"{
        "exchange": {
            "name": "binance",
            "pair_whitelist": ["BTC/USDT:USDT", "ETH/USDT:USDT"]
        },
        "freqai": {
            "identifier": "base",
            "feature_parameters": {
                "include_corr_pairlist": ["ETH/USDT:USDT", "SOL/USDT:USDT"]
            }
        },
        "max_open_trades": 3
    }"#;

    #[test]
    fn parse_reads_whitelist_in_order() {
        let base = BaseConfig::parse_json(Path::new("cfg.json"), CONFIG).unwrap();
        assert_eq!(base.pairs(), ["BTC/USDT:USDT", "ETH/USDT:USDT"]);
    }

    #[test]
    fn data_pairs_merges_correlated_pairs() {
        let base = BaseConfig::parse_json(Path::new("cfg.json"), CONFIG).unwrap();
        assert_eq!(
            base.data_pairs(),
            ["BTC/USDT:USDT", "ETH/USDT:USDT", "SOL/USDT:USDT"]
        );
    }

    #[test]
    fn explicit_pairs_bypass_whitelist() {
        let base = BaseConfig::parse_json(Path::new("cfg.json"), CONFIG).unwrap();
        let explicit = vec!["XRP/USDT:USDT".to_string()];
        assert_eq!(base.job_pairs(Some(&explicit)).unwrap(), explicit);
    }

    #[test]
    fn empty_whitelist_is_an_error() {
        let base = BaseConfig::parse_json(Path::new("cfg.json"), r#"{"exchange": {}}"#).unwrap();
        assert!(matches!(
            base.job_pairs(None),
            Err(Error::Config(ConfigError::NoPairs { .. }))
        ));
        assert!(matches!(
            base.job_pairs(Some(&[])),
            Err(Error::Config(ConfigError::NoPairs { .. }))
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let result = BaseConfig::parse_json(Path::new("cfg.json"), "{ not json");
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::ParseJson { .. }))
        ));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let result = BaseConfig::load(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(Error::Config(ConfigError::NotFound { .. }))));
    }

    #[test]
    fn resolve_prefers_existing_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, CONFIG).unwrap();

        assert_eq!(resolve_base_path(&path).unwrap(), path);
        assert!(resolve_base_path(&dir.path().join("missing.json")).is_err());
    }
}

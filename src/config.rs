//! Runtime configuration.
//!
//! Defaults suit a single local user; every value can be overridden by an
//! environment variable (`SAGE_<KEY>`).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::answer::DEFAULT_CONTEXT_TOKENS;
use crate::chroma::{COLLECTION_CHUNKS, DEFAULT_BATCH_SIZE};
use crate::citations::DEFAULT_EXCERPT_CHARS;
use crate::documents::{SegmentConfig, SegmentError, DEFAULT_TOP_K};

/// App identifier, matches the platform data directory name
pub const APP_IDENTIFIER: &str = "com.sage.dev";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("Invalid segmentation config: {0}")]
    Segment(#[from] SegmentError),
    #[error("Could not determine data directory")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SageConfig {
    pub segment: SegmentConfig,
    pub top_k: usize,
    pub excerpt_chars: usize,
    pub context_token_budget: u32,
    pub index_batch_size: usize,
    /// Chroma server; the local index is used when unset
    pub chroma_url: Option<String>,
    pub collection: String,
    pub data_dir: PathBuf,
}

impl SageConfig {
    /// Defaults with overrides from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults with overrides from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("SAGE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir().ok_or(ConfigError::NoDataDir)?.join(APP_IDENTIFIER),
        };

        let defaults = SegmentConfig::default();
        let segment = SegmentConfig::new(
            parse(&lookup, "SAGE_WINDOW_SIZE", defaults.window_size)?,
            parse(&lookup, "SAGE_OVERLAP", defaults.overlap)?,
        )?;

        let index_batch_size = parse(&lookup, "SAGE_INDEX_BATCH", DEFAULT_BATCH_SIZE)?;
        if index_batch_size == 0 {
            return Err(ConfigError::Invalid { key: "SAGE_INDEX_BATCH", value: "0".to_string() });
        }

        Ok(Self {
            segment,
            top_k: parse(&lookup, "SAGE_TOP_K", DEFAULT_TOP_K)?,
            excerpt_chars: parse(&lookup, "SAGE_EXCERPT_CHARS", DEFAULT_EXCERPT_CHARS)?,
            context_token_budget: parse(&lookup, "SAGE_CONTEXT_TOKENS", DEFAULT_CONTEXT_TOKENS)?,
            index_batch_size,
            chroma_url: lookup("SAGE_CHROMA_URL").filter(|url| !url.trim().is_empty()),
            collection: lookup("SAGE_COLLECTION").unwrap_or_else(|| COLLECTION_CHUNKS.to_string()),
            data_dir,
        })
    }

    /// Location of the JSON store snapshot
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SageConfig::from_lookup(lookup(&[("SAGE_DATA_DIR", "/tmp/sage")])).unwrap();
        assert_eq!(config.segment, SegmentConfig { window_size: 1000, overlap: 150 });
        assert_eq!(config.top_k, 10);
        assert_eq!(config.excerpt_chars, 100);
        assert_eq!(config.index_batch_size, 96);
        assert_eq!(config.collection, "sage-vector-index");
        assert!(config.chroma_url.is_none());
        assert_eq!(config.store_path(), PathBuf::from("/tmp/sage/store.json"));
    }

    #[test]
    fn test_overrides() {
        let config = SageConfig::from_lookup(lookup(&[
            ("SAGE_DATA_DIR", "/tmp/sage"),
            ("SAGE_WINDOW_SIZE", "500"),
            ("SAGE_OVERLAP", " 50 "),
            ("SAGE_TOP_K", "4"),
            ("SAGE_CHROMA_URL", "http://localhost:8000"),
        ])).unwrap();
        assert_eq!(config.segment, SegmentConfig { window_size: 500, overlap: 50 });
        assert_eq!(config.top_k, 4);
        assert_eq!(config.chroma_url.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SageConfig::from_lookup(lookup(&[("SAGE_DATA_DIR", "/tmp"), ("SAGE_TOP_K", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SAGE_TOP_K", .. }));

        let err = SageConfig::from_lookup(lookup(&[("SAGE_DATA_DIR", "/tmp"), ("SAGE_OVERLAP", "1000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Segment(_)));

        let err = SageConfig::from_lookup(lookup(&[("SAGE_DATA_DIR", "/tmp"), ("SAGE_INDEX_BATCH", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SAGE_INDEX_BATCH", .. }));
    }
}

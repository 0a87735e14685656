use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fusion_search::DuplicatePolicy;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "RANK_FUSE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "rank-fuse.toml";

/// Optional `rank-fuse.toml`:
///
/// ```toml
/// k = 60.0
/// limit = 10
/// duplicates = "keep_first"
///
/// [weights]
/// vectorPipeline = 0.7
/// textPipeline = 0.3
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuseConfig {
    pub k: Option<f64>,
    pub limit: Option<usize>,
    pub duplicates: Option<DuplicatePolicy>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl FuseConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid rank-fuse config")
    }

    /// Explicit path, then `$RANK_FUSE_CONFIG`, then `./rank-fuse.toml` if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(|| {
                    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                    default.is_file().then_some(default)
                }),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };
        log::debug!("Loading config from {}", path.display());
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }
}

//! Store configuration.
//!
//! Defaults follow the conventional per-user layout: the cache lives under
//! `$HOME/.local/share/obsdb/`. Environment variables override the pieces
//! that tests and unusual installs need to move.

use std::path::PathBuf;

use crate::errors::ObsError;
use crate::services::synoptic::SYNOPTIC_API_URL;

/// User-Agent sent with every upstream request.
const DEFAULT_USER_AGENT: &str = "obsdb/0.1 hourly observation archive";

/// Configuration for one observation store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the cache file; created on first connect.
    pub cache_dir: PathBuf,
    /// Synoptic Labs API key, sent as the `token` query parameter.
    pub api_key: String,
    /// User-Agent for upstream requests.
    pub user_agent: String,
    /// Base URL of the upstream timeseries endpoint.
    pub base_url: String,
}

impl StoreConfig {
    /// Build the default configuration for `api_key`.
    ///
    /// `OBSDB_CACHE_DIR` overrides the cache directory and `OBSDB_USER_AGENT`
    /// the User-Agent. Without an override the cache lives under
    /// `$HOME/.local/share/obsdb/`; an unset `HOME` is an error because there
    /// is nowhere sensible to put the cache.
    pub fn new(api_key: &str) -> Result<Self, ObsError> {
        let cache_dir = match std::env::var_os("OBSDB_CACHE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var_os("HOME").ok_or_else(|| {
                    ObsError::CacheUnavailable(
                        "HOME is not set; cannot locate the cache directory".to_string(),
                    )
                })?;
                PathBuf::from(home).join(".local").join("share").join("obsdb")
            }
        };

        let user_agent =
            std::env::var("OBSDB_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            cache_dir,
            api_key: api_key.to_string(),
            user_agent,
            base_url: SYNOPTIC_API_URL.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test covers both env paths: cargo runs tests in parallel threads
    // and OBSDB_CACHE_DIR is process-global state.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("OBSDB_CACHE_DIR", "/tmp/obsdb-test-cache");
        let config = StoreConfig::new("a-token").unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/obsdb-test-cache"));
        assert_eq!(config.api_key, "a-token");
        assert_eq!(config.base_url, SYNOPTIC_API_URL);

        std::env::remove_var("OBSDB_CACHE_DIR");
        let config = StoreConfig::new("a-token").unwrap();
        assert!(config.cache_dir.ends_with(".local/share/obsdb"));
        assert!(config.user_agent.contains("obsdb"));
    }
}

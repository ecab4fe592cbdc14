//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Upper bound for every `*_secs` duration setting (one year).
///
/// Keeps `now - ttl - grace` representable as an `OffsetDateTime`.
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path. `:memory:` opens a private in-memory database.
        path: PathBuf,
        /// Seconds to wait for the pooled connection before a query fails.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // 10 minutes
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("metadata.path must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Storage backend configuration.
///
/// The backend physically stores chunks and merges them into the final
/// object; Loft only sends merge and delete requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackendConfig {
    /// Local filesystem backend (single node deployments and tests).
    Filesystem {
        /// Root directory for chunks and merged objects.
        path: PathBuf,
    },
    /// Remote merge service reached over HTTP.
    Http {
        /// Base URL, e.g. `http://storage:7070/`.
        endpoint: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for StorageBackendConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageBackendConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageBackendConfig::Filesystem { .. } => Ok(()),
            StorageBackendConfig::Http {
                endpoint,
                timeout_secs,
            } => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(format!(
                        "storage.endpoint must be an http(s) URL, got '{endpoint}'"
                    ));
                }
                if *timeout_secs == 0 {
                    return Err("storage.timeout_secs must be greater than 0".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Upload token configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token lifetime in seconds (default: 60).
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum number of live entries in the in-process token cache.
    #[serde(default = "default_token_max_entries")]
    pub max_entries: usize,
}

fn default_token_ttl_secs() -> u64 {
    crate::DEFAULT_TOKEN_TTL_SECS
}

fn default_token_max_entries() -> usize {
    100_000
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl_secs(),
            max_entries: default_token_max_entries(),
        }
    }
}

impl TokenConfig {
    /// Token lifetime as a std Duration.
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("tokens.ttl_secs must be greater than 0".to_string());
        }
        if self.ttl_secs > MAX_DURATION_SECS {
            return Err(format!(
                "tokens.ttl_secs {} exceeds maximum value {MAX_DURATION_SECS}",
                self.ttl_secs
            ));
        }
        if self.max_entries == 0 {
            return Err("tokens.max_entries must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Hierarchy traversal configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Maximum number of levels a name search descends (default: 20).
    #[serde(default = "default_max_search_depth")]
    pub max_search_depth: u32,
}

fn default_max_search_depth() -> u32 {
    crate::DEFAULT_MAX_SEARCH_DEPTH
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_search_depth: default_max_search_depth(),
        }
    }
}

impl HierarchyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_search_depth == 0 {
            return Err("hierarchy.max_search_depth must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Temp file sweeper configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Run the sweeper in the background (default: true).
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Extra time after token expiry before an unfinished temp file is reclaimed.
    #[serde(default = "default_sweep_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Age after which a temp file stuck in `merging` is considered abandoned.
    #[serde(default = "default_stuck_merge_secs")]
    pub stuck_merge_secs: u64,
    /// Maximum temp files reclaimed per pass.
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: u32,
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_sweep_grace_period_secs() -> u64 {
    60
}

fn default_stuck_merge_secs() -> u64 {
    3600 // 1 hour
}

fn default_sweep_batch_size() -> u32 {
    500
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweep_interval_secs(),
            grace_period_secs: default_sweep_grace_period_secs(),
            stuck_merge_secs: default_stuck_merge_secs(),
            batch_size: default_sweep_batch_size(),
        }
    }
}

impl SweeperConfig {
    /// Interval between sweeps as a std Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Grace period as a time Duration.
    pub fn grace_period(&self) -> Duration {
        Duration::seconds(self.grace_period_secs as i64)
    }

    /// Stuck-merge threshold as a time Duration.
    pub fn stuck_merge_after(&self) -> Duration {
        Duration::seconds(self.stuck_merge_secs as i64)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("interval_secs", self.interval_secs),
            ("grace_period_secs", self.grace_period_secs),
            ("stuck_merge_secs", self.stuck_merge_secs),
        ] {
            if value > MAX_DURATION_SECS {
                return Err(format!(
                    "sweeper.{field} {value} exceeds maximum value {MAX_DURATION_SECS}"
                ));
            }
        }
        if self.enabled && self.interval_secs == 0 {
            return Err("sweeper.interval_secs must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("sweeper.batch_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageBackendConfig,
    /// Upload token configuration.
    #[serde(default)]
    pub tokens: TokenConfig,
    /// Hierarchy traversal configuration.
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    /// Temp file sweeper configuration.
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses an in-memory SQLite database and disables
    /// the background sweeper.
    pub fn for_testing() -> Self {
        Self {
            metadata: MetadataConfig::Sqlite {
                path: PathBuf::from(":memory:"),
                query_timeout_secs: None,
            },
            storage: StorageBackendConfig::default(),
            tokens: TokenConfig::default(),
            hierarchy: HierarchyConfig::default(),
            sweeper: SweeperConfig {
                enabled: false,
                ..SweeperConfig::default()
            },
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.storage.validate()?;
        self.tokens.validate()?;
        self.hierarchy.validate()?;
        self.sweeper.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.tokens.ttl_secs, 60);
        assert_eq!(config.hierarchy.max_search_depth, 20);
        assert!(config.sweeper.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "storage": {"type": "http", "endpoint": "http://storage:7070/"},
            "hierarchy": {"max_search_depth": 5}
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.hierarchy.max_search_depth, 5);
        match config.storage {
            StorageBackendConfig::Http { timeout_secs, .. } => assert_eq!(timeout_secs, 30),
            _ => panic!("expected http storage config"),
        }
        assert_eq!(config.tokens.ttl_secs, 60);
    }

    #[test]
    fn test_storage_http_rejects_non_http_endpoint() {
        let config = StorageBackendConfig::Http {
            endpoint: "storage:7070".to_string(),
            timeout_secs: 10,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_search_depth_rejected() {
        let config = HierarchyConfig {
            max_search_depth: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweeper_rejects_zero_interval_when_enabled() {
        let config = SweeperConfig {
            interval_secs: 0,
            ..SweeperConfig::default()
        };
        assert!(config.validate().is_err());

        let disabled = SweeperConfig {
            enabled: false,
            interval_secs: 0,
            ..SweeperConfig::default()
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_durations_capped_at_one_year() {
        let at_cap = TokenConfig {
            ttl_secs: MAX_DURATION_SECS,
            ..TokenConfig::default()
        };
        assert!(at_cap.validate().is_ok());
        let over = TokenConfig {
            ttl_secs: MAX_DURATION_SECS + 1,
            ..TokenConfig::default()
        };
        assert!(over.validate().is_err());
        let huge = TokenConfig {
            ttl_secs: 1_000_000_000_000_000,
            ..TokenConfig::default()
        };
        assert!(huge.validate().is_err());

        let sweeper = SweeperConfig {
            grace_period_secs: MAX_DURATION_SECS,
            stuck_merge_secs: MAX_DURATION_SECS,
            ..SweeperConfig::default()
        };
        assert!(sweeper.validate().is_ok());
        for over in [
            SweeperConfig {
                grace_period_secs: MAX_DURATION_SECS + 1,
                ..SweeperConfig::default()
            },
            SweeperConfig {
                stuck_merge_secs: MAX_DURATION_SECS + 1,
                ..SweeperConfig::default()
            },
            SweeperConfig {
                interval_secs: MAX_DURATION_SECS + 1,
                ..SweeperConfig::default()
            },
        ] {
            assert!(over.validate().is_err());
        }

        // The widest cutoff the sweeper computes stays representable.
        let now = time::OffsetDateTime::now_utc();
        let ttl = Duration::seconds(at_cap.ttl_secs as i64);
        assert!(
            now.checked_sub(ttl)
                .and_then(|t| t.checked_sub(sweeper.grace_period()))
                .is_some()
        );
    }

    #[test]
    fn test_for_testing_disables_sweeper() {
        let config = AppConfig::for_testing();
        assert!(!config.sweeper.enabled);
        assert!(config.validate().is_ok());
    }
}

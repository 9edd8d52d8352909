//! Pool configuration
//!
//! Seven values govern every backoff policy. All durations are milliseconds.
//! Missing keys in a TOML file fall back to the defaults below.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Backoff parameters for the pool. Immutable once handed to `Pool::new`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Cooldown applied when unclassified errors reach `max_error_count`
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Consecutive server/unknown errors before an account is cut off
    #[serde(default = "default_max_error_count")]
    pub max_error_count: u32,
    /// Cooldown after a quota/rate-limit response
    #[serde(default = "default_quota_reset_ms")]
    pub quota_reset_ms: u64,
    #[serde(default = "default_network_cooldown_ms")]
    pub network_cooldown_ms: u64,
    #[serde(default = "default_server_cooldown_ms")]
    pub server_cooldown_ms: u64,
    /// Delay before an auth-broken account is retried automatically
    #[serde(default = "default_auto_recover_ms")]
    pub auto_recover_ms: u64,
    /// Tolerance after token expiry during which the account stays usable
    #[serde(default = "default_expiry_grace_period_ms")]
    pub expiry_grace_period_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_max_error_count() -> u32 {
    3
}

fn default_quota_reset_ms() -> u64 {
    3_600_000
}

fn default_network_cooldown_ms() -> u64 {
    10_000
}

fn default_server_cooldown_ms() -> u64 {
    30_000
}

fn default_auto_recover_ms() -> u64 {
    300_000
}

fn default_expiry_grace_period_ms() -> u64 {
    60_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            max_error_count: default_max_error_count(),
            quota_reset_ms: default_quota_reset_ms(),
            network_cooldown_ms: default_network_cooldown_ms(),
            server_cooldown_ms: default_server_cooldown_ms(),
            auto_recover_ms: default_auto_recover_ms(),
            expiry_grace_period_ms: default_expiry_grace_period_ms(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(common::Error::from)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: PoolConfig = toml::from_str(contents).map_err(common::Error::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pool unusable.
    ///
    /// Zero durations are allowed and mean "expires immediately".
    pub fn validate(&self) -> Result<()> {
        if self.max_error_count == 0 {
            return Err(common::Error::Config("max_error_count must be greater than 0".into()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PoolConfig::default();
        assert_eq!(config.cooldown_ms, 60_000);
        assert_eq!(config.max_error_count, 3);
        assert_eq!(config.quota_reset_ms, 3_600_000);
        assert_eq!(config.network_cooldown_ms, 10_000);
        assert_eq!(config.server_cooldown_ms, 30_000);
        assert_eq!(config.auto_recover_ms, 300_000);
        assert_eq!(config.expiry_grace_period_ms, 60_000);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = PoolConfig::from_toml_str("").unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = PoolConfig::from_toml_str(
            r#"
cooldown_ms = 5000
max_error_count = 5
"#,
        )
        .unwrap();
        assert_eq!(config.cooldown_ms, 5000);
        assert_eq!(config.max_error_count, 5);
        assert_eq!(config.quota_reset_ms, 3_600_000);
        assert_eq!(config.auto_recover_ms, 300_000);
    }

    #[test]
    fn zero_max_error_count_rejected() {
        let result = PoolConfig::from_toml_str("max_error_count = 0");
        let err = result.unwrap_err().to_string();
        assert!(
            err.contains("max_error_count must be greater than 0"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn zero_durations_accepted() {
        let config = PoolConfig::from_toml_str("cooldown_ms = 0\nnetwork_cooldown_ms = 0").unwrap();
        assert_eq!(config.cooldown_ms, 0);
        assert_eq!(config.network_cooldown_ms, 0);
    }

    #[test]
    fn invalid_toml_rejected() {
        assert!(PoolConfig::from_toml_str("not valid {{{{ toml").is_err());
    }

    #[test]
    fn wrong_type_rejected() {
        assert!(PoolConfig::from_toml_str("cooldown_ms = \"soon\"").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(&path, "server_cooldown_ms = 1234\n").unwrap();

        let config = PoolConfig::load(&path).unwrap();
        assert_eq!(config.server_cooldown_ms, 1234);
        assert_eq!(config.network_cooldown_ms, 10_000);
    }

    #[test]
    fn load_missing_file() {
        let result = PoolConfig::load(Path::new("/nonexistent/path/pool.toml"));
        assert!(result.is_err());
    }
}

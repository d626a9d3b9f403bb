//! Harness configuration
//!
//! Loaded from YAML, then overridden from `PARA_TEST_*` environment
//! variables so CI can point the same suite at a different node.
//!
//! ```yaml
//! endpoint: "ws://127.0.0.1:9944"
//! block_time_ms: 12000
//! settlement:
//!   max_attempts: 20
//!   poll_interval_ms: 6000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::Duration;

use para_common::{
    config::{
        ALITH_SECRET, DEFAULT_BLOCK_TIME_MS, DEFAULT_ENDPOINT, DEFAULT_MORTALITY_PERIOD,
        DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETTLEMENT_ATTEMPTS,
    },
    crypto::{CryptoError, KeyPair},
};

use crate::ledger::SubmitOptions;
use crate::settlement::SettlementPolicy;

pub const ENV_ENDPOINT: &str = "PARA_TEST_ENDPOINT";
pub const ENV_FUNDING_SECRET: &str = "PARA_TEST_FUNDING_SECRET";
pub const ENV_BLOCK_TIME_MS: &str = "PARA_TEST_BLOCK_TIME_MS";
pub const ENV_MAX_ATTEMPTS: &str = "PARA_TEST_MAX_ATTEMPTS";
pub const ENV_POLL_INTERVAL_MS: &str = "PARA_TEST_POLL_INTERVAL_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid funding secret: {0}")]
    Key(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettlementConfig {
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SETTLEMENT_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Node RPC endpoint.
    pub endpoint: String,
    /// Hex secret of the account that funds test accounts.
    pub funding_secret: String,
    pub block_time_ms: u64,
    /// Mortal era length of submitted transactions; `None` signs immortal.
    pub mortality_period: Option<u32>,
    pub settlement: SettlementConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            funding_secret: ALITH_SECRET.to_string(),
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            mortality_period: Some(DEFAULT_MORTALITY_PERIOD),
            settlement: SettlementConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `PARA_TEST_*` variables from the process environment.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(secret) = lookup(ENV_FUNDING_SECRET) {
            self.funding_secret = secret;
        }
        if let Some(value) = lookup(ENV_BLOCK_TIME_MS) {
            self.block_time_ms = parse_env(ENV_BLOCK_TIME_MS, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.settlement.max_attempts = parse_env(ENV_MAX_ATTEMPTS, value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.settlement.poll_interval_ms = parse_env(ENV_POLL_INTERVAL_MS, value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint is empty".to_string()));
        }
        if self.block_time_ms == 0 {
            return Err(ConfigError::Invalid("block_time_ms must be positive".to_string()));
        }
        if self.settlement.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "settlement.max_attempts must be positive".to_string(),
            ));
        }
        if self.settlement.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "settlement.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.mortality_period == Some(0) {
            return Err(ConfigError::Invalid("mortality_period must be positive".to_string()));
        }
        self.funding_keypair()?;
        Ok(())
    }

    pub fn funding_keypair(&self) -> Result<KeyPair, ConfigError> {
        Ok(KeyPair::from_secret_hex(&self.funding_secret)?)
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn settlement_policy(&self) -> SettlementPolicy {
        SettlementPolicy::new(
            self.settlement.max_attempts,
            Duration::from_millis(self.settlement.poll_interval_ms),
        )
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            wait_for_inclusion: true,
            mortality_period: self.mortality_period,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

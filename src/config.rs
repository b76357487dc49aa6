//! Runtime configuration, read from `LEDGER_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::blockchain::hash::HASH_HEX_LEN;

/// Errors that can occur while reading configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Difficulty {0} exceeds the 64 hex digits of a hash")]
    DifficultyTooHigh(usize),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Ledger and server settings
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Leading zero hex digits required in a block hash
    pub difficulty: usize,

    /// Nonces tried before mining gives up
    pub max_mining_attempts: u64,

    /// Transactions drained into one block
    pub max_block_transactions: usize,

    /// Address credited by every purchase
    pub seller_address: String,

    /// Balance of wallets the store has never seen
    pub default_balance: f64,

    /// sled directory; `None` keeps the chain in memory
    pub data_dir: Option<PathBuf>,

    pub bind_address: String,

    pub port: u16,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: 2,
            max_mining_attempts: 5_000_000,
            max_block_transactions: 100,
            seller_address: "0x1234567890abcdef".to_string(),
            default_balance: 5.0,
            data_dir: Some(PathBuf::from("data/blockchain")),
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl LedgerConfig {
    /// Builds the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        let config = LedgerConfig {
            difficulty: parse(&lookup, "LEDGER_DIFFICULTY", defaults.difficulty)?,
            max_mining_attempts: parse(&lookup, "LEDGER_MAX_MINING_ATTEMPTS", defaults.max_mining_attempts)?,
            max_block_transactions: parse(&lookup, "LEDGER_MAX_BLOCK_TRANSACTIONS", defaults.max_block_transactions)?,
            seller_address: lookup("LEDGER_SELLER_ADDRESS").unwrap_or(defaults.seller_address),
            default_balance: parse(&lookup, "LEDGER_DEFAULT_BALANCE", defaults.default_balance)?,
            data_dir: match lookup("LEDGER_DATA_DIR") {
                Some(dir) if dir.trim().is_empty() => None,
                Some(dir) => Some(PathBuf::from(dir)),
                None => defaults.data_dir,
            },
            bind_address: lookup("LEDGER_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: parse(&lookup, "LEDGER_PORT", defaults.port)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > HASH_HEX_LEN {
            return Err(ConfigError::DifficultyTooHigh(self.difficulty));
        }
        if self.max_mining_attempts == 0 {
            return Err(ConfigError::Zero("LEDGER_MAX_MINING_ATTEMPTS"));
        }
        if self.max_block_transactions == 0 {
            return Err(ConfigError::Zero("LEDGER_MAX_BLOCK_TRANSACTIONS"));
        }
        if !self.default_balance.is_finite() || self.default_balance < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "LEDGER_DEFAULT_BALANCE",
                value: self.default_balance.to_string(),
            });
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw.clone() }),
        None => Ok(default),
    }
}

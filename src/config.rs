//! Configuration management for friendbot

use crate::crypto::KeyPair;
use crate::error::FriendbotError;
use crate::minion::MinionSettings;
use crate::transaction::parse_amount;
use crate::transaction::validation::MIN_BASE_FEE;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "friendbot.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub bot: BotConfig,
    pub minions: MinionsConfig,
    #[serde(default)]
    pub funding: FundingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_passphrase")]
    pub passphrase: String,
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Hex-encoded secp256k1 secret of the funding account.
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinionsConfig {
    /// Hex-encoded secrets of the channel accounts, one minion each.
    pub secret_keys: Vec<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundingConfig {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: String,
    #[serde(default = "default_base_fee")]
    pub base_fee: u32,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            base_fee: default_base_fee(),
        }
    }
}

fn default_passphrase() -> String {
    "Test SDF Network ; September 2015".to_string()
}

fn default_ledger_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    20
}

fn default_queue_capacity() -> usize {
    64
}

fn default_starting_balance() -> String {
    "10000.00".to_string()
}

fn default_base_fee() -> u32 {
    MIN_BASE_FEE
}

impl Config {
    pub fn from_toml_str(config_str: &str) -> Result<Self, FriendbotError> {
        let config: Config =
            toml::from_str(config_str).map_err(|e| FriendbotError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configs that would only fail later, per request.
    pub fn validate(&self) -> Result<(), FriendbotError> {
        if self.network.passphrase.is_empty() {
            return Err(FriendbotError::ConfigError(
                "network.passphrase must be set".to_string(),
            ));
        }
        if self.minions.secret_keys.is_empty() {
            return Err(FriendbotError::ConfigError(
                "minions.secret_keys must list at least one key".to_string(),
            ));
        }
        if self.funding.base_fee < MIN_BASE_FEE {
            return Err(FriendbotError::ConfigError(format!(
                "funding.base_fee must be at least {}",
                MIN_BASE_FEE
            )));
        }
        parse_amount(&self.funding.starting_balance)
            .map_err(|e| FriendbotError::ConfigError(format!("funding.starting_balance: {}", e)))?;
        self.bot_keypair()?;
        self.minion_keypairs()?;
        Ok(())
    }

    pub fn bot_keypair(&self) -> Result<KeyPair, FriendbotError> {
        KeyPair::from_secret_hex(&self.bot.secret_key)
            .map_err(|e| FriendbotError::ConfigError(format!("bot.secret_key: {}", e)))
    }

    pub fn minion_keypairs(&self) -> Result<Vec<KeyPair>, FriendbotError> {
        self.minions
            .secret_keys
            .iter()
            .enumerate()
            .map(|(i, secret)| {
                KeyPair::from_secret_hex(secret).map_err(|e| {
                    FriendbotError::ConfigError(format!("minions.secret_keys[{}]: {}", i, e))
                })
            })
            .collect()
    }

    pub fn minion_settings(&self) -> MinionSettings {
        MinionSettings {
            network_passphrase: self.network.passphrase.clone(),
            starting_balance: self.funding.starting_balance.clone(),
            base_fee: self.funding.base_fee,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config, FriendbotError> {
    let config_str = fs::read_to_string(path).map_err(|e| {
        FriendbotError::ConfigError(format!("reading {}: {}", path.display(), e))
    })?;
    Config::from_toml_str(&config_str)
}

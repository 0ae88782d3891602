//! Configuration Module
//!
//! This module defines the configuration the admission pipeline is built
//! from. Configuration is loaded once at node startup from a TOML file and
//! passed by reference into stage constructors.

use crate::crypto::ChainRules;
use crate::state::FeeParams;
use anyhow::ensure;
use ethers::types::U256;
use serde::Deserialize;
use std::fs;

/// Divisor for basis-point fee rates (1 bp = 1/10000)
pub const FEE_BASIS_POINTS_DIVISOR: u64 = 10_000;

/// Default bound on container nesting checked by the nested-message scanner
pub const DEFAULT_MAX_NESTED_MSGS: usize = 6;

/// Main configuration structure
///
/// # Example TOML
/// ```toml
/// [chain]
/// chain_id = "evmos_9001-2"
/// eth_chain_id = 9001
///
/// [fees]
/// fee_denom = "aevmos"
/// min_gas_price = 0
/// fee_basis_points = 50
///
/// [scanner]
/// disabled_msg_types = ["/ethermint.evm.v1.MsgEthereumTx"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub fees: FeesConfig,
    pub auth: AuthConfig,
    pub scanner: ScannerConfig,
}

/// Chain identity and Ethereum fork schedule
///
/// Fork heights left out of the file default to genesis.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain id committed to by native signatures
    pub chain_id: String,
    /// EIP-155 chain id of Ethereum payloads
    pub eth_chain_id: u64,
    pub homestead_block: Option<u64>,
    pub eip155_block: Option<u64>,
    pub berlin_block: Option<u64>,
    pub london_block: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: "evmos_9001-2".to_string(),
            eth_chain_id: 9001,
            homestead_block: Some(0),
            eip155_block: Some(0),
            berlin_block: Some(0),
            london_block: Some(0),
        }
    }
}

impl ChainConfig {
    pub fn rules(&self) -> ChainRules {
        ChainRules {
            chain_id: self.eth_chain_id,
            homestead_block: self.homestead_block,
            eip155_block: self.eip155_block,
            berlin_block: self.berlin_block,
            london_block: self.london_block,
        }
    }
}

/// Fee policy
///
/// # Fields
/// - `fee_denom`: Denomination fees are paid in
/// - `min_gas_price`: Global price floor per unit of gas
/// - `max_gas_wanted`: Largest gas limit accepted in check mode (0 = unlimited)
/// - `fee_basis_points`: Cut charged on exempted transfers (at most 10000)
/// - `custom_fee_gas`: Gas charged for each custom fee collection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    pub fee_denom: String,
    pub min_gas_price: u64,
    pub max_gas_wanted: u64,
    pub fee_basis_points: u64,
    pub custom_fee_gas: u64,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            fee_denom: "aevmos".to_string(),
            min_gas_price: 0,
            max_gas_wanted: 40_000_000,
            fee_basis_points: 0,
            custom_fee_gas: 10_000,
        }
    }
}

impl FeesConfig {
    pub fn params(&self) -> FeeParams {
        FeeParams {
            fee_denom: self.fee_denom.clone(),
            min_gas_price: U256::from(self.min_gas_price),
            max_gas_wanted: self.max_gas_wanted,
            fee_basis_points: self.fee_basis_points,
        }
    }
}

/// Native transaction limits and signature gas costs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub max_memo_characters: usize,
    pub tx_sig_limit: usize,
    pub tx_size_cost_per_byte: u64,
    pub sig_verify_cost_secp256k1: u64,
    pub sig_verify_cost_eth_secp256k1: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_memo_characters: 256,
            tx_sig_limit: 7,
            tx_size_cost_per_byte: 10,
            sig_verify_cost_secp256k1: 1_000,
            sig_verify_cost_eth_secp256k1: 21_000,
        }
    }
}

/// Nested-message scanner settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub max_nested_msgs: usize,
    /// Message types forbidden inside containers
    pub disabled_msg_types: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_nested_msgs: DEFAULT_MAX_NESTED_MSGS,
            disabled_msg_types: vec![
                crate::types::MSG_ETHEREUM_TX.to_string(),
                "/cosmos.vesting.v1beta1.MsgCreateVestingAccount".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was read, parsed and validated
    /// * `Err` if the file couldn't be read, the TOML is invalid, or a value is out of range
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.chain.chain_id.is_empty(), "chain.chain_id must not be empty");
        ensure!(
            self.fees.fee_basis_points <= FEE_BASIS_POINTS_DIVISOR,
            "fees.fee_basis_points must be at most {FEE_BASIS_POINTS_DIVISOR}, got {}",
            self.fees.fee_basis_points
        );
        ensure!(!self.fees.fee_denom.is_empty(), "fees.fee_denom must not be empty");
        ensure!(self.scanner.max_nested_msgs > 0, "scanner.max_nested_msgs must be positive");
        Ok(())
    }
}

//! State Access Module
//!
//! Contracts of the external collaborators the admission pipeline consumes:
//! account storage, balances, the governance-controlled gas-free message set
//! and fee-policy parameters. [`StateCache`] is an in-memory implementation
//! of the storage traits.

mod cache;
pub use cache::StateCache;

use crate::types::{Account, Coin};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use std::collections::BTreeSet;
use thiserror::Error;

/// Name of the module account that receives transaction fees
pub const FEE_COLLECTOR_NAME: &str = "fee_collector";

/// Errors surfaced by storage collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("insufficient balance for {address:?}: has {available} {denom}, needs {required}")]
    InsufficientBalance {
        address: Address,
        denom: String,
        required: U256,
        available: U256,
    },

    #[error("account {0:?} not found")]
    AccountNotFound(Address),

    #[error("store write rejected: {0}")]
    WriteRejected(String),
}

/// Account storage
pub trait AccountKeeper: Send + Sync {
    fn account(&self, address: &Address) -> Option<Account>;

    fn set_account(&self, account: Account) -> Result<(), StoreError>;

    /// Build a fresh base account with the next account number. Not persisted.
    fn new_account_with_address(&self, address: Address) -> Account;

    fn remove_account(&self, account: &Account) -> Result<(), StoreError>;

    fn module_address(&self, name: &str) -> Address {
        module_address(name)
    }
}

/// Balance storage
pub trait BankKeeper: Send + Sync {
    fn balance(&self, address: &Address, denom: &str) -> U256;

    fn send_coins(&self, from: &Address, to: &Address, amount: &[Coin]) -> Result<(), StoreError>;

    fn send_coins_from_account_to_module(
        &self,
        from: &Address,
        module: &str,
        amount: &[Coin],
    ) -> Result<(), StoreError> {
        self.send_coins(from, &module_address(module), amount)
    }

    fn mint_coins(&self, module: &str, amount: &[Coin]) -> Result<(), StoreError>;

    fn burn_coins(&self, module: &str, amount: &[Coin]) -> Result<(), StoreError>;
}

/// Governance-controlled set of message types exempt from the standard fee policy
pub trait GasFreeKeeper: Send + Sync {
    fn gas_free_msg_types(&self) -> BTreeSet<String>;

    fn is_gas_free_msg_type(&self, type_url: &str) -> bool {
        self.gas_free_msg_types().contains(type_url)
    }
}

/// Fee-policy parameters in effect for the current block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeParams {
    pub fee_denom: String,
    /// Global price floor per unit of gas, in `fee_denom`
    pub min_gas_price: U256,
    /// Upper bound on a transaction's gas limit in check mode; 0 disables it
    pub max_gas_wanted: u64,
    /// Cut of exempted transfers charged by the custom fee collector
    pub fee_basis_points: u64,
}

pub trait FeeParamsKeeper: Send + Sync {
    fn fee_params(&self) -> FeeParams;
}

impl FeeParamsKeeper for FeeParams {
    fn fee_params(&self) -> FeeParams {
        self.clone()
    }
}

/// Deterministic address of a module account
pub fn module_address(name: &str) -> Address {
    Address::from_slice(&keccak256(name.as_bytes())[12..])
}

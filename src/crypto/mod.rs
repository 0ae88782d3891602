//! Cryptography Module
//!
//! Key handling for native and Ethereum-style accounts, and recovery of a
//! signer's full public key from Ethereum payloads.

mod keys;
mod recovery;

pub use keys::{
    compress_public_key, eth_address, recover_uncompressed, validate_signature_values, PubKey,
};
pub use recovery::{recover_public_key, recover_signer, ChainRules, RecoveryScheme};

use thiserror::Error;

/// Failures of public key recovery
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// Malformed recovery id, out-of-range `r`/`s`, or a failed curve recovery
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid chain id: expected {expected}, got {got}")]
    InvalidChainId { expected: u64, got: u64 },

    /// The active scheme does not handle this EIP-2718 type
    #[error("transaction type {0} not supported")]
    UnsupportedTransactionType(u8),
}

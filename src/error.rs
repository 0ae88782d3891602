//! Admission Error Types
//!
//! Every stage of the admission pipeline returns [`AnteError`]. Errors are never
//! retried or downgraded: the first one aborts the chain and rejects the
//! transaction.

use crate::crypto::RecoveryError;
use crate::state::StoreError;
use ethers::types::{Address, U256};
use thiserror::Error;

/// Errors raised while admitting a transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnteError {
    /// A required collaborator was not supplied in the handler options
    #[error("{0} is required for the ante handler")]
    MissingOption(&'static str),

    /// The first extension option carries a tag no chain handles
    #[error("rejecting tx with unsupported extension option: {0}")]
    UnsupportedExtension(String),

    /// The transaction fits none of the generic, EIP-712 or Ethereum shapes
    #[error("invalid transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid chain id: expected {expected}, got {got}")]
    InvalidChainId { expected: u64, got: u64 },

    #[error("transaction type {0} not supported by signer")]
    UnsupportedTransactionType(u8),

    #[error("insufficient fee: got {got}, required {required} {denom}")]
    InsufficientFee {
        required: U256,
        got: U256,
        denom: String,
    },

    #[error("insufficient funds: {address:?} has {available} {denom}, needs {required}")]
    InsufficientFunds {
        address: Address,
        required: U256,
        available: U256,
        denom: String,
    },

    #[error("found more nested msgs than permitted, limit is {0}")]
    NestingTooDeep(usize),

    #[error("found disabled msg type: {0}")]
    DisabledMessageType(String),

    #[error("failed to replace account {address:?}: {reason}")]
    AccountReplacementFailed { address: Address, reason: String },

    #[error("invalid message type: {0}")]
    InvalidMessageType(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("tx timed out: {0}")]
    TxTimeout(String),

    #[error("memo too large: {len} characters, limit {limit}")]
    MemoTooLarge { len: usize, limit: usize },

    #[error("out of gas in location {descriptor}; gas wanted {limit}, used {used}")]
    OutOfGas {
        descriptor: String,
        limit: u64,
        used: u64,
    },

    #[error("invalid pubkey for {0:?}")]
    InvalidPubKey(Address),

    #[error("too many signatures: {count}, limit {limit}")]
    TooManySignatures { count: usize, limit: usize },

    #[error("account sequence mismatch: expected {expected}, got {got}")]
    WrongSequence { expected: u64, got: u64 },

    #[error("account sequence overflow for {0:?}")]
    SequenceOverflow(Address),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("account {0:?} does not exist")]
    UnknownAddress(Address),

    #[error("tx gas limit {got} exceeds max gas wanted {max}")]
    GasWantedExceeded { got: u64, max: u64 },

    /// A stage panicked; the dispatcher recovered and converted it
    #[error("panic during ante handling: {0}")]
    Panic(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RecoveryError> for AnteError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::InvalidSignature(reason) => AnteError::InvalidSignature(reason),
            RecoveryError::InvalidChainId { expected, got } => {
                AnteError::InvalidChainId { expected, got }
            }
            RecoveryError::UnsupportedTransactionType(kind) => {
                AnteError::UnsupportedTransactionType(kind)
            }
        }
    }
}

/// Result type returned by every stage.
pub type AnteResult<T> = Result<T, AnteError>;

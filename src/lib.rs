//! This crate implements the transaction admission layer of an Ethereum-compatible
//! chain. Every incoming transaction is routed to one of three chains of
//! validation stages (native, EIP-712 or Ethereum) before it reaches execution.

pub mod types; // Transactions, messages, fees and stored accounts.
pub mod context; // Per-transaction context: gas meter, events, block info.
pub mod crypto; // Public keys and Ethereum signer recovery.
pub mod state; // Keeper traits and the in-memory state cache.
pub mod ante; // Admission stages, chain composition and the dispatcher.
pub mod config; // Defines and loads pipeline configuration.
pub mod error; // Error kinds returned by every stage.

#[cfg(test)]
mod testutil;

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use context::Context;
pub use error::{AnteError, AnteResult};
pub use ante::{AnteDispatcher, HandlerOptions};

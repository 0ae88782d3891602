//! Signature Recovery
//!
//! Recovers the full public key of an Ethereum payload's signer. The rules
//! active at a block height pick exactly one of five signing schemes; newer
//! schemes hand payloads they do not own down to older ones.
//!
//! | Scheme    | Payloads                  | Chain id                     |
//! |-----------|---------------------------|------------------------------|
//! | London    | dynamic fee               | payload field must match     |
//! | Berlin    | legacy, access list       | derived / field must match   |
//! | Eip155    | protected legacy          | derived from `v`, must match |
//! | Homestead | legacy, low `s` only      | none                         |
//! | Frontier  | legacy                    | none                         |
//!
//! Berlin and Eip155 hand unprotected legacy payloads to Frontier, not
//! Homestead, so a high-`s` twin of such a payload still recovers once those
//! forks are active. Only a chain whose newest fork is Homestead rejects it.
//! The twin recovers the same signer as the original.

use super::keys::{eth_address, recover_uncompressed, validate_signature_values};
use super::RecoveryError;
use crate::types::SignedEthTx;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fork schedule of the Ethereum signing rules.
///
/// A fork is active from its height onwards; `None` means never.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRules {
    pub chain_id: u64,
    pub homestead_block: Option<u64>,
    pub eip155_block: Option<u64>,
    pub berlin_block: Option<u64>,
    pub london_block: Option<u64>,
}

impl ChainRules {
    /// Rules with every fork active from genesis
    pub fn all_active(chain_id: u64) -> Self {
        Self {
            chain_id,
            homestead_block: Some(0),
            eip155_block: Some(0),
            berlin_block: Some(0),
            london_block: Some(0),
        }
    }

    fn active(fork: Option<u64>, height: u64) -> bool {
        fork.is_some_and(|block| height >= block)
    }

    pub fn is_homestead(&self, height: u64) -> bool {
        Self::active(self.homestead_block, height)
    }

    pub fn is_eip155(&self, height: u64) -> bool {
        Self::active(self.eip155_block, height)
    }

    pub fn is_berlin(&self, height: u64) -> bool {
        Self::active(self.berlin_block, height)
    }

    pub fn is_london(&self, height: u64) -> bool {
        Self::active(self.london_block, height)
    }
}

/// The signing scheme a payload is recovered under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryScheme {
    London { chain_id: u64 },
    Berlin { chain_id: u64 },
    Eip155 { chain_id: u64 },
    Homestead,
    Frontier,
}

impl RecoveryScheme {
    /// Newest scheme active at `height`
    pub fn for_height(rules: &ChainRules, height: u64) -> Self {
        let chain_id = rules.chain_id;
        if rules.is_london(height) {
            RecoveryScheme::London { chain_id }
        } else if rules.is_berlin(height) {
            RecoveryScheme::Berlin { chain_id }
        } else if rules.is_eip155(height) {
            RecoveryScheme::Eip155 { chain_id }
        } else if rules.is_homestead(height) {
            RecoveryScheme::Homestead
        } else {
            RecoveryScheme::Frontier
        }
    }

    /// Recover the 65-byte uncompressed public key of the payload's signer
    pub fn recover(&self, payload: &SignedEthTx) -> Result<[u8; 65], RecoveryError> {
        let v = U256::from(payload.signature.v);
        let r = payload.signature.r;
        let s = payload.signature.s;

        match *self {
            RecoveryScheme::London { chain_id } => {
                if !matches!(payload.tx, TypedTransaction::Eip1559(_)) {
                    return RecoveryScheme::Berlin { chain_id }.recover(payload);
                }
                let v = v + U256::from(27u64);
                check_payload_chain_id(payload, chain_id)?;
                recover_plain(typed_sighash(payload), r, s, v, true)
            }
            RecoveryScheme::Berlin { chain_id } => match payload.tx {
                TypedTransaction::Legacy(_) => {
                    if !is_protected_v(v) {
                        return RecoveryScheme::Frontier.recover(payload);
                    }
                    let v = strip_eip155_v(v, chain_id)?;
                    recover_plain(protected_legacy_sighash(payload, chain_id), r, s, v, true)
                }
                TypedTransaction::Eip2930(_) => {
                    let v = v + U256::from(27u64);
                    check_payload_chain_id(payload, chain_id)?;
                    recover_plain(typed_sighash(payload), r, s, v, true)
                }
                TypedTransaction::Eip1559(_) => {
                    Err(RecoveryError::UnsupportedTransactionType(payload.kind()))
                }
            },
            RecoveryScheme::Eip155 { chain_id } => {
                require_legacy(payload)?;
                if !is_protected_v(v) {
                    return RecoveryScheme::Frontier.recover(payload);
                }
                let v = strip_eip155_v(v, chain_id)?;
                recover_plain(protected_legacy_sighash(payload, chain_id), r, s, v, true)
            }
            RecoveryScheme::Homestead => {
                require_legacy(payload)?;
                recover_plain(unprotected_legacy_sighash(payload), r, s, v, true)
            }
            RecoveryScheme::Frontier => {
                require_legacy(payload)?;
                recover_plain(unprotected_legacy_sighash(payload), r, s, v, false)
            }
        }
    }
}

/// Recover the full public key of the signer of `payload` under the rules
/// active at `height`.
pub fn recover_public_key(
    rules: &ChainRules,
    height: u64,
    payload: &SignedEthTx,
) -> Result<[u8; 65], RecoveryError> {
    let scheme = RecoveryScheme::for_height(rules, height);
    debug!(?scheme, height, kind = payload.kind(), "recovering signer public key");
    scheme.recover(payload)
}

/// Recover the signer's address under the rules active at `height`
pub fn recover_signer(
    rules: &ChainRules,
    height: u64,
    payload: &SignedEthTx,
) -> Result<Address, RecoveryError> {
    recover_public_key(rules, height, payload).map(|key| eth_address(&key))
}

fn require_legacy(payload: &SignedEthTx) -> Result<(), RecoveryError> {
    match payload.tx {
        TypedTransaction::Legacy(_) => Ok(()),
        _ => Err(RecoveryError::UnsupportedTransactionType(payload.kind())),
    }
}

/// Legacy `v` other than 27/28 (or a bare parity bit) commits to a chain id
fn is_protected_v(v: U256) -> bool {
    if v.bits() <= 8 {
        let v = v.low_u64();
        return v != 27 && v != 28 && v != 0 && v != 1;
    }
    true
}

/// Chain id a protected legacy `v` commits to
fn derive_chain_id(v: U256) -> u64 {
    if v == U256::from(27) || v == U256::from(28) {
        return 0;
    }
    v.checked_sub(U256::from(35))
        .map(|id| id / U256::from(2u64))
        .filter(|id| id.bits() <= 64)
        .map(|id| id.low_u64())
        .unwrap_or_default()
}

/// Check the chain id committed in `v`, then map it back to 27/28
fn strip_eip155_v(v: U256, chain_id: u64) -> Result<U256, RecoveryError> {
    let got = derive_chain_id(v);
    if got != chain_id {
        return Err(RecoveryError::InvalidChainId {
            expected: chain_id,
            got,
        });
    }
    let offset = U256::from(chain_id) * U256::from(2u64) + U256::from(8u64);
    v.checked_sub(offset)
        .ok_or_else(|| RecoveryError::InvalidSignature("recovery id underflow".into()))
}

fn check_payload_chain_id(payload: &SignedEthTx, chain_id: u64) -> Result<(), RecoveryError> {
    let got = payload.tx.chain_id().map(|id| id.as_u64()).unwrap_or_default();
    if got != chain_id {
        return Err(RecoveryError::InvalidChainId {
            expected: chain_id,
            got,
        });
    }
    Ok(())
}

fn protected_legacy_sighash(payload: &SignedEthTx, chain_id: u64) -> H256 {
    let mut tx = payload.tx.clone();
    tx.set_chain_id(chain_id);
    tx.sighash()
}

fn unprotected_legacy_sighash(payload: &SignedEthTx) -> H256 {
    let mut tx = payload.tx.clone();
    if let TypedTransaction::Legacy(ref mut req) = tx {
        req.chain_id = None;
    }
    tx.sighash()
}

fn typed_sighash(payload: &SignedEthTx) -> H256 {
    payload.tx.sighash()
}

/// Shared tail of every scheme: `v` is in the 27/28 form here
fn recover_plain(
    sighash: H256,
    r: U256,
    s: U256,
    v: U256,
    homestead: bool,
) -> Result<[u8; 65], RecoveryError> {
    if v.bits() > 8 {
        return Err(RecoveryError::InvalidSignature(format!("recovery id {v} too large")));
    }
    let recid = match v.low_u64().checked_sub(27) {
        Some(id) if id <= 1 => id as u8,
        _ => return Err(RecoveryError::InvalidSignature(format!("invalid recovery id {v}"))),
    };
    if !validate_signature_values(recid, r, s, homestead) {
        return Err(RecoveryError::InvalidSignature("invalid r, s values".into()));
    }
    recover_uncompressed(sighash.as_fixed_bytes(), r, s, recid)
}

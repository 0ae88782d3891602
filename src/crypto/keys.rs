//! Public Key Handling
//!
//! Native keys sign SHA-256 digests and derive their address from SHA-256 of
//! the compressed key. Ethereum keys sign Keccak-256 digests and derive the
//! familiar 20-byte Ethereum address.

use super::RecoveryError;
use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// secp256k1 curve order n
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// n / 2, the largest `s` accepted when malleability protection is on
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// A compressed (33 byte) secp256k1 public key tagged with its signing scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PubKey {
    Secp256k1(Vec<u8>),
    /// Capability-specific key used by Ethereum-style accounts
    EthSecp256k1(Vec<u8>),
}

impl PubKey {
    pub fn bytes(&self) -> &[u8] {
        match self {
            PubKey::Secp256k1(bytes) | PubKey::EthSecp256k1(bytes) => bytes,
        }
    }

    pub fn is_eth(&self) -> bool {
        matches!(self, PubKey::EthSecp256k1(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PubKey::Secp256k1(_) => "secp256k1",
            PubKey::EthSecp256k1(_) => "eth_secp256k1",
        }
    }

    /// Address this key controls
    pub fn address(&self) -> Option<Address> {
        match self {
            PubKey::Secp256k1(bytes) => {
                let digest = Sha256::digest(bytes);
                Some(Address::from_slice(&digest[..20]))
            }
            PubKey::EthSecp256k1(bytes) => {
                let key = VerifyingKey::from_sec1_bytes(bytes).ok()?;
                let point = key.to_encoded_point(false);
                Some(eth_address(point.as_bytes()))
            }
        }
    }

    /// Verify `sig` (r || s, optionally followed by v) over `msg`
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let Some(compact) = sig.get(..64) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(compact) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_sec1_bytes(self.bytes()) else {
            return false;
        };
        match self {
            PubKey::Secp256k1(_) => key.verify(msg, &signature).is_ok(),
            PubKey::EthSecp256k1(_) => key
                .verify_prehash(&keccak256(msg), &signature)
                .is_ok(),
        }
    }
}

/// Ethereum address of an uncompressed (65 byte, 0x04-prefixed) public key
pub fn eth_address(uncompressed: &[u8]) -> Address {
    let body = uncompressed.get(1..).unwrap_or_default();
    Address::from_slice(&keccak256(body)[12..])
}

/// Compress a 65-byte public key into the node's canonical 33-byte encoding
pub fn compress_public_key(uncompressed: &[u8; 65]) -> Result<PubKey, RecoveryError> {
    let key = k256::PublicKey::from_sec1_bytes(uncompressed)
        .map_err(|_| RecoveryError::InvalidSignature("invalid public key".into()))?;
    Ok(PubKey::EthSecp256k1(
        key.to_encoded_point(true).as_bytes().to_vec(),
    ))
}

fn curve_order() -> U256 {
    U256::from_big_endian(&SECP256K1_ORDER)
}

fn half_curve_order() -> U256 {
    U256::from_big_endian(&SECP256K1_HALF_ORDER)
}

/// Checks `r` and `s` are in `[1, n)` and `v` is a bare parity bit.
/// With `homestead` set, `s` must also be in the lower half of the order.
pub fn validate_signature_values(v: u8, r: U256, s: U256, homestead: bool) -> bool {
    if r.is_zero() || s.is_zero() {
        return false;
    }
    if homestead && s > half_curve_order() {
        return false;
    }
    let n = curve_order();
    r < n && s < n && (v == 0 || v == 1)
}

/// Recover the uncompressed public key that produced `(r, s, v)` over `prehash`.
///
/// `v` must already be the bare recovery id (0 or 1). High-`s` signatures
/// are normalised before recovery, which yields the same key.
pub fn recover_uncompressed(
    prehash: &[u8; 32],
    r: U256,
    s: U256,
    v: u8,
) -> Result<[u8; 65], RecoveryError> {
    let mut compact = [0u8; 64];
    r.to_big_endian(&mut compact[..32]);
    s.to_big_endian(&mut compact[32..]);

    let mut signature = Signature::from_slice(&compact)
        .map_err(|_| RecoveryError::InvalidSignature("malformed r or s".into()))?;
    let mut recid = v;
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recid ^= 1;
    }
    let recovery_id = RecoveryId::from_byte(recid)
        .ok_or_else(|| RecoveryError::InvalidSignature(format!("invalid recovery id {v}")))?;

    let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
        .map_err(|_| RecoveryError::InvalidSignature("public key recovery failed".into()))?;
    let point = key.to_encoded_point(false);

    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    if out[0] != 0x04 {
        return Err(RecoveryError::InvalidSignature("invalid public key".into()));
    }
    Ok(out)
}

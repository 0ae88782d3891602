//! EIP-712 signature verification for native transactions signed by an
//! Ethereum wallet. The wallet signs typed data wrapping the native sign
//! bytes; the 65-byte signature must recover to the signer's stored key.

use super::decorator::{AnteDecorator, AnteHandler};
use crate::context::Context;
use crate::crypto::{compress_public_key, eth_address, recover_uncompressed};
use crate::error::{AnteError, AnteResult};
use crate::state::AccountKeeper;
use crate::types::{ExtensionOption, Tx, Web3Extension};
use ethers::types::transaction::eip712::EIP712Domain;
use ethers::types::U256;
use ethers::utils::keccak256;
use std::sync::Arc;
use tracing::warn;

const DOMAIN_NAME: &str = "Cosmos Web3";
const DOMAIN_VERSION: &str = "1.0.0";

/// Domain the typed data is bound to
pub fn eip712_domain(eth_chain_id: u64) -> EIP712Domain {
    EIP712Domain {
        name: Some(DOMAIN_NAME.to_string()),
        version: Some(DOMAIN_VERSION.to_string()),
        chain_id: Some(U256::from(eth_chain_id)),
        verifying_contract: None,
        salt: None,
    }
}

/// `keccak256(0x19 0x01 || domainSeparator || keccak256(sign_bytes))`
pub fn eip712_digest(sign_bytes: &[u8], eth_chain_id: u64) -> [u8; 32] {
    let separator = eip712_domain(eth_chain_id).separator();
    let struct_hash = keccak256(sign_bytes);

    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(&separator);
    preimage.extend_from_slice(&struct_hash);
    keccak256(preimage)
}

fn web3_extension(tx: &Tx) -> Option<&Web3Extension> {
    tx.extension_options.iter().find_map(|option| match option {
        ExtensionOption::Web3Tx(ext) => Some(ext),
        _ => None,
    })
}

pub struct Eip712SigVerificationDecorator {
    accounts: Arc<dyn AccountKeeper>,
    eth_chain_id: u64,
}

impl Eip712SigVerificationDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>, eth_chain_id: u64) -> Self {
        Self {
            accounts,
            eth_chain_id,
        }
    }
}

impl AnteDecorator for Eip712SigVerificationDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        // Simulation carries no wallet signature
        if simulate {
            return next(ctx, tx, simulate);
        }

        let signers = tx.signers();
        let [signer] = signers.as_slice() else {
            return Err(AnteError::Unauthorized(format!(
                "EIP-712 transactions need exactly one signer, got {}",
                signers.len()
            )));
        };
        let [signature] = tx.signatures.as_slice() else {
            return Err(AnteError::Unauthorized(format!(
                "EIP-712 transactions need exactly one signature, got {}",
                tx.signatures.len()
            )));
        };

        let ext = web3_extension(tx)
            .ok_or_else(|| AnteError::InvalidRequest("missing web3 extension option".into()))?;
        if ext.typed_data_chain_id != self.eth_chain_id {
            warn!(expected = self.eth_chain_id, got = ext.typed_data_chain_id, "typed data chain id mismatch");
            return Err(AnteError::InvalidChainId {
                expected: self.eth_chain_id,
                got: ext.typed_data_chain_id,
            });
        }
        if ext.fee_payer != *signer {
            return Err(AnteError::Unauthorized(format!(
                "fee payer {:?} is not the signer {signer:?}",
                ext.fee_payer
            )));
        }

        let account = self
            .accounts
            .account(signer)
            .ok_or(AnteError::UnknownAddress(*signer))?;
        if signature.sequence != account.sequence {
            return Err(AnteError::WrongSequence {
                expected: account.sequence,
                got: signature.sequence,
            });
        }
        let stored_key = match &account.pub_key {
            Some(key) if key.is_eth() => key,
            _ => return Err(AnteError::InvalidPubKey(*signer)),
        };

        let sig = signature.data.as_slice();
        if sig.len() != 65 {
            return Err(AnteError::InvalidSignature(format!(
                "EIP-712 signature must be 65 bytes, got {}",
                sig.len()
            )));
        }
        let r = U256::from_big_endian(&sig[..32]);
        let s = U256::from_big_endian(&sig[32..64]);
        let v = match sig[64] {
            27 | 28 => sig[64] - 27,
            v => v,
        };

        let sign_bytes = tx.sign_bytes(&ctx.chain_id, account.account_number, account.sequence);
        let digest = eip712_digest(&sign_bytes, self.eth_chain_id);
        let recovered = recover_uncompressed(&digest, r, s, v)?;

        if eth_address(&recovered) != *signer || compress_public_key(&recovered)? != *stored_key {
            warn!(?signer, "EIP-712 signature recovered to a different key");
            return Err(AnteError::Unauthorized(
                "EIP-712 signature does not match the signer's public key".into(),
            ));
        }

        next(ctx, tx, simulate)
    }
}

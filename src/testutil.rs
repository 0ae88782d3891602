//! Shared fixtures for unit tests: deterministic keys, signed Ethereum
//! payloads and native transactions.

use crate::ante::eip712_digest;
use crate::context::Context;
use crate::crypto::{eth_address, PubKey};
use crate::types::{
    Coin, ExtensionOption, Fee, Msg, MsgEthereumTx, MsgSend, SignatureV2, SignedEthTx, Tx,
};
use chrono::{TimeZone, Utc};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip2930::{AccessList, Eip2930TransactionRequest};
use ethers::types::{Address, Eip1559TransactionRequest, Signature, TransactionRequest, U256};
use ethers::utils::keccak256;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{SigningKey, VerifyingKey};

pub const TEST_CHAIN_ID: &str = "evmos_9001-2";
pub const TEST_ETH_CHAIN_ID: u64 = 9001;
pub const TEST_DENOM: &str = "aevmos";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_context() -> Context {
    let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Context::new(TEST_CHAIN_ID, 10, time)
}

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

fn uncompressed(key: &SigningKey) -> Vec<u8> {
    VerifyingKey::from(key).to_encoded_point(false).as_bytes().to_vec()
}

fn compressed(key: &SigningKey) -> Vec<u8> {
    VerifyingKey::from(key).to_encoded_point(true).as_bytes().to_vec()
}

pub fn eth_address_of(key: &SigningKey) -> Address {
    eth_address(&uncompressed(key))
}

pub fn eth_pubkey_of(key: &SigningKey) -> PubKey {
    PubKey::EthSecp256k1(compressed(key))
}

pub fn native_pubkey_of(key: &SigningKey) -> PubKey {
    PubKey::Secp256k1(compressed(key))
}

/// How the `v` value of a signed Ethereum payload is encoded
#[derive(Debug, Clone, Copy)]
pub enum VForm {
    /// 27 + parity, unprotected legacy
    Plain,
    /// parity + 35 + 2 * chain id
    Eip155(u64),
    /// Bare parity, typed payloads
    Parity,
}

pub fn legacy_tx(chain_id: Option<u64>, nonce: u64) -> TypedTransaction {
    let mut req = TransactionRequest::new()
        .to(Address::repeat_byte(0x22))
        .value(1_000u64)
        .gas(21_000u64)
        .gas_price(10u64)
        .nonce(nonce);
    req.chain_id = chain_id.map(Into::into);
    TypedTransaction::Legacy(req)
}

pub fn access_list_tx(chain_id: u64, nonce: u64) -> TypedTransaction {
    let req = TransactionRequest::new()
        .to(Address::repeat_byte(0x22))
        .value(1_000u64)
        .gas(21_000u64)
        .gas_price(10u64)
        .nonce(nonce)
        .chain_id(chain_id);
    TypedTransaction::Eip2930(Eip2930TransactionRequest::new(req, AccessList::default()))
}

pub fn dynamic_fee_tx(chain_id: u64, nonce: u64) -> TypedTransaction {
    TypedTransaction::Eip1559(
        Eip1559TransactionRequest::new()
            .to(Address::repeat_byte(0x22))
            .value(1_000u64)
            .gas(21_000u64)
            .max_fee_per_gas(10u64)
            .max_priority_fee_per_gas(1u64)
            .nonce(nonce)
            .chain_id(chain_id),
    )
}

pub fn sign_eth(key: &SigningKey, tx: TypedTransaction, form: VForm) -> SignedEthTx {
    let sighash = tx.sighash();
    let (signature, recid) = key.sign_prehash_recoverable(sighash.as_bytes()).unwrap();
    let bytes = signature.to_bytes();
    let parity = u64::from(recid.to_byte());
    let v = match form {
        VForm::Plain => 27 + parity,
        VForm::Eip155(chain_id) => parity + 35 + 2 * chain_id,
        VForm::Parity => parity,
    };
    SignedEthTx::new(
        tx,
        Signature {
            r: U256::from_big_endian(&bytes[..32]),
            s: U256::from_big_endian(&bytes[32..]),
            v,
        },
    )
}

/// Sign native sign bytes with the scheme matching `pub_key`
pub fn sign_native(key: &SigningKey, pub_key: &PubKey, msg: &[u8]) -> Vec<u8> {
    let signature: k256::ecdsa::Signature = match pub_key {
        PubKey::Secp256k1(_) => key.sign(msg),
        PubKey::EthSecp256k1(_) => key.sign_prehash(&keccak256(msg)).unwrap(),
    };
    signature.to_bytes().to_vec()
}

pub fn send_msg(from: Address, to: Address, amount: u64) -> Msg {
    Msg::Send(MsgSend {
        from_address: from,
        to_address: to,
        amount: vec![Coin::new(TEST_DENOM, amount)],
    })
}

pub fn other_msg(type_url: &str, signer: Address) -> Msg {
    Msg::Other {
        type_url: type_url.to_string(),
        signers: vec![signer],
    }
}

/// Unsigned native transaction paying `fee` in the test denom
pub fn native_tx(msgs: Vec<Msg>, fee: u64, gas_limit: u64) -> Tx {
    Tx {
        msgs,
        fee: Fee {
            amount: vec![Coin::new(TEST_DENOM, fee)],
            gas_limit,
            payer: None,
        },
        size_bytes: 200,
        ..Tx::default()
    }
}

/// Attach one signature per signer, in signer order
pub fn sign_tx(
    mut tx: Tx,
    signers: &[(&SigningKey, PubKey, u64, u64)],
    chain_id: &str,
) -> Tx {
    let mut signatures = Vec::new();
    for (key, pub_key, account_number, sequence) in signers {
        let bytes = tx.sign_bytes(chain_id, *account_number, *sequence);
        signatures.push(SignatureV2 {
            pub_key: Some(pub_key.clone()),
            data: sign_native(key, pub_key, &bytes),
            sequence: *sequence,
        });
    }
    tx.signatures = signatures;
    tx
}

/// Ethereum-extension transaction wrapping `payload` signed by `key`, with the
/// envelope fee and gas matching the payload
pub fn eth_tx(key: &SigningKey, payload: SignedEthTx) -> Tx {
    Tx {
        fee: Fee {
            amount: vec![Coin::new(TEST_DENOM, payload.fee())],
            gas_limit: payload.gas(),
            payer: None,
        },
        msgs: vec![Msg::EthereumTx(MsgEthereumTx {
            data: payload,
            from: eth_address_of(key),
        })],
        extension_options: vec![ExtensionOption::EthereumTx],
        ..Tx::default()
    }
}

/// 65-byte typed-data signature (r || s || 27 + parity) over the sign bytes
pub fn sign_eip712(
    key: &SigningKey,
    tx: &Tx,
    account_number: u64,
    sequence: u64,
    typed_chain_id: u64,
) -> Vec<u8> {
    let sign_bytes = tx.sign_bytes(TEST_CHAIN_ID, account_number, sequence);
    let digest = eip712_digest(&sign_bytes, typed_chain_id);
    let (signature, recid) = key.sign_prehash_recoverable(&digest).unwrap();
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(27 + recid.to_byte());
    bytes
}

use crate::crypto::PubKey;
use chrono::{DateTime, Utc};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Type URL of the Ethereum transaction wrapper message
pub const MSG_ETHEREUM_TX: &str = "/ethermint.evm.v1.MsgEthereumTx";
/// Type URL of the bank value-transfer message
pub const MSG_SEND: &str = "/cosmos.bank.v1beta1.MsgSend";
/// Type URL of the governance proposal container
pub const MSG_SUBMIT_PROPOSAL: &str = "/cosmos.gov.v1.MsgSubmitProposal";
/// Type URL of the authz execution container
pub const MSG_EXEC: &str = "/cosmos.authz.v1beta1.MsgExec";

/// Extension tag marking an Ethereum-signed transaction
pub const EXT_ETHEREUM_TX: &str = "/ethermint.evm.v1.ExtensionOptionsEthereumTx";
/// Extension tag marking an EIP-712 signed transaction
pub const EXT_WEB3_TX: &str = "/ethermint.types.v1.ExtensionOptionsWeb3Tx";

/// A token amount in a single denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: U256,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: impl Into<U256>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }
}

/// Fee attached to a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas_limit: u64,
    /// Explicit fee payer; defaults to the first signer
    pub payer: Option<Address>,
}

impl Fee {
    /// Total fee offered in `denom`
    pub fn amount_of(&self, denom: &str) -> U256 {
        self.amount
            .iter()
            .filter(|coin| coin.denom == denom)
            .fold(U256::zero(), |acc, coin| acc.saturating_add(coin.amount))
    }
}

/// Signature over the transaction sign bytes, one per signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureV2 {
    pub pub_key: Option<PubKey>,
    pub data: Vec<u8>,
    pub sequence: u64,
}

/// Payload of the EIP-712 extension option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Web3Extension {
    pub typed_data_chain_id: u64,
    pub fee_payer: Address,
    pub fee_payer_sig: Vec<u8>,
}

/// Out-of-band metadata that switches the signing scheme of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionOption {
    EthereumTx,
    Web3Tx(Web3Extension),
    Other { type_url: String },
}

impl ExtensionOption {
    pub fn type_url(&self) -> &str {
        match self {
            ExtensionOption::EthereumTx => EXT_ETHEREUM_TX,
            ExtensionOption::Web3Tx(_) => EXT_WEB3_TX,
            ExtensionOption::Other { type_url } => type_url,
        }
    }
}

/// An Ethereum transaction together with its raw signature values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEthTx {
    pub tx: TypedTransaction,
    pub signature: Signature,
}

impl SignedEthTx {
    pub fn new(tx: TypedTransaction, signature: Signature) -> Self {
        Self { tx, signature }
    }

    /// EIP-2718 type byte: 0 legacy, 1 access list, 2 dynamic fee
    pub fn kind(&self) -> u8 {
        match self.tx {
            TypedTransaction::Legacy(_) => 0,
            TypedTransaction::Eip2930(_) => 1,
            TypedTransaction::Eip1559(_) => 2,
        }
    }

    /// Hash of the signed envelope
    pub fn hash(&self) -> H256 {
        self.tx.hash(&self.signature)
    }

    pub fn nonce(&self) -> u64 {
        self.tx.nonce().map(|n| n.low_u64()).unwrap_or_default()
    }

    pub fn gas(&self) -> u64 {
        self.tx.gas().map(|g| g.low_u64()).unwrap_or_default()
    }

    /// Gas price for legacy payloads, the fee cap for dynamic-fee ones
    pub fn gas_price(&self) -> U256 {
        self.tx.gas_price().unwrap_or_default()
    }

    pub fn value(&self) -> U256 {
        self.tx.value().copied().unwrap_or_default()
    }

    /// Maximum fee the sender can be charged: `gas * gas_price`
    pub fn fee(&self) -> U256 {
        self.gas_price().saturating_mul(U256::from(self.gas()))
    }

    /// Fee plus transferred value
    pub fn cost(&self) -> U256 {
        self.fee().saturating_add(self.value())
    }
}

/// Ethereum transaction wrapped as a message, with the sender the client claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEthereumTx {
    pub data: SignedEthTx,
    pub from: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from_address: Address,
    pub to_address: Address,
    pub amount: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitProposal {
    pub proposer: Address,
    pub messages: Vec<Msg>,
    pub initial_deposit: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgExec {
    pub grantee: Address,
    pub msgs: Vec<Msg>,
}

/// A typed operation carried inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    EthereumTx(MsgEthereumTx),
    Send(MsgSend),
    SubmitProposal(MsgSubmitProposal),
    Exec(MsgExec),
    /// Any leaf message the admission layer does not inspect
    Other {
        type_url: String,
        signers: Vec<Address>,
    },
}

/// Structural view of a message used by the nested-message checks
#[derive(Debug, Clone, Copy)]
pub enum MsgShape<'a> {
    Leaf,
    Proposal(&'a [Msg]),
    Exec(&'a [Msg]),
}

impl Msg {
    pub fn type_url(&self) -> &str {
        match self {
            Msg::EthereumTx(_) => MSG_ETHEREUM_TX,
            Msg::Send(_) => MSG_SEND,
            Msg::SubmitProposal(_) => MSG_SUBMIT_PROPOSAL,
            Msg::Exec(_) => MSG_EXEC,
            Msg::Other { type_url, .. } => type_url,
        }
    }

    pub fn signers(&self) -> Vec<Address> {
        match self {
            Msg::EthereumTx(msg) => vec![msg.from],
            Msg::Send(msg) => vec![msg.from_address],
            Msg::SubmitProposal(msg) => vec![msg.proposer],
            Msg::Exec(msg) => vec![msg.grantee],
            Msg::Other { signers, .. } => signers.clone(),
        }
    }

    pub fn shape(&self) -> MsgShape<'_> {
        match self {
            Msg::SubmitProposal(msg) => MsgShape::Proposal(&msg.messages),
            Msg::Exec(msg) => MsgShape::Exec(&msg.msgs),
            _ => MsgShape::Leaf,
        }
    }
}

/// A decoded transaction as it reaches the admission layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub msgs: Vec<Msg>,
    pub fee: Fee,
    pub memo: String,
    pub timeout_height: u64,
    pub timeout_timestamp: Option<DateTime<Utc>>,
    pub extension_options: Vec<ExtensionOption>,
    pub signatures: Vec<SignatureV2>,
    /// Length of the wire encoding, supplied by the decoder
    pub size_bytes: usize,
}

/// Document every native signer signs
#[derive(Serialize)]
struct SignDoc<'a> {
    chain_id: &'a str,
    account_number: u64,
    sequence: u64,
    fee: &'a Fee,
    memo: &'a str,
    msgs: &'a [Msg],
    timeout_height: u64,
}

impl Tx {
    /// Distinct signers in order of first appearance
    pub fn signers(&self) -> Vec<Address> {
        let mut signers = Vec::new();
        for signer in self.msgs.iter().flat_map(Msg::signers) {
            if !signers.contains(&signer) {
                signers.push(signer);
            }
        }
        signers
    }

    pub fn fee_payer(&self) -> Option<Address> {
        self.fee.payer.or_else(|| self.signers().first().copied())
    }

    /// Deterministic bytes a signer commits to
    pub fn sign_bytes(&self, chain_id: &str, account_number: u64, sequence: u64) -> Vec<u8> {
        let doc = SignDoc {
            chain_id,
            account_number,
            sequence,
            fee: &self.fee,
            memo: &self.memo,
            msgs: &self.msgs,
            timeout_height: self.timeout_height,
        };
        // Serializing plain structs into a Vec cannot fail
        serde_json::to_vec(&doc).unwrap_or_default()
    }

    /// The Ethereum messages, if every message is one
    pub fn ethereum_msgs(&self) -> Option<Vec<&MsgEthereumTx>> {
        self.msgs
            .iter()
            .map(|msg| match msg {
                Msg::EthereumTx(eth) => Some(eth),
                _ => None,
            })
            .collect()
    }
}

/// Whether an account can hold Ethereum-specific state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Base,
    Eth { code_hash: H256 },
}

/// Stored account record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub account_number: u64,
    pub sequence: u64,
    pub pub_key: Option<PubKey>,
    pub kind: AccountKind,
}

impl Account {
    pub fn new_base(address: Address, account_number: u64) -> Self {
        Self {
            address,
            account_number,
            sequence: 0,
            pub_key: None,
            kind: AccountKind::Base,
        }
    }

    pub fn is_eth(&self) -> bool {
        matches!(self.kind, AccountKind::Eth { .. })
    }

    /// True when the account carries contract code
    pub fn is_contract(&self) -> bool {
        match self.kind {
            AccountKind::Eth { code_hash } => code_hash != empty_code_hash(),
            AccountKind::Base => false,
        }
    }
}

/// Keccak-256 of empty code
pub fn empty_code_hash() -> H256 {
    H256::from(keccak256([]))
}

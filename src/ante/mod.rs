//! Ante Module
//!
//! This module contains the transaction admission pipeline:
//! - Stage contract and chain composition (decorator.rs)
//! - Dispatcher routing transactions to one of three chains (handler.rs)
//! - Native, EIP-712 and Ethereum stages
//!
//! # Chains
//! - generic: natively signed transactions
//! - EIP-712: natively encoded transactions signed as typed data by an Ethereum wallet
//! - Ethereum: wrapped Ethereum payloads
//!
//! Stages are synchronous and run in chain order; the first error ends the
//! run and is returned from [`AnteDispatcher::dispatch`].

mod basic;
mod bypass;
mod custom_fee;
mod decorator;
mod eip712;
mod eth;
mod fees;
mod handler;
mod reconcile;
mod reject;
mod scanner;
mod setup;
mod sigverify;

pub use basic::{
    ConsumeTxSizeGasDecorator, TxTimeoutHeightDecorator, ValidateBasicDecorator,
    ValidateMemoDecorator, ValidateSigCountDecorator,
};
pub use bypass::{is_fully_exempt, BypassDecorator};
pub use custom_fee::{basis_point_fee, charge_exempt_fees, CustomFeeCollectorDecorator};
pub use decorator::{chain_decorators, AnteDecorator, AnteHandler, MsgExecutor, NoopExecutor};
pub use eip712::{eip712_digest, eip712_domain, Eip712SigVerificationDecorator};
pub use eth::{
    EthAccountVerificationDecorator, EthEmitEventDecorator, EthGasConsumeDecorator,
    EthIncrementSequenceDecorator, EthMempoolFeeDecorator, EthSetPubKeyDecorator,
    EthSigVerificationDecorator, EthValidateBasicDecorator,
};
pub use fees::{deduct_fees, DeductFeeDecorator, GasWantedDecorator, MinGasPriceDecorator};
pub use handler::{resolve_route, AnteDispatcher, HandlerOptions, TxRoute};
pub use reconcile::{reconcile_account_kind, AccountKindReconcilerDecorator};
pub use reject::RejectMessagesDecorator;
pub use scanner::{scan_forbidden, AuthzLimiterDecorator, Enclosure};
pub use setup::{EthSetUpContextDecorator, SetUpContextDecorator};
pub use sigverify::{
    EmitTxEventsDecorator, IncrementSequenceDecorator, SetPubKeyDecorator,
    SigGasConsumeDecorator, SigVerificationDecorator,
};

//! Pipeline Dispatcher
//!
//! Builds the three admission chains once from [`HandlerOptions`] and routes
//! each transaction to exactly one of them by its first extension option.

use super::basic::{
    ConsumeTxSizeGasDecorator, TxTimeoutHeightDecorator, ValidateBasicDecorator,
    ValidateMemoDecorator, ValidateSigCountDecorator,
};
use super::bypass::BypassDecorator;
use super::custom_fee::CustomFeeCollectorDecorator;
use super::decorator::{chain_decorators, AnteDecorator, AnteHandler, MsgExecutor};
use super::eip712::Eip712SigVerificationDecorator;
use super::eth::{
    EthAccountVerificationDecorator, EthEmitEventDecorator, EthGasConsumeDecorator,
    EthIncrementSequenceDecorator, EthMempoolFeeDecorator, EthSetPubKeyDecorator,
    EthSigVerificationDecorator, EthValidateBasicDecorator,
};
use super::fees::{DeductFeeDecorator, GasWantedDecorator, MinGasPriceDecorator};
use super::reconcile::AccountKindReconcilerDecorator;
use super::reject::RejectMessagesDecorator;
use super::scanner::AuthzLimiterDecorator;
use super::setup::{EthSetUpContextDecorator, SetUpContextDecorator};
use super::sigverify::{
    EmitTxEventsDecorator, IncrementSequenceDecorator, SetPubKeyDecorator,
    SigGasConsumeDecorator, SigVerificationDecorator,
};
use crate::config::Config;
use crate::context::Context;
use crate::error::{AnteError, AnteResult};
use crate::state::{AccountKeeper, BankKeeper, FeeParamsKeeper, GasFreeKeeper};
use crate::types::{ExtensionOption, Msg, Tx};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Collaborators and configuration the chains are built from.
/// Every keeper and the executor are required.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    pub account_keeper: Option<Arc<dyn AccountKeeper>>,
    pub bank_keeper: Option<Arc<dyn BankKeeper>>,
    pub gas_free_keeper: Option<Arc<dyn GasFreeKeeper>>,
    pub fee_params: Option<Arc<dyn FeeParamsKeeper>>,
    pub executor: Option<Arc<dyn MsgExecutor>>,
    pub config: Config,
}

fn require<T: ?Sized>(option: &Option<Arc<T>>, name: &'static str) -> AnteResult<Arc<T>> {
    option.clone().ok_or(AnteError::MissingOption(name))
}

impl HandlerOptions {
    pub fn validate(&self) -> AnteResult<()> {
        self.resolve().map(|_| ())
    }

    fn resolve(&self) -> AnteResult<Resolved> {
        Ok(Resolved {
            accounts: require(&self.account_keeper, "account keeper")?,
            bank: require(&self.bank_keeper, "bank keeper")?,
            gas_free: require(&self.gas_free_keeper, "gas free keeper")?,
            fee_params: require(&self.fee_params, "fee params keeper")?,
            executor: require(&self.executor, "msg executor")?,
        })
    }
}

struct Resolved {
    accounts: Arc<dyn AccountKeeper>,
    bank: Arc<dyn BankKeeper>,
    gas_free: Arc<dyn GasFreeKeeper>,
    fee_params: Arc<dyn FeeParamsKeeper>,
    executor: Arc<dyn MsgExecutor>,
}

/// Which chain admits a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxRoute {
    Generic,
    Eip712,
    Ethereum,
}

/// Pick the chain for `tx` from its first extension option.
pub fn resolve_route(tx: &Tx) -> AnteResult<TxRoute> {
    let Some(option) = tx.extension_options.first() else {
        return Ok(TxRoute::Generic);
    };

    match option {
        ExtensionOption::EthereumTx => {
            if let Some(other) = tx.msgs.iter().find(|msg| !matches!(msg, Msg::EthereumTx(_))) {
                return Err(AnteError::UnknownTransactionType(format!(
                    "ethereum extension with message {}",
                    other.type_url()
                )));
            }
            Ok(TxRoute::Ethereum)
        }
        ExtensionOption::Web3Tx(_) => Ok(TxRoute::Eip712),
        ExtensionOption::Other { type_url } => {
            Err(AnteError::UnsupportedExtension(type_url.clone()))
        }
    }
}

/// Admission entry point holding the three composed chains.
pub struct AnteDispatcher {
    generic: AnteHandler,
    eip712: AnteHandler,
    ethereum: AnteHandler,
}

impl AnteDispatcher {
    pub fn new(options: HandlerOptions) -> AnteResult<Self> {
        let deps = options.resolve()?;
        let config = &options.config;

        Ok(Self {
            generic: chain_decorators(native_chain(&deps, config, false), deps.executor.clone()),
            eip712: chain_decorators(native_chain(&deps, config, true), deps.executor.clone()),
            ethereum: chain_decorators(ethereum_chain(&deps, config), deps.executor.clone()),
        })
    }

    fn handler(&self, route: TxRoute) -> &AnteHandler {
        match route {
            TxRoute::Generic => &self.generic,
            TxRoute::Eip712 => &self.eip712,
            TxRoute::Ethereum => &self.ethereum,
        }
    }

    /// Route `tx` and run its chain once. A panic in any stage is recovered
    /// here and reported as [`AnteError::Panic`].
    pub fn dispatch(&self, ctx: Context, tx: &Tx, simulate: bool) -> AnteResult<Context> {
        let route = match resolve_route(tx) {
            Ok(route) => route,
            Err(err) => {
                warn!(%err, "transaction matches no admission chain");
                return Err(err);
            }
        };
        debug!(?route, msgs = tx.msgs.len(), simulate, "dispatching transaction");

        let handler = self.handler(route);
        match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, tx, simulate))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(?route, %message, "panic recovered during admission");
                Err(AnteError::Panic(message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Generic chain, or its EIP-712 variant
fn native_chain(deps: &Resolved, config: &Config, eip712: bool) -> Vec<Arc<dyn AnteDecorator>> {
    let min_gas_price: Arc<dyn AnteDecorator> = if eip712 {
        Arc::new(MinGasPriceDecorator::new(deps.fee_params.clone()))
    } else {
        Arc::new(BypassDecorator::new(
            MinGasPriceDecorator::new(deps.fee_params.clone()),
            deps.gas_free.clone(),
        ))
    };
    let sig_verification: Arc<dyn AnteDecorator> = if eip712 {
        Arc::new(Eip712SigVerificationDecorator::new(
            deps.accounts.clone(),
            config.chain.eth_chain_id,
        ))
    } else {
        Arc::new(SigVerificationDecorator::new(deps.accounts.clone()))
    };

    vec![
        Arc::new(SetUpContextDecorator),
        Arc::new(RejectMessagesDecorator),
        Arc::new(AuthzLimiterDecorator::new(&config.scanner)),
        Arc::new(ValidateBasicDecorator),
        Arc::new(TxTimeoutHeightDecorator),
        Arc::new(ValidateMemoDecorator::new(&config.auth)),
        min_gas_price,
        Arc::new(ConsumeTxSizeGasDecorator::new(&config.auth)),
        Arc::new(SetPubKeyDecorator::new(deps.accounts.clone())),
        Arc::new(ValidateSigCountDecorator::new(&config.auth)),
        Arc::new(SigGasConsumeDecorator::new(deps.accounts.clone(), &config.auth)),
        sig_verification,
        Arc::new(DeductFeeDecorator::new(
            deps.accounts.clone(),
            deps.bank.clone(),
            deps.fee_params.clone(),
        )),
        Arc::new(CustomFeeCollectorDecorator::new(
            deps.gas_free.clone(),
            deps.bank.clone(),
            deps.fee_params.clone(),
            config.fees.custom_fee_gas,
        )),
        Arc::new(AccountKindReconcilerDecorator::new(deps.accounts.clone())),
        Arc::new(IncrementSequenceDecorator::new(deps.accounts.clone())),
        Arc::new(GasWantedDecorator::new(deps.fee_params.clone())),
        Arc::new(EmitTxEventsDecorator),
    ]
}

fn ethereum_chain(deps: &Resolved, config: &Config) -> Vec<Arc<dyn AnteDecorator>> {
    let rules = config.chain.rules();
    vec![
        Arc::new(EthSetUpContextDecorator),
        Arc::new(EthMempoolFeeDecorator::new(deps.fee_params.clone())),
        Arc::new(EthValidateBasicDecorator::new(deps.fee_params.clone())),
        Arc::new(EthSigVerificationDecorator::new(rules.clone())),
        Arc::new(EthAccountVerificationDecorator::new(
            deps.accounts.clone(),
            deps.bank.clone(),
            deps.fee_params.clone(),
        )),
        Arc::new(EthSetPubKeyDecorator::new(deps.accounts.clone(), rules)),
        Arc::new(EthGasConsumeDecorator::new(deps.bank.clone(), deps.fee_params.clone())),
        Arc::new(AccountKindReconcilerDecorator::new(deps.accounts.clone())),
        Arc::new(EthIncrementSequenceDecorator::new(deps.accounts.clone())),
        Arc::new(GasWantedDecorator::new(deps.fee_params.clone())),
        Arc::new(EthEmitEventDecorator),
    ]
}

//! Ethereum Transaction Stages
//!
//! Stages of the chain that admits transactions carrying the Ethereum
//! extension option. Every message is an Ethereum payload whose own
//! signature authorizes it; the payload's nonce doubles as the sender's
//! account sequence.

use super::decorator::{AnteDecorator, AnteHandler};
use super::fees::deduct_fees;
use crate::context::{Context, Event};
use crate::crypto::{compress_public_key, recover_public_key, recover_signer, ChainRules};
use crate::error::{AnteError, AnteResult};
use crate::state::{AccountKeeper, BankKeeper, FeeParamsKeeper};
use crate::types::{Account, Coin, MsgEthereumTx, Tx};
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The Ethereum messages of a transaction routed to this chain
fn eth_msgs(tx: &Tx) -> AnteResult<Vec<&MsgEthereumTx>> {
    tx.ethereum_msgs().ok_or_else(|| {
        AnteError::UnknownTransactionType("ethereum transaction with non-ethereum messages".into())
    })
}

fn load_account(accounts: &dyn AccountKeeper, address: &Address) -> AnteResult<Account> {
    accounts
        .account(address)
        .ok_or(AnteError::UnknownAddress(*address))
}

/// Node-local price floor, applied in check mode only.
pub struct EthMempoolFeeDecorator {
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl EthMempoolFeeDecorator {
    pub fn new(fee_params: Arc<dyn FeeParamsKeeper>) -> Self {
        Self { fee_params }
    }
}

impl AnteDecorator for EthMempoolFeeDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        if !ctx.is_check_tx || simulate || ctx.min_gas_price.is_zero() {
            return next(ctx, tx, simulate);
        }

        for msg in eth_msgs(tx)? {
            let required = ctx.min_gas_price.saturating_mul(U256::from(msg.data.gas()));
            let offered = msg.data.fee();
            if offered < required {
                warn!(%offered, %required, "ethereum fee below node minimum");
                return Err(AnteError::InsufficientFee {
                    required,
                    got: offered,
                    denom: self.fee_params.fee_params().fee_denom,
                });
            }
        }

        next(ctx, tx, simulate)
    }
}

/// Checks the native envelope carries nothing but the Ethereum payloads:
/// empty memo, no native signatures, and fee and gas equal to the payload sums.
pub struct EthValidateBasicDecorator {
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl EthValidateBasicDecorator {
    pub fn new(fee_params: Arc<dyn FeeParamsKeeper>) -> Self {
        Self { fee_params }
    }
}

impl AnteDecorator for EthValidateBasicDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let msgs = eth_msgs(tx)?;
        if msgs.is_empty() {
            return Err(AnteError::InvalidRequest("must contain at least one message".into()));
        }
        if !tx.memo.is_empty() {
            return Err(AnteError::InvalidRequest("memo must be empty for ethereum transactions".into()));
        }
        if !tx.signatures.is_empty() {
            return Err(AnteError::InvalidRequest(
                "ethereum transactions carry no native signatures".into(),
            ));
        }

        let total_gas = msgs
            .iter()
            .fold(0u64, |acc, msg| acc.saturating_add(msg.data.gas()));
        if tx.fee.gas_limit != total_gas {
            return Err(AnteError::InvalidRequest(format!(
                "gas limit {} does not match payload gas {total_gas}",
                tx.fee.gas_limit
            )));
        }

        let denom = self.fee_params.fee_params().fee_denom;
        let total_fee = msgs
            .iter()
            .fold(U256::zero(), |acc, msg| acc.saturating_add(msg.data.fee()));
        let offered = tx.fee.amount_of(&denom);
        if offered != total_fee {
            return Err(AnteError::InvalidRequest(format!(
                "fee {offered}{denom} does not match payload fees {total_fee}{denom}"
            )));
        }

        next(ctx, tx, simulate)
    }
}

/// Recovers each payload's sender and compares it with the claimed one.
pub struct EthSigVerificationDecorator {
    rules: ChainRules,
}

impl EthSigVerificationDecorator {
    pub fn new(rules: ChainRules) -> Self {
        Self { rules }
    }
}

impl AnteDecorator for EthSigVerificationDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for msg in eth_msgs(tx)? {
            let sender = recover_signer(&self.rules, ctx.block_height, &msg.data)?;
            if sender != msg.from {
                warn!(claimed = ?msg.from, recovered = ?sender, "ethereum sender mismatch");
                return Err(AnteError::InvalidSignature(format!(
                    "invalid from address; expected {sender:?}, got {:?}",
                    msg.from
                )));
            }
        }

        next(ctx, tx, simulate)
    }
}

/// Creates missing sender accounts, rejects senders holding contract code and
/// requires each sender to afford value plus maximum fee.
pub struct EthAccountVerificationDecorator {
    accounts: Arc<dyn AccountKeeper>,
    bank: Arc<dyn BankKeeper>,
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl EthAccountVerificationDecorator {
    pub fn new(
        accounts: Arc<dyn AccountKeeper>,
        bank: Arc<dyn BankKeeper>,
        fee_params: Arc<dyn FeeParamsKeeper>,
    ) -> Self {
        Self {
            accounts,
            bank,
            fee_params,
        }
    }
}

impl AnteDecorator for EthAccountVerificationDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let denom = self.fee_params.fee_params().fee_denom;
        for msg in eth_msgs(tx)? {
            let sender = msg.from;
            let account = match self.accounts.account(&sender) {
                Some(account) => account,
                None => {
                    let account = self.accounts.new_account_with_address(sender);
                    self.accounts.set_account(account.clone())?;
                    info!(?sender, account_number = account.account_number, "sender account created");
                    account
                }
            };
            if account.is_contract() {
                return Err(AnteError::Unauthorized(format!(
                    "sender {sender:?} is not an externally owned account"
                )));
            }

            let cost = msg.data.cost();
            let available = self.bank.balance(&sender, &denom);
            if available < cost {
                warn!(?sender, %cost, %available, "sender cannot cover transaction cost");
                return Err(AnteError::InsufficientFunds {
                    address: sender,
                    required: cost,
                    available,
                    denom,
                });
            }
        }

        next(ctx, tx, simulate)
    }
}

/// Stores the sender's recovered key, compressed, when the account has none.
pub struct EthSetPubKeyDecorator {
    accounts: Arc<dyn AccountKeeper>,
    rules: ChainRules,
}

impl EthSetPubKeyDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>, rules: ChainRules) -> Self {
        Self { accounts, rules }
    }
}

impl AnteDecorator for EthSetPubKeyDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for msg in eth_msgs(tx)? {
            let mut account = load_account(self.accounts.as_ref(), &msg.from)?;
            if account.pub_key.is_some() {
                continue;
            }
            let uncompressed = recover_public_key(&self.rules, ctx.block_height, &msg.data)?;
            account.pub_key = Some(compress_public_key(&uncompressed)?);
            self.accounts.set_account(account)?;
            debug!(sender = ?msg.from, "recovered public key stored");
        }

        next(ctx, tx, simulate)
    }
}

/// Deducts `gas * gas_price` of every payload from its sender and records
/// gas wanted and priority.
pub struct EthGasConsumeDecorator {
    bank: Arc<dyn BankKeeper>,
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl EthGasConsumeDecorator {
    pub fn new(bank: Arc<dyn BankKeeper>, fee_params: Arc<dyn FeeParamsKeeper>) -> Self {
        Self { bank, fee_params }
    }
}

impl AnteDecorator for EthGasConsumeDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let denom = self.fee_params.fee_params().fee_denom;
        let mut gas_wanted = 0u64;
        let mut min_price: Option<U256> = None;

        for msg in eth_msgs(tx)? {
            let fee = msg.data.fee();
            if !fee.is_zero() {
                deduct_fees(self.bank.as_ref(), &msg.from, &[Coin::new(denom.clone(), fee)])?;
            }
            gas_wanted = gas_wanted.saturating_add(msg.data.gas());
            let price = msg.data.gas_price();
            min_price = Some(min_price.map_or(price, |current| current.min(price)));
        }

        ctx.gas_wanted = gas_wanted;
        // Priority is the lowest price offered by any payload
        if let Some(price) = min_price {
            ctx.priority = if price > U256::from(i64::MAX as u64) {
                i64::MAX
            } else {
                price.low_u64() as i64
            };
        }

        next(ctx, tx, simulate)
    }
}

/// Checks each payload nonce against the sender's sequence, then increments it.
///
/// Contract creations are left to the execution engine, which bumps the
/// nonce itself when deriving the new contract address.
pub struct EthIncrementSequenceDecorator {
    accounts: Arc<dyn AccountKeeper>,
}

impl EthIncrementSequenceDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>) -> Self {
        Self { accounts }
    }
}

impl AnteDecorator for EthIncrementSequenceDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for msg in eth_msgs(tx)? {
            let mut account = load_account(self.accounts.as_ref(), &msg.from)?;
            let nonce = msg.data.nonce();
            if nonce != account.sequence {
                warn!(sender = ?msg.from, expected = account.sequence, got = nonce, "invalid nonce");
                return Err(AnteError::WrongSequence {
                    expected: account.sequence,
                    got: nonce,
                });
            }
            if msg.data.tx.to().is_some() {
                account.sequence = account
                    .sequence
                    .checked_add(1)
                    .ok_or(AnteError::SequenceOverflow(msg.from))?;
                self.accounts.set_account(account)?;
            }
        }

        next(ctx, tx, simulate)
    }
}

#[derive(Debug, Default)]
pub struct EthEmitEventDecorator;

impl AnteDecorator for EthEmitEventDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for (index, msg) in eth_msgs(tx)?.into_iter().enumerate() {
            let hash = msg.data.hash();
            ctx.emit(
                Event::new("ethereum_tx")
                    .attr("eth_hash", format!("0x{}", hex::encode(hash.as_bytes())))
                    .attr("tx_index", index),
            );
        }

        next(ctx, tx, simulate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ante::decorator::{chain_decorators, NoopExecutor};
    use crate::state::{FeeParams, StateCache};
    use crate::testutil::{
        dynamic_fee_tx, eth_address_of, eth_pubkey_of, eth_tx, legacy_tx, sign_eth,
        signing_key, test_context, VForm, TEST_DENOM, TEST_ETH_CHAIN_ID,
    };
    use crate::types::Msg;
    use k256::ecdsa::SigningKey;

    fn params() -> Arc<FeeParams> {
        Arc::new(FeeParams {
            fee_denom: TEST_DENOM.to_string(),
            min_gas_price: U256::zero(),
            max_gas_wanted: 0,
            fee_basis_points: 0,
        })
    }

    fn rules() -> ChainRules {
        ChainRules::all_active(TEST_ETH_CHAIN_ID)
    }

    fn signed_dynamic(key: &SigningKey, nonce: u64) -> Tx {
        eth_tx(key, sign_eth(key, dynamic_fee_tx(TEST_ETH_CHAIN_ID, nonce), VForm::Parity))
    }

    fn run(decorator: impl AnteDecorator + 'static, ctx: Context, tx: &Tx) -> AnteResult<Context> {
        let handler = chain_decorators(vec![Arc::new(decorator)], Arc::new(NoopExecutor));
        handler(ctx, tx, false)
    }

    #[test]
    fn test_mempool_fee_only_in_check_mode() {
        let tx = signed_dynamic(&signing_key(1), 0);
        let ctx = test_context().with_min_gas_price(U256::from(11));

        assert!(run(EthMempoolFeeDecorator::new(params()), ctx.clone(), &tx).is_ok());
        assert!(matches!(
            run(EthMempoolFeeDecorator::new(params()), ctx.with_check_tx(true), &tx),
            Err(AnteError::InsufficientFee { .. })
        ));
    }

    #[test]
    fn test_validate_basic_requires_matching_envelope() {
        let mut tx = signed_dynamic(&signing_key(1), 0);
        assert!(run(EthValidateBasicDecorator::new(params()), test_context(), &tx).is_ok());

        tx.fee.gas_limit += 1;
        assert!(matches!(
            run(EthValidateBasicDecorator::new(params()), test_context(), &tx),
            Err(AnteError::InvalidRequest(_))
        ));

        let mut tx = signed_dynamic(&signing_key(1), 0);
        tx.memo = "hello".into();
        assert!(matches!(
            run(EthValidateBasicDecorator::new(params()), test_context(), &tx),
            Err(AnteError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_sig_verification_compares_claimed_sender() {
        let key = signing_key(1);
        let tx = signed_dynamic(&key, 0);
        assert!(run(EthSigVerificationDecorator::new(rules()), test_context(), &tx).is_ok());

        let mut forged = tx.clone();
        if let Msg::EthereumTx(msg) = &mut forged.msgs[0] {
            msg.from = Address::repeat_byte(0x66);
        }
        assert!(matches!(
            run(EthSigVerificationDecorator::new(rules()), test_context(), &forged),
            Err(AnteError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_sig_verification_rejects_wrong_chain() {
        let key = signing_key(1);
        let tx = eth_tx(&key, sign_eth(&key, dynamic_fee_tx(1, 0), VForm::Parity));
        assert_eq!(
            run(EthSigVerificationDecorator::new(rules()), test_context(), &tx).unwrap_err(),
            AnteError::InvalidChainId {
                expected: TEST_ETH_CHAIN_ID,
                got: 1
            }
        );
    }

    #[test]
    fn test_account_verification_creates_sender_and_checks_balance() {
        let key = signing_key(1);
        let sender = eth_address_of(&key);
        let cache = Arc::new(StateCache::new());
        let tx = signed_dynamic(&key, 0);

        let stage = EthAccountVerificationDecorator::new(cache.clone(), cache.clone(), params());
        assert!(matches!(
            run(stage, test_context(), &tx),
            Err(AnteError::InsufficientFunds { .. })
        ));
        assert!(cache.account(&sender).is_some());

        // 21000 gas at 10 plus 1000 value
        cache.set_balance(sender, TEST_DENOM, U256::from(211_000));
        let stage = EthAccountVerificationDecorator::new(cache.clone(), cache.clone(), params());
        assert!(run(stage, test_context(), &tx).is_ok());
    }

    #[test]
    fn test_set_pub_key_stores_recovered_key() {
        let key = signing_key(1);
        let sender = eth_address_of(&key);
        let cache = Arc::new(StateCache::new());
        cache.set_account(cache.new_account_with_address(sender)).unwrap();

        let tx = eth_tx(&key, sign_eth(&key, legacy_tx(Some(TEST_ETH_CHAIN_ID), 0), VForm::Eip155(TEST_ETH_CHAIN_ID)));
        run(EthSetPubKeyDecorator::new(cache.clone(), rules()), test_context(), &tx).unwrap();
        assert_eq!(cache.account(&sender).unwrap().pub_key, Some(eth_pubkey_of(&key)));
    }

    #[test]
    fn test_gas_consume_deducts_fee_and_records_gas() {
        let key = signing_key(1);
        let sender = eth_address_of(&key);
        let cache = Arc::new(StateCache::new());
        cache.set_balance(sender, TEST_DENOM, U256::from(500_000));

        let tx = signed_dynamic(&key, 0);
        let ctx = run(EthGasConsumeDecorator::new(cache.clone(), params()), test_context(), &tx)
            .unwrap();

        assert_eq!(cache.balance(&sender, TEST_DENOM), U256::from(500_000 - 210_000));
        assert_eq!(ctx.gas_wanted, 21_000);
        assert_eq!(ctx.priority, 10);
    }

    #[test]
    fn test_increment_sequence_checks_nonce() {
        let key = signing_key(1);
        let sender = eth_address_of(&key);
        let cache = Arc::new(StateCache::new());
        cache.set_account(cache.new_account_with_address(sender)).unwrap();

        let stale = signed_dynamic(&key, 3);
        assert_eq!(
            run(EthIncrementSequenceDecorator::new(cache.clone()), test_context(), &stale)
                .unwrap_err(),
            AnteError::WrongSequence { expected: 0, got: 3 }
        );

        let tx = signed_dynamic(&key, 0);
        run(EthIncrementSequenceDecorator::new(cache.clone()), test_context(), &tx).unwrap();
        assert_eq!(cache.account(&sender).unwrap().sequence, 1);
    }

    #[test]
    fn test_increment_sequence_overflow_is_an_error() {
        let key = signing_key(1);
        let sender = eth_address_of(&key);
        let cache = Arc::new(StateCache::new());
        let mut account = cache.new_account_with_address(sender);
        account.sequence = u64::MAX;
        cache.set_account(account).unwrap();

        let tx = signed_dynamic(&key, u64::MAX);
        assert_eq!(
            run(EthIncrementSequenceDecorator::new(cache), test_context(), &tx).unwrap_err(),
            AnteError::SequenceOverflow(sender)
        );
    }

    #[test]
    fn test_emit_event_per_message() {
        let tx = signed_dynamic(&signing_key(1), 0);
        let ctx = run(EthEmitEventDecorator, test_context(), &tx).unwrap();

        let Msg::EthereumTx(msg) = &tx.msgs[0] else {
            unreachable!()
        };
        let event = ctx.events_of("ethereum_tx").next().unwrap();
        assert_eq!(
            event.attribute("eth_hash"),
            Some(format!("0x{}", hex::encode(msg.data.hash().as_bytes())).as_str())
        );
        assert_eq!(event.attribute("tx_index"), Some("0"));
    }
}

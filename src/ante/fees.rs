//! Fee Policy Stages
//!
//! - [`MinGasPriceDecorator`]: global price floor set by governance, plus the
//!   node-local floor in check mode
//! - [`DeductFeeDecorator`]: moves the fee to the fee collector, after the
//!   signatures are known to be valid
//! - [`GasWantedDecorator`]: caps the gas a transaction may ask for in check mode

use super::decorator::{AnteDecorator, AnteHandler};
use crate::context::{Context, Event};
use crate::error::{AnteError, AnteResult};
use crate::state::{AccountKeeper, BankKeeper, FeeParamsKeeper, StoreError, FEE_COLLECTOR_NAME};
use crate::types::{Coin, Tx};
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rejects transactions whose fee in the fee denom is below
/// `min_gas_price * gas_limit`. A zero floor disables the check.
///
/// Two floors apply: the global one from the fee parameters, and in check
/// mode the node-local one carried on the context.
pub struct MinGasPriceDecorator {
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl MinGasPriceDecorator {
    pub fn new(fee_params: Arc<dyn FeeParamsKeeper>) -> Self {
        Self { fee_params }
    }
}

fn check_floor(price: U256, gas_limit: u64, got: U256, denom: &str, scope: &str) -> AnteResult<()> {
    if price.is_zero() {
        return Ok(());
    }
    let required = price.saturating_mul(U256::from(gas_limit));
    if got < required {
        warn!(%got, %required, scope, "fee below minimum gas price");
        return Err(AnteError::InsufficientFee {
            required,
            got,
            denom: denom.to_string(),
        });
    }
    Ok(())
}

impl AnteDecorator for MinGasPriceDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        if simulate {
            return next(ctx, tx, simulate);
        }

        let params = self.fee_params.fee_params();
        let got = tx.fee.amount_of(&params.fee_denom);
        check_floor(params.min_gas_price, tx.fee.gas_limit, got, &params.fee_denom, "global")?;
        if ctx.is_check_tx {
            check_floor(ctx.min_gas_price, tx.fee.gas_limit, got, &params.fee_denom, "local")?;
        }

        next(ctx, tx, simulate)
    }
}

/// Deducts the transaction fee from the fee payer.
pub struct DeductFeeDecorator {
    accounts: Arc<dyn AccountKeeper>,
    bank: Arc<dyn BankKeeper>,
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl DeductFeeDecorator {
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

impl AnteDecorator for DeductFeeDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let params = self.fee_params.fee_params();
        let payer = tx
            .fee_payer()
            .ok_or_else(|| AnteError::InvalidRequest("transaction has no fee payer".into()))?;
        if self.accounts.account(&payer).is_none() {
            return Err(AnteError::UnknownAddress(payer));
        }

        let offered = tx.fee.amount_of(&params.fee_denom);
        let fee: Vec<Coin> = tx
            .fee
            .amount
            .iter()
            .filter(|coin| !coin.amount.is_zero())
            .cloned()
            .collect();
        if !fee.is_empty() {
            deduct_fees(self.bank.as_ref(), &payer, &fee)?;
            debug!(?payer, "fee deducted");
        }

        if tx.fee.gas_limit > 0 {
            let per_gas = offered / U256::from(tx.fee.gas_limit);
            ctx.priority = i64::try_from(per_gas.min(U256::from(i64::MAX as u64)).as_u64())
                .unwrap_or(i64::MAX);
        }
        ctx.emit(
            Event::new("tx")
                .attr("fee", format_coins(&tx.fee.amount))
                .attr("fee_payer", format!("{payer:?}")),
        );

        next(ctx, tx, simulate)
    }
}

/// Move `fee` from `payer` to the fee collector module account
pub fn deduct_fees(bank: &dyn BankKeeper, payer: &Address, fee: &[Coin]) -> AnteResult<()> {
    bank.send_coins_from_account_to_module(payer, FEE_COLLECTOR_NAME, fee)
        .map_err(|err| match err {
            StoreError::InsufficientBalance {
                address,
                denom,
                required,
                available,
            } => AnteError::InsufficientFunds {
                address,
                required,
                available,
                denom,
            },
            other => AnteError::Store(other),
        })
}

pub(crate) fn format_coins(coins: &[Coin]) -> String {
    coins
        .iter()
        .map(|coin| format!("{}{}", coin.amount, coin.denom))
        .collect::<Vec<_>>()
        .join(",")
}

/// Rejects, in check mode, transactions asking for more gas than
/// `max_gas_wanted`. Zero disables the cap.
pub struct GasWantedDecorator {
    fee_params: Arc<dyn FeeParamsKeeper>,
}

impl GasWantedDecorator {
    pub fn new(fee_params: Arc<dyn FeeParamsKeeper>) -> Self {
        Self { fee_params }
    }
}

impl AnteDecorator for GasWantedDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let max = self.fee_params.fee_params().max_gas_wanted;
        if ctx.is_check_tx && max != 0 && ctx.gas_wanted > max {
            warn!(gas_wanted = ctx.gas_wanted, max, "gas wanted above cap");
            return Err(AnteError::GasWantedExceeded {
                got: ctx.gas_wanted,
                max,
            });
        }

        next(ctx, tx, simulate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ante::decorator::{chain_decorators, NoopExecutor};
    use crate::state::{module_address, FeeParams, StateCache};
    use crate::testutil::{native_tx, send_msg, test_context, TEST_DENOM};

    fn params(min_gas_price: u64, max_gas_wanted: u64) -> Arc<FeeParams> {
        Arc::new(FeeParams {
            fee_denom: TEST_DENOM.to_string(),
            min_gas_price: U256::from(min_gas_price),
            max_gas_wanted,
            fee_basis_points: 0,
        })
    }

    fn run(decorator: impl AnteDecorator + 'static, ctx: Context, tx: &Tx) -> AnteResult<Context> {
        let handler = chain_decorators(vec![Arc::new(decorator)], Arc::new(NoopExecutor));
        handler(ctx, tx, false)
    }

    #[test]
    fn test_min_gas_price_floor() {
        let payer = Address::repeat_byte(1);
        let tx = native_tx(vec![send_msg(payer, payer, 1)], 99, 100);
        let err = run(MinGasPriceDecorator::new(params(1, 0)), test_context(), &tx).unwrap_err();
        assert!(matches!(err, AnteError::InsufficientFee { .. }));

        let tx = native_tx(vec![send_msg(payer, payer, 1)], 100, 100);
        assert!(run(MinGasPriceDecorator::new(params(1, 0)), test_context(), &tx).is_ok());
    }

    #[test]
    fn test_local_floor_only_in_check_mode() {
        let payer = Address::repeat_byte(1);
        let tx = native_tx(vec![send_msg(payer, payer, 1)], 100, 100);
        let local = test_context().with_min_gas_price(U256::from(2));

        assert!(run(MinGasPriceDecorator::new(params(1, 0)), local.clone(), &tx).is_ok());
        assert_eq!(
            run(MinGasPriceDecorator::new(params(1, 0)), local.with_check_tx(true), &tx).unwrap_err(),
            AnteError::InsufficientFee {
                required: U256::from(200),
                got: U256::from(100),
                denom: TEST_DENOM.to_string(),
            }
        );
    }

    #[test]
    fn test_deduct_fee_moves_funds_to_collector() {
        let cache = Arc::new(StateCache::new());
        let payer = Address::repeat_byte(1);
        let account = cache.new_account_with_address(payer);
        cache.set_account(account).unwrap();
        cache.set_balance(payer, TEST_DENOM, U256::from(1_000));

        let tx = native_tx(vec![send_msg(payer, payer, 1)], 300, 100);
        let decorator = DeductFeeDecorator::new(cache.clone(), cache.clone(), params(0, 0));
        let ctx = run(decorator, test_context(), &tx).unwrap();

        assert_eq!(cache.balance(&payer, TEST_DENOM), U256::from(700));
        assert_eq!(
            cache.balance(&module_address(FEE_COLLECTOR_NAME), TEST_DENOM),
            U256::from(300)
        );
        assert_eq!(ctx.priority, 3);
    }

    #[test]
    fn test_deduct_fee_requires_existing_payer() {
        let cache = Arc::new(StateCache::new());
        let payer = Address::repeat_byte(1);
        let tx = native_tx(vec![send_msg(payer, payer, 1)], 300, 100);
        let decorator = DeductFeeDecorator::new(cache.clone(), cache.clone(), params(0, 0));

        assert_eq!(
            run(decorator, test_context(), &tx).unwrap_err(),
            AnteError::UnknownAddress(payer)
        );
    }

    #[test]
    fn test_deduct_fee_underfunded() {
        let cache = Arc::new(StateCache::new());
        let payer = Address::repeat_byte(1);
        cache.set_account(cache.new_account_with_address(payer)).unwrap();
        cache.set_balance(payer, TEST_DENOM, U256::from(10));

        let tx = native_tx(vec![send_msg(payer, payer, 1)], 300, 100);
        let decorator = DeductFeeDecorator::new(cache.clone(), cache.clone(), params(0, 0));
        assert!(matches!(
            run(decorator, test_context(), &tx),
            Err(AnteError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_gas_wanted_cap_only_in_check_mode() {
        let tx = native_tx(vec![], 0, 500);
        let mut ctx = test_context();
        ctx.gas_wanted = 500;

        assert!(run(GasWantedDecorator::new(params(0, 100)), ctx.clone(), &tx).is_ok());

        let err = run(GasWantedDecorator::new(params(0, 100)), ctx.with_check_tx(true), &tx)
            .unwrap_err();
        assert_eq!(err, AnteError::GasWantedExceeded { got: 500, max: 100 });
    }
}

//! Custom Fee Collector
//!
//! Gas-free transfers skip the standard fee policy, so the chain takes a
//! basis-point cut of each transferred coin instead. The stage always runs,
//! whether or not the bypass fired earlier in the chain.

use super::decorator::{AnteDecorator, AnteHandler};
use super::fees::deduct_fees;
use crate::config::FEE_BASIS_POINTS_DIVISOR;
use crate::context::{Context, Event};
use crate::error::{AnteError, AnteResult};
use crate::state::{BankKeeper, FeeParamsKeeper, GasFreeKeeper};
use crate::types::{Coin, Msg, MsgSend, MsgShape, Tx, MSG_SEND};
use ethers::types::U256;
use std::sync::Arc;
use tracing::{info, warn};

/// `floor(amount * basis_points / 10000)` without overflowing for any amount
pub fn basis_point_fee(amount: U256, basis_points: u64) -> U256 {
    let divisor = U256::from(FEE_BASIS_POINTS_DIVISOR);
    let bp = U256::from(basis_points);
    (amount / divisor) * bp + (amount % divisor) * bp / divisor
}

/// Transfers at the top level and directly inside a top-level exec, the
/// same single level the bypass unwraps.
fn transfers(tx: &Tx) -> impl Iterator<Item = &MsgSend> {
    tx.msgs
        .iter()
        .flat_map(|msg| match msg.shape() {
            MsgShape::Exec(inner) => inner.iter().collect::<Vec<_>>(),
            _ => vec![msg],
        })
        .filter_map(|msg| match msg {
            Msg::Send(send) => Some(send),
            _ => None,
        })
}

/// Charge the basis-point cut on every gas-free transfer in `tx`.
pub fn charge_exempt_fees(
    mut ctx: Context,
    tx: &Tx,
    gas_free: &dyn GasFreeKeeper,
    bank: &dyn BankKeeper,
    fee_basis_points: u64,
    custom_fee_gas: u64,
) -> AnteResult<Context> {
    if fee_basis_points == 0 || !gas_free.is_gas_free_msg_type(MSG_SEND) {
        return Ok(ctx);
    }

    for send in transfers(tx) {
        let payer = send.from_address;

        for coin in &send.amount {
            let fee = basis_point_fee(coin.amount, fee_basis_points);
            if fee.is_zero() {
                continue;
            }

            let available = bank.balance(&payer, &coin.denom);
            if available < fee {
                warn!(?payer, %fee, %available, denom = %coin.denom, "cannot cover custom fee");
                return Err(AnteError::InsufficientFee {
                    required: fee,
                    got: available,
                    denom: coin.denom.clone(),
                });
            }

            ctx.consume_gas(custom_fee_gas, "custom fee")?;
            let charged = Coin::new(coin.denom.clone(), fee);
            deduct_fees(bank, &payer, std::slice::from_ref(&charged))?;

            info!(?payer, %fee, denom = %coin.denom, "custom fee collected");
            ctx.emit(
                Event::new("custom_fee")
                    .attr("payer", format!("{payer:?}"))
                    .attr("amount", format!("{fee}{}", coin.denom)),
            );
        }
    }

    Ok(ctx)
}

pub struct CustomFeeCollectorDecorator {
    gas_free: Arc<dyn GasFreeKeeper>,
    bank: Arc<dyn BankKeeper>,
    fee_params: Arc<dyn FeeParamsKeeper>,
    custom_fee_gas: u64,
}

impl CustomFeeCollectorDecorator {
    pub fn new(
        gas_free: Arc<dyn GasFreeKeeper>,
        bank: Arc<dyn BankKeeper>,
        fee_params: Arc<dyn FeeParamsKeeper>,
        custom_fee_gas: u64,
    ) -> Self {
        Self {
            gas_free,
            bank,
            fee_params,
            custom_fee_gas,
        }
    }
}

impl AnteDecorator for CustomFeeCollectorDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let ctx = charge_exempt_fees(
            ctx,
            tx,
            self.gas_free.as_ref(),
            self.bank.as_ref(),
            self.fee_params.fee_params().fee_basis_points,
            self.custom_fee_gas,
        )?;

        next(ctx, tx, simulate)
    }
}

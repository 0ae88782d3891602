//! Context setup stages. Both run first in their chains.

use super::decorator::{AnteDecorator, AnteHandler};
use crate::context::{Context, GasMeter};
use crate::error::AnteResult;
use crate::types::Tx;
use tracing::debug;

/// Installs a gas meter bounded by the transaction's gas limit and an empty
/// event log. Simulation and genesis (height 0) get an infinite meter.
#[derive(Debug, Default)]
pub struct SetUpContextDecorator;

impl AnteDecorator for SetUpContextDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let gas_limit = tx.fee.gas_limit;
        ctx.gas_meter = if simulate || ctx.block_height == 0 {
            GasMeter::infinite()
        } else {
            GasMeter::new(gas_limit)
        };
        ctx.gas_wanted = gas_limit;
        ctx.events.clear();
        debug!(gas_limit, simulate, "gas meter installed");

        next(ctx, tx, simulate)
    }
}

/// Ethereum payloads meter gas in the execution engine; admission runs on
/// an infinite meter.
#[derive(Debug, Default)]
pub struct EthSetUpContextDecorator;

impl AnteDecorator for EthSetUpContextDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        ctx.gas_meter = GasMeter::infinite();
        ctx.gas_wanted = 0;
        ctx.events.clear();

        next(ctx, tx, simulate)
    }
}

//! Bypass Decorator
//!
//! Wraps a fee-policy stage and skips it for transactions made up entirely
//! of gas-free message types. The gas-free set is read from its keeper on
//! every transaction, so governance updates apply from the next block on.

use super::decorator::{AnteDecorator, AnteHandler};
use crate::context::Context;
use crate::error::AnteResult;
use crate::state::GasFreeKeeper;
use crate::types::{Msg, MsgShape, Tx};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// True iff `tx` has at least one message and every message is gas-free.
///
/// An exec container counts as gas-free when it holds at least one message
/// and every message directly inside it is gas-free. Only that one level is
/// unwrapped.
pub fn is_fully_exempt(tx: &Tx, gas_free: &BTreeSet<String>) -> bool {
    !tx.msgs.is_empty() && tx.msgs.iter().all(|msg| is_exempt(msg, gas_free))
}

fn is_exempt(msg: &Msg, gas_free: &BTreeSet<String>) -> bool {
    match msg.shape() {
        MsgShape::Exec(inner) => {
            !inner.is_empty() && inner.iter().all(|m| gas_free.contains(m.type_url()))
        }
        _ => gas_free.contains(msg.type_url()),
    }
}

/// Runs `inner` unless the transaction is fully exempt, in which case the
/// chain continues at `next` directly.
pub struct BypassDecorator<D> {
    inner: D,
    gas_free: Arc<dyn GasFreeKeeper>,
}

impl<D: AnteDecorator> BypassDecorator<D> {
    pub fn new(inner: D, gas_free: Arc<dyn GasFreeKeeper>) -> Self {
        Self { inner, gas_free }
    }
}

impl<D: AnteDecorator> AnteDecorator for BypassDecorator<D> {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let gas_free = self.gas_free.gas_free_msg_types();
        if is_fully_exempt(tx, &gas_free) {
            debug!(msgs = tx.msgs.len(), "all messages gas-free, bypassing wrapped stage");
            return next(ctx, tx, simulate);
        }

        self.inner.ante_handle(ctx, tx, simulate, next)
    }
}

//! Stage Contract
//!
//! Every admission stage implements [`AnteDecorator`]. A stage receives the
//! context, the transaction, the simulate flag and the rest of the chain as
//! `next`; it decides whether and how to continue by calling `next`.
//!
//! [`chain_decorators`] composes a list of stages right-to-left into a single
//! [`AnteHandler`] once, when the pipeline is built.

use crate::context::Context;
use crate::error::AnteResult;
use crate::types::Tx;
use std::sync::Arc;

/// A composed chain (or the tail of one)
pub type AnteHandler = Box<dyn Fn(Context, &Tx, bool) -> AnteResult<Context> + Send + Sync>;

/// One link of the admission chain
pub trait AnteDecorator: Send + Sync {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context>;
}

/// Entry point of the execution engine, the innermost link of every chain
pub trait MsgExecutor: Send + Sync {
    fn execute(&self, ctx: Context, tx: &Tx, simulate: bool) -> AnteResult<Context>;
}

/// Executor that accepts every transaction without touching state
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl MsgExecutor for NoopExecutor {
    fn execute(&self, ctx: Context, _tx: &Tx, _simulate: bool) -> AnteResult<Context> {
        Ok(ctx)
    }
}

/// Fold `decorators` into one handler: the first decorator runs first and the
/// executor runs after the last one.
pub fn chain_decorators(
    decorators: Vec<Arc<dyn AnteDecorator>>,
    executor: Arc<dyn MsgExecutor>,
) -> AnteHandler {
    let terminal: AnteHandler = Box::new(move |ctx: Context, tx: &Tx, simulate: bool| {
        executor.execute(ctx, tx, simulate)
    });

    decorators
        .into_iter()
        .rev()
        .fold(terminal, |next, decorator| {
            let handler: AnteHandler = Box::new(move |ctx: Context, tx: &Tx, simulate: bool| {
                decorator.ante_handle(ctx, tx, simulate, &next)
            });
            handler
        })
}

use super::decorator::{AnteDecorator, AnteHandler};
use crate::context::Context;
use crate::error::{AnteError, AnteResult};
use crate::types::{Msg, Tx, MSG_ETHEREUM_TX};
use tracing::warn;

/// Rejects Ethereum messages in natively signed transactions; they must
/// arrive with the Ethereum extension option so their own signature is the
/// one that authorizes them.
#[derive(Debug, Default)]
pub struct RejectMessagesDecorator;

impl AnteDecorator for RejectMessagesDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        if tx.msgs.iter().any(|msg| matches!(msg, Msg::EthereumTx(_))) {
            warn!("ethereum message outside an ethereum transaction");
            return Err(AnteError::InvalidMessageType(format!(
                "{MSG_ETHEREUM_TX} must be wrapped in an ethereum transaction extension"
            )));
        }

        next(ctx, tx, simulate)
    }
}

//! Stateless checks on native transactions.

use super::decorator::{AnteDecorator, AnteHandler};
use crate::config::AuthConfig;
use crate::context::Context;
use crate::error::{AnteError, AnteResult};
use crate::types::Tx;
use tracing::warn;

/// Structural sanity checks: messages, signatures and gas limit present and
/// one signature per signer.
#[derive(Debug, Default)]
pub struct ValidateBasicDecorator;

impl AnteDecorator for ValidateBasicDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        if tx.msgs.is_empty() {
            return Err(AnteError::InvalidRequest("must contain at least one message".into()));
        }
        if tx.fee.gas_limit == 0 {
            return Err(AnteError::InvalidRequest("gas limit must be positive".into()));
        }
        // Signatures are filled in after simulation
        if !simulate {
            if tx.signatures.is_empty() {
                return Err(AnteError::InvalidRequest("no signatures supplied".into()));
            }
            let signers = tx.signers().len();
            if tx.signatures.len() != signers {
                warn!(signatures = tx.signatures.len(), signers, "signature count mismatch");
                return Err(AnteError::Unauthorized(format!(
                    "wrong number of signers; expected {signers}, got {}",
                    tx.signatures.len()
                )));
            }
        }

        next(ctx, tx, simulate)
    }
}

/// Rejects transactions past their timeout height or timestamp.
#[derive(Debug, Default)]
pub struct TxTimeoutHeightDecorator;

impl AnteDecorator for TxTimeoutHeightDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        if tx.timeout_height != 0 && ctx.block_height > tx.timeout_height {
            return Err(AnteError::TxTimeout(format!(
                "block height {} > timeout height {}",
                ctx.block_height, tx.timeout_height
            )));
        }
        if let Some(deadline) = tx.timeout_timestamp {
            if ctx.block_time > deadline {
                return Err(AnteError::TxTimeout(format!(
                    "block time {} > timeout timestamp {deadline}",
                    ctx.block_time
                )));
            }
        }

        next(ctx, tx, simulate)
    }
}

pub struct ValidateMemoDecorator {
    max_memo_characters: usize,
}

impl ValidateMemoDecorator {
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            max_memo_characters: auth.max_memo_characters,
        }
    }
}

impl AnteDecorator for ValidateMemoDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let len = tx.memo.chars().count();
        if len > self.max_memo_characters {
            return Err(AnteError::MemoTooLarge {
                len,
                limit: self.max_memo_characters,
            });
        }

        next(ctx, tx, simulate)
    }
}

/// Charges gas proportional to the encoded transaction size.
pub struct ConsumeTxSizeGasDecorator {
    cost_per_byte: u64,
}

impl ConsumeTxSizeGasDecorator {
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            cost_per_byte: auth.tx_size_cost_per_byte,
        }
    }
}

impl AnteDecorator for ConsumeTxSizeGasDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let cost = self.cost_per_byte.saturating_mul(tx.size_bytes as u64);
        ctx.consume_gas(cost, "txSize")?;

        next(ctx, tx, simulate)
    }
}

pub struct ValidateSigCountDecorator {
    tx_sig_limit: usize,
}

impl ValidateSigCountDecorator {
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            tx_sig_limit: auth.tx_sig_limit,
        }
    }
}

impl AnteDecorator for ValidateSigCountDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let count = tx.signatures.len();
        if count > self.tx_sig_limit {
            return Err(AnteError::TooManySignatures {
                count,
                limit: self.tx_sig_limit,
            });
        }

        next(ctx, tx, simulate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ante::decorator::{chain_decorators, NoopExecutor};
    use crate::testutil::{native_tx, other_msg, test_context};
    use ethers::types::Address;
    use std::sync::Arc;

    fn run(decorator: impl AnteDecorator + 'static, tx: &Tx, simulate: bool) -> AnteResult<Context> {
        let handler = chain_decorators(vec![Arc::new(decorator)], Arc::new(NoopExecutor));
        handler(test_context(), tx, simulate)
    }

    #[test]
    fn test_validate_basic_requires_messages_and_signatures() {
        let empty = native_tx(vec![], 0, 100);
        assert!(matches!(
            run(ValidateBasicDecorator, &empty, false),
            Err(AnteError::InvalidRequest(_))
        ));

        let unsigned = native_tx(vec![other_msg("/x.Msg", Address::repeat_byte(1))], 0, 100);
        assert!(matches!(
            run(ValidateBasicDecorator, &unsigned, false),
            Err(AnteError::InvalidRequest(_))
        ));
        // Simulation accepts missing signatures
        assert!(run(ValidateBasicDecorator, &unsigned, true).is_ok());
    }

    #[test]
    fn test_timeout_height() {
        let mut tx = native_tx(vec![], 0, 100);
        tx.timeout_height = 9;
        assert!(matches!(
            run(TxTimeoutHeightDecorator, &tx, false),
            Err(AnteError::TxTimeout(_))
        ));

        tx.timeout_height = 10;
        assert!(run(TxTimeoutHeightDecorator, &tx, false).is_ok());
    }

    #[test]
    fn test_memo_limit_counts_characters() {
        let auth = AuthConfig {
            max_memo_characters: 3,
            ..AuthConfig::default()
        };
        let mut tx = native_tx(vec![], 0, 100);
        tx.memo = "äöü".to_string();
        assert!(run(ValidateMemoDecorator::new(&auth), &tx, false).is_ok());

        tx.memo = "abcd".to_string();
        assert_eq!(
            run(ValidateMemoDecorator::new(&auth), &tx, false).unwrap_err(),
            AnteError::MemoTooLarge { len: 4, limit: 3 }
        );
    }

    #[test]
    fn test_tx_size_gas_is_charged() {
        let tx = native_tx(vec![], 0, 100);
        let ctx = run(ConsumeTxSizeGasDecorator::new(&AuthConfig::default()), &tx, false).unwrap();
        assert_eq!(ctx.gas_meter.consumed(), 2_000);
    }
}

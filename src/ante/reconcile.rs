//! Account Kind Reconciler
//!
//! A base account whose stored key is an Ethereum key is upgraded to an
//! Ethereum-capable account. The upgrade is one-way; an Ethereum account is
//! never downgraded, whatever key signs for it later.

use super::decorator::{AnteDecorator, AnteHandler};
use crate::context::Context;
use crate::error::{AnteError, AnteResult};
use crate::state::{AccountKeeper, StoreError};
use crate::types::{empty_code_hash, Account, AccountKind, Tx};
use std::sync::Arc;
use tracing::info;

/// Upgrade every signer that is a base account holding an Ethereum key.
pub fn reconcile_account_kind(
    ctx: Context,
    tx: &Tx,
    accounts: &dyn AccountKeeper,
) -> AnteResult<Context> {
    for signer in tx.signers() {
        let Some(account) = accounts.account(&signer) else {
            continue;
        };
        let Some(pub_key) = &account.pub_key else {
            continue;
        };
        if !pub_key.is_eth() || account.is_eth() {
            continue;
        }

        let upgraded = Account {
            kind: AccountKind::Eth {
                code_hash: empty_code_hash(),
            },
            ..account.clone()
        };
        // In place: a failed write leaves the base record untouched
        accounts
            .set_account(upgraded)
            .map_err(|err: StoreError| AnteError::AccountReplacementFailed {
                address: signer,
                reason: err.to_string(),
            })?;

        info!(
            address = ?signer,
            account_number = account.account_number,
            "base account upgraded to ethereum account"
        );
    }

    Ok(ctx)
}

pub struct AccountKindReconcilerDecorator {
    accounts: Arc<dyn AccountKeeper>,
}

impl AccountKindReconcilerDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>) -> Self {
        Self { accounts }
    }
}

impl AnteDecorator for AccountKindReconcilerDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        let ctx = reconcile_account_kind(ctx, tx, self.accounts.as_ref())?;
        next(ctx, tx, simulate)
    }
}

//! Nested-Message Scanner
//!
//! Forbids configured message types from hiding inside container messages
//! (governance proposals and authz executions). Recursion carries an
//! explicit depth counter and stops at a fixed bound, so adversarial
//! batching cannot exhaust the stack.
//!
//! Rules, applied per message:
//! - depth at or past the bound: reject, whatever the content
//! - proposal container: rejected inside an exec container, otherwise scanned one level deeper
//! - exec container: rejected inside any container, otherwise scanned one level deeper
//! - leaf: rejected only when enclosed and its type is forbidden

use super::decorator::{AnteDecorator, AnteHandler};
use crate::config::ScannerConfig;
use crate::context::Context;
use crate::error::{AnteError, AnteResult};
use crate::types::{Msg, MsgShape, Tx};
use std::collections::BTreeSet;
use tracing::warn;

/// What, if anything, encloses the messages being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enclosure {
    TopLevel,
    Proposal,
    Exec,
}

impl Enclosure {
    pub fn is_inside_container(self) -> bool {
        self != Enclosure::TopLevel
    }
}

/// Scan `msgs` for forbidden types.
///
/// # Arguments
/// * `msgs` - Messages at the current level
/// * `enclosure` - Container holding `msgs`, if any
/// * `depth` - Current nesting level (0 for the transaction's own messages)
/// * `max_depth` - Level at which scanning is refused outright
/// * `forbidden` - Type URLs not allowed inside containers
pub fn scan_forbidden(
    msgs: &[Msg],
    enclosure: Enclosure,
    depth: usize,
    max_depth: usize,
    forbidden: &BTreeSet<String>,
) -> AnteResult<()> {
    if depth >= max_depth {
        return Err(AnteError::NestingTooDeep(max_depth));
    }

    for msg in msgs {
        match msg.shape() {
            MsgShape::Proposal(inner) => {
                if enclosure == Enclosure::Exec {
                    return Err(AnteError::DisabledMessageType(msg.type_url().to_string()));
                }
                scan_forbidden(inner, Enclosure::Proposal, depth + 1, max_depth, forbidden)?;
            }
            MsgShape::Exec(inner) => {
                if enclosure.is_inside_container() {
                    return Err(AnteError::DisabledMessageType(msg.type_url().to_string()));
                }
                scan_forbidden(inner, Enclosure::Exec, depth + 1, max_depth, forbidden)?;
            }
            MsgShape::Leaf => {
                if enclosure.is_inside_container() && forbidden.contains(msg.type_url()) {
                    return Err(AnteError::DisabledMessageType(msg.type_url().to_string()));
                }
            }
        }
    }
    Ok(())
}

/// Pipeline stage running [`scan_forbidden`] over the transaction's messages.
pub struct AuthzLimiterDecorator {
    disabled_msg_types: BTreeSet<String>,
    max_nested_msgs: usize,
}

impl AuthzLimiterDecorator {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            disabled_msg_types: config.disabled_msg_types.iter().cloned().collect(),
            max_nested_msgs: config.max_nested_msgs,
        }
    }
}

impl AnteDecorator for AuthzLimiterDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        if let Err(err) = scan_forbidden(
            &tx.msgs,
            Enclosure::TopLevel,
            0,
            self.max_nested_msgs,
            &self.disabled_msg_types,
        ) {
            warn!(%err, "nested message scan rejected tx");
            return Err(err);
        }

        next(ctx, tx, simulate)
    }
}

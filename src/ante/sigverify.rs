//! Native signature stages: key registration, signature gas, verification,
//! sequence bumps and the per-signature events.

use super::decorator::{AnteDecorator, AnteHandler};
use crate::config::AuthConfig;
use crate::context::{Context, Event};
use crate::crypto::PubKey;
use crate::error::{AnteError, AnteResult};
use crate::state::AccountKeeper;
use crate::types::{Account, SignatureV2, Tx};
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pair every signer with its signature, in signer order
fn signer_signatures(tx: &Tx) -> impl Iterator<Item = (Address, &SignatureV2)> {
    tx.signers().into_iter().zip(tx.signatures.iter())
}

fn load_account(accounts: &dyn AccountKeeper, address: &Address) -> AnteResult<Account> {
    accounts
        .account(address)
        .ok_or(AnteError::UnknownAddress(*address))
}

/// Stores the public key carried in a signature on an account that has none yet.
pub struct SetPubKeyDecorator {
    accounts: Arc<dyn AccountKeeper>,
}

impl SetPubKeyDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>) -> Self {
        Self { accounts }
    }
}

impl AnteDecorator for SetPubKeyDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for (signer, signature) in signer_signatures(tx) {
            let Some(pub_key) = &signature.pub_key else {
                continue;
            };
            if pub_key.address() != Some(signer) {
                warn!(?signer, key_type = pub_key.type_name(), "public key does not match signer");
                return Err(AnteError::InvalidPubKey(signer));
            }

            let mut account = load_account(self.accounts.as_ref(), &signer)?;
            if account.pub_key.is_none() {
                account.pub_key = Some(pub_key.clone());
                self.accounts.set_account(account)?;
                debug!(?signer, key_type = pub_key.type_name(), "public key stored");
            }
        }

        next(ctx, tx, simulate)
    }
}

/// Charges verification gas for every signature according to its key type.
pub struct SigGasConsumeDecorator {
    accounts: Arc<dyn AccountKeeper>,
    cost_secp256k1: u64,
    cost_eth_secp256k1: u64,
}

impl SigGasConsumeDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>, auth: &AuthConfig) -> Self {
        Self {
            accounts,
            cost_secp256k1: auth.sig_verify_cost_secp256k1,
            cost_eth_secp256k1: auth.sig_verify_cost_eth_secp256k1,
        }
    }

    fn cost(&self, pub_key: &PubKey) -> u64 {
        match pub_key {
            PubKey::Secp256k1(_) => self.cost_secp256k1,
            PubKey::EthSecp256k1(_) => self.cost_eth_secp256k1,
        }
    }
}

impl AnteDecorator for SigGasConsumeDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for (signer, signature) in signer_signatures(tx) {
            let account = load_account(self.accounts.as_ref(), &signer)?;
            let cost = match account.pub_key.as_ref().or(signature.pub_key.as_ref()) {
                Some(pub_key) => self.cost(pub_key),
                // Simulated signers may not have a key yet
                None if simulate => self.cost_secp256k1,
                None => return Err(AnteError::InvalidPubKey(signer)),
            };
            ctx.consume_gas(cost, "ante verify")?;
        }

        next(ctx, tx, simulate)
    }
}

/// Verifies each native signature over the transaction sign bytes.
/// Sequence numbers are checked even while simulating.
pub struct SigVerificationDecorator {
    accounts: Arc<dyn AccountKeeper>,
}

impl SigVerificationDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>) -> Self {
        Self { accounts }
    }
}

impl AnteDecorator for SigVerificationDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for (signer, signature) in signer_signatures(tx) {
            let account = load_account(self.accounts.as_ref(), &signer)?;
            if signature.sequence != account.sequence {
                warn!(?signer, expected = account.sequence, got = signature.sequence, "bad sequence");
                return Err(AnteError::WrongSequence {
                    expected: account.sequence,
                    got: signature.sequence,
                });
            }
            if simulate {
                continue;
            }

            let pub_key = account
                .pub_key
                .as_ref()
                .ok_or(AnteError::InvalidPubKey(signer))?;
            let sign_bytes = tx.sign_bytes(&ctx.chain_id, account.account_number, account.sequence);
            if !pub_key.verify(&sign_bytes, &signature.data) {
                warn!(?signer, "signature verification failed");
                return Err(AnteError::Unauthorized(format!(
                    "signature verification failed for {signer:?}; verify account number ({}) and chain id ({})",
                    account.account_number, ctx.chain_id
                )));
            }
        }

        next(ctx, tx, simulate)
    }
}

/// Increments the sequence of every signer.
pub struct IncrementSequenceDecorator {
    accounts: Arc<dyn AccountKeeper>,
}

impl IncrementSequenceDecorator {
    pub fn new(accounts: Arc<dyn AccountKeeper>) -> Self {
        Self { accounts }
    }
}

impl AnteDecorator for IncrementSequenceDecorator {
    fn ante_handle(
        &self,
        ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for signer in tx.signers() {
            let mut account = load_account(self.accounts.as_ref(), &signer)?;
            account.sequence = account
                .sequence
                .checked_add(1)
                .ok_or(AnteError::SequenceOverflow(signer))?;
            self.accounts.set_account(account)?;
        }

        next(ctx, tx, simulate)
    }
}

#[derive(Debug, Default)]
pub struct EmitTxEventsDecorator;

impl AnteDecorator for EmitTxEventsDecorator {
    fn ante_handle(
        &self,
        mut ctx: Context,
        tx: &Tx,
        simulate: bool,
        next: &AnteHandler,
    ) -> AnteResult<Context> {
        for (signer, signature) in signer_signatures(tx) {
            ctx.emit(
                Event::new("tx")
                    .attr("acc_seq", format!("{signer:?}/{}", signature.sequence))
                    .attr("signature", hex::encode(&signature.data)),
            );
        }

        next(ctx, tx, simulate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ante::decorator::{chain_decorators, NoopExecutor};
    use crate::state::StateCache;
    use crate::testutil::{
        eth_address_of, eth_pubkey_of, native_pubkey_of, native_tx, send_msg, sign_tx,
        signing_key, test_context, TEST_CHAIN_ID,
    };

    fn run(decorator: impl AnteDecorator + 'static, tx: &Tx, simulate: bool) -> AnteResult<Context> {
        let handler = chain_decorators(vec![Arc::new(decorator)], Arc::new(NoopExecutor));
        handler(test_context(), tx, simulate)
    }

    /// Cache holding a base account for the native address of `seed`'s key
    fn native_signer(seed: u8) -> (Arc<StateCache>, Address) {
        let cache = Arc::new(StateCache::new());
        let address = native_pubkey_of(&signing_key(seed)).address().unwrap();
        cache.set_account(cache.new_account_with_address(address)).unwrap();
        (cache, address)
    }

    fn signed_send(seed: u8, from: Address, pub_key: PubKey, sequence: u64) -> Tx {
        let key = signing_key(seed);
        let tx = native_tx(vec![send_msg(from, Address::repeat_byte(9), 1)], 0, 100_000);
        sign_tx(tx, &[(&key, pub_key, 0, sequence)], TEST_CHAIN_ID)
    }

    #[test]
    fn test_set_pub_key_stores_key_once() {
        let (cache, address) = native_signer(1);
        let pub_key = native_pubkey_of(&signing_key(1));
        let tx = signed_send(1, address, pub_key.clone(), 0);

        run(SetPubKeyDecorator::new(cache.clone()), &tx, false).unwrap();
        assert_eq!(cache.account(&address).unwrap().pub_key, Some(pub_key));
    }

    #[test]
    fn test_set_pub_key_rejects_foreign_key() {
        let (cache, address) = native_signer(1);
        let tx = signed_send(2, address, native_pubkey_of(&signing_key(2)), 0);

        assert_eq!(
            run(SetPubKeyDecorator::new(cache), &tx, false).unwrap_err(),
            AnteError::InvalidPubKey(address)
        );
    }

    #[test]
    fn test_sig_gas_depends_on_key_type() {
        let auth = AuthConfig::default();
        let (cache, address) = native_signer(1);
        let tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 0);
        let ctx = run(SigGasConsumeDecorator::new(cache, &auth), &tx, false).unwrap();
        assert_eq!(ctx.gas_meter.consumed(), auth.sig_verify_cost_secp256k1);

        let key = signing_key(3);
        let cache = Arc::new(StateCache::new());
        let address = eth_address_of(&key);
        cache.set_account(cache.new_account_with_address(address)).unwrap();
        let tx = signed_send(3, address, eth_pubkey_of(&key), 0);
        let ctx = run(SigGasConsumeDecorator::new(cache, &auth), &tx, false).unwrap();
        assert_eq!(ctx.gas_meter.consumed(), auth.sig_verify_cost_eth_secp256k1);
    }

    #[test]
    fn test_sig_verification_accepts_valid_signature() {
        let (cache, address) = native_signer(1);
        let tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 0);

        run(SetPubKeyDecorator::new(cache.clone()), &tx, false).unwrap();
        assert!(run(SigVerificationDecorator::new(cache), &tx, false).is_ok());
    }

    #[test]
    fn test_sig_verification_rejects_tampered_tx() {
        let (cache, address) = native_signer(1);
        let mut tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 0);
        run(SetPubKeyDecorator::new(cache.clone()), &tx, false).unwrap();

        tx.memo = "changed after signing".into();
        assert!(matches!(
            run(SigVerificationDecorator::new(cache), &tx, false),
            Err(AnteError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_sig_verification_checks_sequence() {
        let (cache, address) = native_signer(1);
        let tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 4);
        run(SetPubKeyDecorator::new(cache.clone()), &tx, false).unwrap();

        assert_eq!(
            run(SigVerificationDecorator::new(cache), &tx, true).unwrap_err(),
            AnteError::WrongSequence { expected: 0, got: 4 }
        );
    }

    #[test]
    fn test_increment_sequence() {
        let (cache, address) = native_signer(1);
        let tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 0);

        run(IncrementSequenceDecorator::new(cache.clone()), &tx, false).unwrap();
        run(IncrementSequenceDecorator::new(cache.clone()), &tx, false).unwrap();
        assert_eq!(cache.account(&address).unwrap().sequence, 2);
    }

    #[test]
    fn test_increment_sequence_overflow_is_an_error() {
        let (cache, address) = native_signer(1);
        let mut account = cache.account(&address).unwrap();
        account.sequence = u64::MAX;
        cache.set_account(account).unwrap();

        let tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 0);
        assert_eq!(
            run(IncrementSequenceDecorator::new(cache.clone()), &tx, false).unwrap_err(),
            AnteError::SequenceOverflow(address)
        );
        assert_eq!(cache.account(&address).unwrap().sequence, u64::MAX);
    }

    #[test]
    fn test_emit_tx_events() {
        let (_, address) = native_signer(1);
        let tx = signed_send(1, address, native_pubkey_of(&signing_key(1)), 0);

        let ctx = run(EmitTxEventsDecorator, &tx, false).unwrap();
        let event = ctx.events_of("tx").next().unwrap();
        assert_eq!(event.attribute("acc_seq"), Some(format!("{address:?}/0").as_str()));
        assert_eq!(
            event.attribute("signature"),
            Some(hex::encode(&tx.signatures[0].data).as_str())
        );
    }
}

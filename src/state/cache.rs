use super::{module_address, AccountKeeper, BankKeeper, GasFreeKeeper, StoreError};
use crate::types::{Account, Coin};
use ethers::types::{Address, U256};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// In-memory account, balance and gas-free message store.
///
/// Cloning shares the underlying maps, so a single cache can be handed to
/// the pipeline as several keeper handles.
#[derive(Clone, Default)]
pub struct StateCache {
    accounts: Arc<RwLock<HashMap<Address, Account>>>,
    balances: Arc<RwLock<HashMap<(Address, String), U256>>>,
    gas_free: Arc<RwLock<BTreeSet<String>>>,
    next_account_number: Arc<RwLock<u64>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: Address, denom: &str, amount: U256) {
        let mut balances = self.balances.write();
        balances.insert((address, denom.to_string()), amount);
    }

    /// Replace the gas-free message set, as a governance proposal would
    pub fn set_gas_free_msg_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut gas_free = self.gas_free.write();
        *gas_free = types.into_iter().map(Into::into).collect();
    }

    fn debit(&self, address: &Address, coin: &Coin) -> Result<(), StoreError> {
        let mut balances = self.balances.write();
        let key = (*address, coin.denom.clone());
        let available = balances.get(&key).copied().unwrap_or_default();
        if available < coin.amount {
            return Err(StoreError::InsufficientBalance {
                address: *address,
                denom: coin.denom.clone(),
                required: coin.amount,
                available,
            });
        }
        balances.insert(key, available - coin.amount);
        Ok(())
    }

    fn credit(&self, address: &Address, coin: &Coin) {
        let mut balances = self.balances.write();
        let entry = balances
            .entry((*address, coin.denom.clone()))
            .or_insert_with(U256::zero);
        *entry = entry.saturating_add(coin.amount);
    }
}

impl AccountKeeper for StateCache {
    fn account(&self, address: &Address) -> Option<Account> {
        let accounts = self.accounts.read();
        accounts.get(address).cloned()
    }

    fn set_account(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();
        accounts.insert(account.address, account);
        Ok(())
    }

    fn new_account_with_address(&self, address: Address) -> Account {
        let mut next = self.next_account_number.write();
        let account = Account::new_base(address, *next);
        *next += 1;
        account
    }

    fn remove_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();
        accounts
            .remove(&account.address)
            .map(|_| ())
            .ok_or(StoreError::AccountNotFound(account.address))
    }
}

impl BankKeeper for StateCache {
    fn balance(&self, address: &Address, denom: &str) -> U256 {
        let balances = self.balances.read();
        balances
            .get(&(*address, denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn send_coins(&self, from: &Address, to: &Address, amount: &[Coin]) -> Result<(), StoreError> {
        // Check every denom before moving anything
        for coin in amount {
            let available = self.balance(from, &coin.denom);
            if available < coin.amount {
                return Err(StoreError::InsufficientBalance {
                    address: *from,
                    denom: coin.denom.clone(),
                    required: coin.amount,
                    available,
                });
            }
        }
        for coin in amount {
            self.debit(from, coin)?;
            self.credit(to, coin);
        }
        Ok(())
    }

    fn mint_coins(&self, module: &str, amount: &[Coin]) -> Result<(), StoreError> {
        let address = module_address(module);
        for coin in amount {
            self.credit(&address, coin);
        }
        Ok(())
    }

    fn burn_coins(&self, module: &str, amount: &[Coin]) -> Result<(), StoreError> {
        let address = module_address(module);
        for coin in amount {
            self.debit(&address, coin)?;
        }
        Ok(())
    }
}

impl GasFreeKeeper for StateCache {
    fn gas_free_msg_types(&self) -> BTreeSet<String> {
        self.gas_free.read().clone()
    }

    fn is_gas_free_msg_type(&self, type_url: &str) -> bool {
        self.gas_free.read().contains(type_url)
    }
}

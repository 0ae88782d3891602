//! Execution Context
//!
//! The [`Context`] travels by value through every stage of the admission
//! chain. Stages return the (possibly updated) context to the next stage, so
//! gas consumption and emitted events accumulate along the chain.

use crate::error::AnteError;
use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Gas accounting for a single transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    /// `None` for an infinite meter
    limit: Option<u64>,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            consumed: 0,
        }
    }

    pub fn infinite() -> Self {
        Self {
            limit: None,
            consumed: 0,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.consumed))
    }

    /// Charge `amount` gas; fails once the limit is exceeded
    pub fn consume(&mut self, amount: u64, descriptor: &str) -> Result<(), AnteError> {
        self.consumed = self.consumed.saturating_add(amount);
        match self.limit {
            Some(limit) if self.consumed > limit => Err(AnteError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit,
                used: self.consumed,
            }),
            _ => Ok(()),
        }
    }
}

/// An event emitted during admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Block and node state visible to every stage
#[derive(Debug, Clone)]
pub struct Context {
    pub block_height: u64,
    pub block_time: DateTime<Utc>,
    /// Chain identifier committed to by native signatures
    pub chain_id: String,
    /// True while checking a transaction for the mempool, false in block delivery
    pub is_check_tx: bool,
    /// Node-local price floor (per unit of gas) applied in check mode
    pub min_gas_price: U256,
    pub gas_meter: GasMeter,
    pub gas_wanted: u64,
    pub priority: i64,
    pub events: Vec<Event>,
}

impl Context {
    pub fn new(chain_id: impl Into<String>, block_height: u64, block_time: DateTime<Utc>) -> Self {
        Self {
            block_height,
            block_time,
            chain_id: chain_id.into(),
            is_check_tx: false,
            min_gas_price: U256::zero(),
            gas_meter: GasMeter::infinite(),
            gas_wanted: 0,
            priority: 0,
            events: Vec::new(),
        }
    }

    pub fn with_check_tx(mut self, is_check_tx: bool) -> Self {
        self.is_check_tx = is_check_tx;
        self
    }

    pub fn with_min_gas_price(mut self, price: U256) -> Self {
        self.min_gas_price = price;
        self
    }

    pub fn with_gas_meter(mut self, meter: GasMeter) -> Self {
        self.gas_meter = meter;
        self
    }

    pub fn consume_gas(&mut self, amount: u64, descriptor: &str) -> Result<(), AnteError> {
        self.gas_meter.consume(amount, descriptor)
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Events of the given kind, in emission order
    pub fn events_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |event| event.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_meter_fails_past_limit() {
        let mut meter = GasMeter::new(100);
        meter.consume(60, "first").unwrap();
        assert_eq!(meter.remaining(), Some(40));

        let err = meter.consume(41, "second").unwrap_err();
        assert_eq!(
            err,
            AnteError::OutOfGas {
                descriptor: "second".into(),
                limit: 100,
                used: 101
            }
        );
    }

    #[test]
    fn test_infinite_meter_never_fails() {
        let mut meter = GasMeter::infinite();
        meter.consume(u64::MAX, "huge").unwrap();
        meter.consume(1, "more").unwrap();
        assert_eq!(meter.consumed(), u64::MAX);
        assert_eq!(meter.remaining(), None);
    }
}

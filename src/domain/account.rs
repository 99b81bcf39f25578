use crate::error::WorkerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Represents the monetary value held by an account.
///
/// This is a wrapper around `rust_decimal::Decimal`. It may go negative: debits
/// are applied without a floor.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a strictly positive monetary amount carried by a funds movement.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, WorkerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(WorkerError::ValidationError(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = WorkerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// A row of the account ledger as seen by the worker.
///
/// `version` is bumped by every successful conditional update and is what the
/// store compares against to reject writes based on a stale read.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BankAccount {
    pub id: String,
    pub balance: Balance,
    #[serde(default)]
    pub version: u64,
}

impl BankAccount {
    pub fn new(id: impl Into<String>, balance: Balance) -> Self {
        Self {
            id: id.into(),
            balance,
            version: 0,
        }
    }
}

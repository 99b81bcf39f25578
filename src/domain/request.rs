use super::account::{Amount, Balance};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Applies `amount` to `balance` in this direction. No clamping: a debit
    /// larger than the balance yields a negative balance.
    pub fn apply(self, balance: Balance, amount: Amount) -> Balance {
        match self {
            Direction::Credit => balance + amount.into(),
            Direction::Debit => balance - amount.into(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => f.write_str("Credit"),
            Direction::Debit => f.write_str("Debit"),
        }
    }
}

/// A classified credit or debit instruction against one account.
#[derive(Debug, PartialEq, Clone)]
pub struct FundsMovementRequest {
    account_id: String,
    amount: Amount,
    direction: Direction,
}

impl FundsMovementRequest {
    pub fn new(account_id: impl Into<String>, amount: Amount, direction: Direction) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
            direction,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn apply_to(&self, balance: Balance) -> Balance {
        self.direction.apply(balance, self.amount)
    }
}

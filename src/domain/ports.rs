use super::account::{Balance, BankAccount};
use super::message::{DeadLetterRecord, RawMessage};
use crate::error::{QueueError, SinkFault, StorageFault};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn read_balance(&self, account_id: &str) -> Result<Option<BankAccount>, StorageFault>;

    /// Writes `new_balance` to `account_id` only if the stored version still
    /// equals `expected_version`. A successful write bumps the version.
    async fn conditional_update(
        &self,
        account_id: &str,
        expected_version: u64,
        new_balance: Balance,
    ) -> Result<(), StorageFault>;

    /// Every account, ordered by id.
    async fn list_accounts(&self) -> Result<Vec<BankAccount>, StorageFault>;
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, record: DeadLetterRecord) -> Result<(), SinkFault>;
}

/// Peek-lock queue transport.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Returns up to `max_count` visible messages without locking them.
    async fn peek(&self, max_count: usize) -> Result<Vec<RawMessage>, QueueError>;

    /// Locks up to `max_count` messages for `lock_timeout`, hiding them from
    /// other consumers until completed or the lock expires.
    async fn receive(
        &self,
        max_count: usize,
        lock_timeout: Duration,
    ) -> Result<Vec<RawMessage>, QueueError>;

    /// Extends the lock held on a received message to `lock_timeout` from now.
    /// Fails with [`QueueError::LockLost`] once the lock has already expired.
    async fn renew_lock(
        &self,
        message: &RawMessage,
        lock_timeout: Duration,
    ) -> Result<(), QueueError>;

    /// Permanently removes a received message.
    async fn complete(&self, message: &RawMessage) -> Result<(), QueueError>;
}

/// Suspension primitive used for retry backoff and idle polling.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub type BalanceStoreBox = Box<dyn BalanceStore>;
pub type MessageQueueBox = Box<dyn MessageQueue>;
pub type DeadLetterSinkRef = Arc<dyn DeadLetterSink>;
pub type SleeperRef = Arc<dyn Sleeper>;

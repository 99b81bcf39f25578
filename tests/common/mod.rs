#![allow(dead_code)]

use async_trait::async_trait;
use funds_worker::domain::account::{Balance, BankAccount};
use funds_worker::domain::message::RawMessage;
use funds_worker::domain::ports::{BalanceStore, MessageQueue};
use funds_worker::error::{QueueError, StorageFault};
use funds_worker::infrastructure::in_memory::{InMemoryBalanceStore, InMemoryQueue};
use serde_json::json;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn write_accounts(path: &Path, rows: &[(&str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["id", "balance"])?;
    for (id, balance) in rows {
        wtr.write_record([id, balance])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_messages(path: &Path, lines: &[String]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}

pub fn payload(message_type: &str, account_id: &str, amount: f64) -> String {
    json!({
        "messageType": message_type,
        "bankAccountId": account_id,
        "amount": amount,
    })
    .to_string()
}

/// Balance store whose conditional updates fail a fixed number of times
/// before reaching the in-memory ledger.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryBalanceStore,
    pub failures_left: Arc<AtomicUsize>,
    pub update_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub async fn new(accounts: &[(&str, Balance)], failures: usize) -> Self {
        let store = Self::default();
        for (id, balance) in accounts {
            store
                .inner
                .insert_account(BankAccount::new(*id, *balance))
                .await;
        }
        store.failures_left.store(failures, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl BalanceStore for FlakyStore {
    async fn read_balance(&self, account_id: &str) -> Result<Option<BankAccount>, StorageFault> {
        self.inner.read_balance(account_id).await
    }

    async fn conditional_update(
        &self,
        account_id: &str,
        expected_version: u64,
        new_balance: Balance,
    ) -> Result<(), StorageFault> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageFault::Unavailable("delta table busy".to_string()));
        }
        self.inner
            .conditional_update(account_id, expected_version, new_balance)
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<BankAccount>, StorageFault> {
        self.inner.list_accounts().await
    }
}

/// In-memory queue that counts completions.
#[derive(Clone, Default)]
pub struct CountingQueue {
    pub inner: InMemoryQueue,
    pub completions: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageQueue for CountingQueue {
    async fn peek(&self, max_count: usize) -> Result<Vec<RawMessage>, QueueError> {
        self.inner.peek(max_count).await
    }

    async fn receive(
        &self,
        max_count: usize,
        lock_timeout: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        self.inner.receive(max_count, lock_timeout).await
    }

    async fn renew_lock(
        &self,
        message: &RawMessage,
        lock_timeout: Duration,
    ) -> Result<(), QueueError> {
        self.inner.renew_lock(message, lock_timeout).await
    }

    async fn complete(&self, message: &RawMessage) -> Result<(), QueueError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.inner.complete(message).await
    }
}

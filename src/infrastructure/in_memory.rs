use crate::domain::account::{Balance, BankAccount};
use crate::domain::message::{DeadLetterRecord, LockToken, MessageId, RawMessage};
use crate::domain::ports::{BalanceStore, DeadLetterSink, MessageQueue};
use crate::error::{QueueError, SinkFault, StorageFault};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// A thread-safe in-memory account ledger.
///
/// Uses `Arc<RwLock<HashMap<String, BankAccount>>>` so clones share state, which
/// lets tests keep a handle on the store after boxing it for the workflow.
#[derive(Default, Clone)]
pub struct InMemoryBalanceStore {
    accounts: Arc<RwLock<HashMap<String, BankAccount>>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an account, keeping the given version.
    pub async fn insert_account(&self, account: BankAccount) {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.clone(), account);
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn read_balance(&self, account_id: &str) -> Result<Option<BankAccount>, StorageFault> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account_id).cloned())
    }

    async fn conditional_update(
        &self,
        account_id: &str,
        expected_version: u64,
        new_balance: Balance,
    ) -> Result<(), StorageFault> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| StorageFault::Missing(account_id.to_string()))?;

        if account.version != expected_version {
            return Err(StorageFault::Conflict {
                account_id: account_id.to_string(),
                expected: expected_version,
                found: account.version,
            });
        }

        account.balance = new_balance;
        account.version += 1;
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<BankAccount>, StorageFault> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<BankAccount> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// Dead-letter sink that keeps records in memory for later inspection.
#[derive(Default, Clone)]
pub struct InMemoryDeadLetterSink {
    records: Arc<RwLock<Vec<DeadLetterRecord>>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn record(&self, record: DeadLetterRecord) -> Result<(), SinkFault> {
        self.records.write().await.push(record);
        Ok(())
    }
}

struct QueuedMessage {
    message: RawMessage,
    lock: Option<(LockToken, Instant)>,
}

impl QueuedMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.lock.is_none_or(|(_, locked_until)| locked_until <= now)
    }
}

/// In-process peek-lock queue.
///
/// Received messages stay queued but hidden until completed; if the lock
/// expires first they become visible again with a bumped delivery count.
#[derive(Default, Clone)]
pub struct InMemoryQueue {
    messages: Arc<RwLock<VecDeque<QueuedMessage>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn send(&self, body: impl Into<Vec<u8>>) -> MessageId {
        let message = RawMessage::new(body);
        let id = message.id;
        self.messages
            .write()
            .await
            .push_back(QueuedMessage { message, lock: None });
        id
    }

    /// Number of messages still queued, locked ones included.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn peek(&self, max_count: usize) -> Result<Vec<RawMessage>, QueueError> {
        let now = Instant::now();
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|entry| entry.is_visible(now))
            .take(max_count)
            .map(|entry| entry.message.clone())
            .collect())
    }

    async fn receive(
        &self,
        max_count: usize,
        lock_timeout: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        let now = Instant::now();
        let mut messages = self.messages.write().await;
        let mut received = Vec::new();

        for entry in messages.iter_mut().filter(|entry| entry.is_visible(now)) {
            if received.len() == max_count {
                break;
            }
            let token = LockToken(Uuid::new_v4());
            entry.lock = Some((token, now + lock_timeout));
            entry.message.delivery_count += 1;

            let mut locked = entry.message.clone();
            locked.lock_token = Some(token);
            received.push(locked);
        }

        Ok(received)
    }

    async fn renew_lock(
        &self,
        message: &RawMessage,
        lock_timeout: Duration,
    ) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut messages = self.messages.write().await;
        let position = locked_position(&messages, message, now)?;

        if let Some((_, locked_until)) = messages[position].lock.as_mut() {
            *locked_until = now + lock_timeout;
        }
        Ok(())
    }

    async fn complete(&self, message: &RawMessage) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut messages = self.messages.write().await;
        let position = locked_position(&messages, message, now)?;
        messages.remove(position);
        Ok(())
    }
}

/// Finds `message` and checks that the caller still holds an unexpired lock on it.
fn locked_position(
    messages: &VecDeque<QueuedMessage>,
    message: &RawMessage,
    now: Instant,
) -> Result<usize, QueueError> {
    let token = message.lock_token.ok_or(QueueError::LockLost(message.id))?;
    let position = messages
        .iter()
        .position(|entry| entry.message.id == message.id)
        .ok_or(QueueError::NotFound(message.id))?;

    match messages[position].lock {
        Some((held, locked_until)) if held == token && locked_until > now => Ok(position),
        _ => Err(QueueError::LockLost(message.id)),
    }
}

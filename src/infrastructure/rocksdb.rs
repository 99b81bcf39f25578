use crate::domain::account::{Balance, BankAccount};
use crate::domain::message::DeadLetterRecord;
use crate::domain::ports::{BalanceStore, DeadLetterSink};
use crate::error::{Result, SinkFault, StorageFault, WorkerError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing account balances.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing dead-lettered messages.
pub const CF_DEAD_LETTERS: &str = "dead_letters";

/// A persistent store implementation using RocksDB.
///
/// Serves as both the balance store and the dead-letter sink, each in its own
/// Column Family. Values are JSON documents.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    // Serializes the read-compare-write of conditional updates.
    write_lock: Arc<Mutex<()>>,
}

fn backend<E: std::error::Error + Send + Sync + 'static>(e: E) -> StorageFault {
    StorageFault::Backend(Box::new(e))
}

fn missing_cf(name: &str) -> StorageFault {
    StorageFault::Unavailable(format!("{name} column family not found"))
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("accounts" and "dead_letters") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_dead_letters = ColumnFamilyDescriptor::new(CF_DEAD_LETTERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts, cf_dead_letters])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Inserts or replaces an account.
    pub async fn insert_account(&self, account: &BankAccount) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put_account(account).map_err(WorkerError::from)
    }

    /// Returns every dead-letter record in insertion order.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetterRecord>> {
        let cf = self
            .db
            .cf_handle(CF_DEAD_LETTERS)
            .ok_or_else(|| missing_cf(CF_DEAD_LETTERS))?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record = serde_json::from_slice(&value).map_err(backend)?;
            records.push(record);
        }
        Ok(records)
    }

    fn get_account(
        &self,
        account_id: &str,
    ) -> std::result::Result<Option<BankAccount>, StorageFault> {
        let cf = self
            .db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| missing_cf(CF_ACCOUNTS))?;

        match self.db.get_cf(&cf, account_id.as_bytes()).map_err(backend)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(backend)?)),
            None => Ok(None),
        }
    }

    fn put_account(&self, account: &BankAccount) -> std::result::Result<(), StorageFault> {
        let cf = self
            .db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| missing_cf(CF_ACCOUNTS))?;

        let value = serde_json::to_vec(account).map_err(backend)?;
        self.db
            .put_cf(&cf, account.id.as_bytes(), value)
            .map_err(backend)
    }
}

#[async_trait]
impl BalanceStore for RocksDBStore {
    async fn read_balance(
        &self,
        account_id: &str,
    ) -> std::result::Result<Option<BankAccount>, StorageFault> {
        self.get_account(account_id)
    }

    async fn conditional_update(
        &self,
        account_id: &str,
        expected_version: u64,
        new_balance: Balance,
    ) -> std::result::Result<(), StorageFault> {
        let _guard = self.write_lock.lock().await;

        let mut account = self
            .get_account(account_id)?
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
        self.put_account(&account)
    }

    async fn list_accounts(&self) -> std::result::Result<Vec<BankAccount>, StorageFault> {
        let cf = self
            .db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| missing_cf(CF_ACCOUNTS))?;

        // Keys are account ids, so iteration is already ordered by id.
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(backend)?;
            accounts.push(serde_json::from_slice(&value).map_err(backend)?);
        }
        Ok(accounts)
    }
}

#[async_trait]
impl DeadLetterSink for RocksDBStore {
    async fn record(&self, record: DeadLetterRecord) -> std::result::Result<(), SinkFault> {
        let cf = self
            .db
            .cf_handle(CF_DEAD_LETTERS)
            .ok_or_else(|| SinkFault(format!("{CF_DEAD_LETTERS} column family not found")))?;

        // Timestamp-prefixed keys keep iteration in arrival order.
        let key = format!(
            "{:020}-{}",
            record.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            record.message.id
        );
        let value = serde_json::to_vec(&record)
            .map_err(|e| SinkFault(format!("serialization error: {e}")))?;

        self.db
            .put_cf(&cf, key.as_bytes(), value)
            .map_err(|e| SinkFault(format!("RocksDB write error: {e}")))
    }
}

use crate::domain::account::Balance;
use crate::domain::classifier::classify;
use crate::domain::message::{DeadLetterRecord, FailureKind, RawMessage};
use crate::domain::ports::{
    BalanceStore, BalanceStoreBox, DeadLetterSink, DeadLetterSinkRef, Sleeper, SleeperRef,
};
use crate::domain::request::FundsMovementRequest;
use crate::domain::retry::{NextDelay, RetryScheduler};
use crate::error::StorageFault;
use tracing::{error, info, warn};

/// Terminal result of processing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied {
        account_id: String,
        new_balance: Balance,
    },
    /// The target account does not exist. Nothing was written or dead-lettered.
    Skipped { account_id: String },
    DeadLettered { kind: FailureKind, reason: String },
}

enum WorkflowState {
    Classifying,
    Updating {
        request: FundsMovementRequest,
        attempt: usize,
    },
    DeadLettering {
        kind: FailureKind,
        reason: String,
    },
    Done(Outcome),
}

enum UpdateResult {
    Applied(Balance),
    AccountNotFound,
}

/// Drives one message through classification, the balance update with its
/// retries, and dead-lettering.
///
/// A storage fault on attempt `n` suspends for the `n`th delay of the
/// [`RetryScheduler`] schedule. The account is re-read on every attempt, so a
/// write is never based on a balance read before a backoff. Once every slot of
/// the schedule has been used the message is dead-lettered.
pub struct BalanceUpdateWorkflow {
    store: BalanceStoreBox,
    sink: DeadLetterSinkRef,
    sleeper: SleeperRef,
    scheduler: RetryScheduler,
}

impl BalanceUpdateWorkflow {
    pub fn new(store: BalanceStoreBox, sink: DeadLetterSinkRef, sleeper: SleeperRef) -> Self {
        Self {
            store,
            sink,
            sleeper,
            scheduler: RetryScheduler::new(),
        }
    }

    pub fn store(&self) -> &dyn BalanceStore {
        self.store.as_ref()
    }

    pub async fn process(&self, message: &RawMessage) -> Outcome {
        let mut state = WorkflowState::Classifying;

        loop {
            state = match state {
                WorkflowState::Classifying => match classify(&message.body) {
                    Ok(request) => WorkflowState::Updating {
                        request,
                        attempt: 0,
                    },
                    Err(e) => {
                        warn!(error = %e, body = %message.body_text(), "Rejecting message");
                        WorkflowState::DeadLettering {
                            kind: FailureKind::from(&e),
                            reason: e.to_string(),
                        }
                    }
                },
                WorkflowState::Updating { request, attempt } => {
                    match self.try_update(&request).await {
                        Ok(UpdateResult::Applied(new_balance)) => {
                            WorkflowState::Done(Outcome::Applied {
                                account_id: request.account_id().to_string(),
                                new_balance,
                            })
                        }
                        Ok(UpdateResult::AccountNotFound) => WorkflowState::Done(Outcome::Skipped {
                            account_id: request.account_id().to_string(),
                        }),
                        Err(fault) => {
                            if let NextDelay::After(delay) = self.scheduler.next_delay(attempt) {
                                error!(
                                    error = %fault,
                                    attempt,
                                    delay_secs = delay.as_secs(),
                                    "Error updating balance"
                                );
                                self.sleeper.sleep(delay).await;
                            }
                            if attempt + 1 < self.scheduler.max_retries() {
                                WorkflowState::Updating {
                                    request,
                                    attempt: attempt + 1,
                                }
                            } else {
                                error!(
                                    error = %fault,
                                    attempts = attempt + 1,
                                    "Balance update failed after all retries"
                                );
                                WorkflowState::DeadLettering {
                                    kind: FailureKind::StorageExhausted,
                                    reason: fault.to_string(),
                                }
                            }
                        }
                    }
                }
                WorkflowState::DeadLettering { kind, reason } => {
                    self.dead_letter(message, kind, &reason).await;
                    WorkflowState::Done(Outcome::DeadLettered { kind, reason })
                }
                WorkflowState::Done(outcome) => return outcome,
            };
        }
    }

    /// Hands `message` to the dead-letter sink. Sink failures are logged and
    /// reported as `false`, never propagated.
    pub async fn dead_letter(&self, message: &RawMessage, kind: FailureKind, reason: &str) -> bool {
        let record = DeadLetterRecord::new(message.clone(), kind, reason);
        match self.sink.record(record).await {
            Ok(()) => {
                info!(%kind, reason, "Moved message to dead-letter");
                true
            }
            Err(e) => {
                error!(error = %e, %kind, reason, "Failed to dead-letter message");
                false
            }
        }
    }

    async fn try_update(
        &self,
        request: &FundsMovementRequest,
    ) -> Result<UpdateResult, StorageFault> {
        let account_id = request.account_id();
        let Some(account) = self.store.read_balance(account_id).await? else {
            warn!(account_id, "Bank account not found");
            return Ok(UpdateResult::AccountNotFound);
        };

        let new_balance = request.apply_to(account.balance);
        if new_balance.is_negative() {
            warn!(
                account_id,
                balance = %new_balance,
                "Debit leaves account overdrawn"
            );
        }

        self.store
            .conditional_update(account_id, account.version, new_balance)
            .await?;

        info!(
            account_id,
            direction = %request.direction(),
            amount = %request.amount().value(),
            balance = %new_balance,
            "Updated balance"
        );
        Ok(UpdateResult::Applied(new_balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::BankAccount;
    use crate::error::SinkFault;
    use crate::infrastructure::in_memory::{InMemoryBalanceStore, InMemoryDeadLetterSink};
    use crate::infrastructure::sleeper::RecordingSleeper;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Wraps the in-memory store, failing the first `failures` update attempts
    /// and logging every call.
    #[derive(Clone, Default)]
    struct ScriptedStore {
        inner: InMemoryBalanceStore,
        failures: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
        updates: Arc<Mutex<Vec<(String, Balance)>>>,
    }

    impl ScriptedStore {
        async fn with_account(id: &str, balance: Balance, failures: usize) -> Self {
            let store = Self::default();
            store
                .inner
                .insert_account(BankAccount::new(id, balance))
                .await;
            store.failures.store(failures, Ordering::SeqCst);
            store
        }

        fn updates(&self) -> Vec<(String, Balance)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BalanceStore for ScriptedStore {
        async fn read_balance(
            &self,
            account_id: &str,
        ) -> Result<Option<BankAccount>, StorageFault> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_balance(account_id).await
        }

        async fn conditional_update(
            &self,
            account_id: &str,
            expected_version: u64,
            new_balance: Balance,
        ) -> Result<(), StorageFault> {
            self.updates
                .lock()
                .unwrap()
                .push((account_id.to_string(), new_balance));
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageFault::Unavailable("table locked".to_string()));
            }
            self.inner
                .conditional_update(account_id, expected_version, new_balance)
                .await
        }

        async fn list_accounts(&self) -> Result<Vec<BankAccount>, StorageFault> {
            self.inner.list_accounts().await
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl DeadLetterSink for BrokenSink {
        async fn record(&self, _record: DeadLetterRecord) -> Result<(), SinkFault> {
            Err(SinkFault("disk full".to_string()))
        }
    }

    fn workflow(
        store: &ScriptedStore,
        sink: &InMemoryDeadLetterSink,
        sleeper: &RecordingSleeper,
    ) -> BalanceUpdateWorkflow {
        BalanceUpdateWorkflow::new(
            Box::new(store.clone()),
            Arc::new(sink.clone()),
            Arc::new(sleeper.clone()),
        )
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|&s| Duration::from_secs(s)).collect()
    }

    #[tokio::test]
    async fn test_credit_applies_sum() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 0).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Credit","bankAccountId":"A1","amount":50}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert_eq!(
            outcome,
            Outcome::Applied {
                account_id: "A1".to_string(),
                new_balance: Balance::new(dec!(150)),
            }
        );
        assert_eq!(
            store.updates(),
            vec![("A1".to_string(), Balance::new(dec!(150)))]
        );
        assert!(sink.records().await.is_empty());
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_debit_goes_negative_without_clamping() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(20)), 0).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Debit","bankAccountId":"A1","amount":75.5}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert!(matches!(outcome, Outcome::Applied { .. }));
        let account = store.inner.read_balance("A1").await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(-55.5)));
    }

    #[tokio::test]
    async fn test_unknown_type_dead_letters_without_touching_store() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 0).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Wire","bankAccountId":"A1","amount":50}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert!(matches!(
            outcome,
            Outcome::DeadLettered {
                kind: FailureKind::UnknownMessageType,
                ..
            }
        ));
        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, FailureKind::UnknownMessageType);
        assert_eq!(records[0].message, message);
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payloads_dead_letter_once_each() {
        let payloads = [
            "{not json",
            r#"{"messageType":"Credit","bankAccountId":"A1"}"#,
            r#"{"messageType":"Debit","bankAccountId":"A1","amount":"ten"}"#,
            r#"{"messageType":"Debit","bankAccountId":"A1","amount":0}"#,
        ];

        for payload in payloads {
            let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 0).await;
            let sink = InMemoryDeadLetterSink::new();
            let sleeper = RecordingSleeper::new();

            let outcome = workflow(&store, &sink, &sleeper)
                .process(&RawMessage::new(payload))
                .await;

            assert!(
                matches!(
                    outcome,
                    Outcome::DeadLettered {
                        kind: FailureKind::MalformedPayload,
                        ..
                    }
                ),
                "payload {payload} gave {outcome:?}"
            );
            assert_eq!(sink.records().await.len(), 1);
            assert!(store.updates().is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_account_is_skipped() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 0).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Credit","bankAccountId":"A9","amount":5}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert_eq!(
            outcome,
            Outcome::Skipped {
                account_id: "A9".to_string()
            }
        );
        assert!(store.updates().is_empty());
        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 2).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Credit","bankAccountId":"A1","amount":50}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert!(matches!(outcome, Outcome::Applied { .. }));
        assert_eq!(sleeper.delays(), secs(&[5, 25]));
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
        assert_eq!(store.updates().len(), 3);
        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), usize::MAX).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Debit","bankAccountId":"A1","amount":50}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert!(matches!(
            outcome,
            Outcome::DeadLettered {
                kind: FailureKind::StorageExhausted,
                ..
            }
        ));
        assert_eq!(sleeper.delays(), secs(&[5, 25, 125]));
        assert_eq!(store.updates().len(), 3);

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].reason.contains("table locked"));

        let account = store.inner.read_balance("A1").await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_three_failures_exhaust_the_schedule() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 3).await;
        let sink = InMemoryDeadLetterSink::new();
        let sleeper = RecordingSleeper::new();

        let message = RawMessage::new(r#"{"messageType":"Credit","bankAccountId":"A1","amount":50}"#);
        let outcome = workflow(&store, &sink, &sleeper).process(&message).await;

        assert!(matches!(
            outcome,
            Outcome::DeadLettered {
                kind: FailureKind::StorageExhausted,
                ..
            }
        ));
        assert_eq!(store.updates().len(), 3);
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
        assert_eq!(sink.records().await.len(), 1);

        let account = store.inner.read_balance("A1").await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(100)));
        assert_eq!(account.version, 0);
    }

    /// Store where another writer changes the account right before the
    /// worker's first write lands.
    #[derive(Clone)]
    struct ContendedStore {
        inner: InMemoryBalanceStore,
        interfered: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BalanceStore for ContendedStore {
        async fn read_balance(
            &self,
            account_id: &str,
        ) -> Result<Option<BankAccount>, StorageFault> {
            self.inner.read_balance(account_id).await
        }

        async fn conditional_update(
            &self,
            account_id: &str,
            expected_version: u64,
            new_balance: Balance,
        ) -> Result<(), StorageFault> {
            if self.interfered.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner
                    .conditional_update(account_id, expected_version, Balance::new(dec!(200)))
                    .await?;
            }
            self.inner
                .conditional_update(account_id, expected_version, new_balance)
                .await
        }

        async fn list_accounts(&self) -> Result<Vec<BankAccount>, StorageFault> {
            self.inner.list_accounts().await
        }
    }

    #[tokio::test]
    async fn test_conflicting_write_is_retried_on_fresh_balance() {
        let inner = InMemoryBalanceStore::new();
        inner
            .insert_account(BankAccount::new("A1", Balance::new(dec!(100))))
            .await;
        let store = ContendedStore {
            inner: inner.clone(),
            interfered: Arc::new(AtomicUsize::new(0)),
        };
        let sleeper = RecordingSleeper::new();
        let workflow = BalanceUpdateWorkflow::new(
            Box::new(store),
            Arc::new(InMemoryDeadLetterSink::new()),
            Arc::new(sleeper.clone()),
        );

        let message = RawMessage::new(r#"{"messageType":"Credit","bankAccountId":"A1","amount":50}"#);
        let outcome = workflow.process(&message).await;

        assert_eq!(
            outcome,
            Outcome::Applied {
                account_id: "A1".to_string(),
                new_balance: Balance::new(dec!(250)),
            }
        );
        assert_eq!(sleeper.delays(), secs(&[5]));
        let account = inner.read_balance("A1").await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(250)));
        assert_eq!(account.version, 2);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let store = ScriptedStore::with_account("A1", Balance::new(dec!(100)), 0).await;
        let workflow = BalanceUpdateWorkflow::new(
            Box::new(store.clone()),
            Arc::new(BrokenSink),
            Arc::new(RecordingSleeper::new()),
        );

        let message = RawMessage::new("garbage");
        let outcome = workflow.process(&message).await;

        assert!(matches!(
            outcome,
            Outcome::DeadLettered {
                kind: FailureKind::MalformedPayload,
                ..
            }
        ));
        assert!(
            !workflow
                .dead_letter(&message, FailureKind::MalformedPayload, "again")
                .await
        );
    }
}

use super::workflow::{BalanceUpdateWorkflow, Outcome};
use crate::domain::message::{FailureKind, RawMessage};
use crate::domain::ports::{MessageQueue, MessageQueueBox, Sleeper, SleeperRef};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::thread;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing knobs for the consumption loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Pause after an empty peek or a transport error.
    pub idle_interval: Duration,
    /// How long a received message stays locked to this worker. The lock is
    /// renewed every half timeout while the workflow runs.
    pub lock_timeout: Duration,
    /// Deliveries allowed before a message is dead-lettered unprocessed.
    pub max_delivery_count: u32,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(10),
            max_delivery_count: 10,
        }
    }
}

/// Counters accumulated over the lifetime of a loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub applied: u64,
    pub skipped: u64,
    pub dead_lettered: u64,
    pub unanticipated: u64,
    pub completed: u64,
    pub completion_failures: u64,
    pub transport_errors: u64,
    pub idle_polls: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Applied { .. } => self.applied += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::DeadLettered { .. } => self.dead_lettered += 1,
        }
    }
}

enum Cycle {
    Idle,
    Handled,
}

/// Single-worker peek-lock consumer.
///
/// Messages are handled strictly one at a time. Every received message is
/// completed exactly once after the workflow returns, whatever the outcome,
/// including when the workflow panics.
pub struct ConsumptionLoop {
    queue: MessageQueueBox,
    workflow: BalanceUpdateWorkflow,
    sleeper: SleeperRef,
    settings: ConsumerSettings,
    stats: ConsumerStats,
}

impl ConsumptionLoop {
    pub fn new(
        queue: MessageQueueBox,
        workflow: BalanceUpdateWorkflow,
        sleeper: SleeperRef,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            workflow,
            sleeper,
            settings,
            stats: ConsumerStats::default(),
        }
    }

    pub fn workflow(&self) -> &BalanceUpdateWorkflow {
        &self.workflow
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Polls until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between messages and during idle waits; a
    /// message already received is always processed and completed first.
    pub async fn run(&mut self, shutdown: CancellationToken) -> ConsumerStats {
        info!("Consumption loop started");

        while !shutdown.is_cancelled() {
            if let Cycle::Idle = self.cycle().await {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = self.sleeper.sleep(self.settings.idle_interval) => {}
                }
            }
        }

        info!(stats = ?self.stats, "Consumption loop stopped");
        self.stats.clone()
    }

    /// Processes messages until the first cycle that finds nothing to do.
    pub async fn drain(&mut self) -> ConsumerStats {
        while let Cycle::Handled = self.cycle().await {}
        self.stats.clone()
    }

    async fn cycle(&mut self) -> Cycle {
        match self.queue.peek(1).await {
            Ok(peeked) if peeked.is_empty() => {
                info!(
                    idle_secs = self.settings.idle_interval.as_secs(),
                    "No messages found in the queue"
                );
                self.stats.idle_polls += 1;
                return Cycle::Idle;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to peek queue");
                self.stats.transport_errors += 1;
                return Cycle::Idle;
            }
        }

        let messages = match self.queue.receive(1, self.settings.lock_timeout).await {
            Ok(messages) if !messages.is_empty() => messages,
            Ok(_) => {
                debug!("Peeked message was taken by another consumer");
                self.stats.idle_polls += 1;
                return Cycle::Idle;
            }
            Err(e) => {
                error!(error = %e, "Failed to receive from queue");
                self.stats.transport_errors += 1;
                return Cycle::Idle;
            }
        };

        for message in messages {
            self.handle(message).await;
        }
        Cycle::Handled
    }

    #[tracing::instrument(
        skip_all,
        fields(message_id = %message.id, delivery_count = message.delivery_count)
    )]
    async fn handle(&mut self, message: RawMessage) {
        self.stats.received += 1;
        info!(body = %message.body_text(), "Received message");

        if message.delivery_count > self.settings.max_delivery_count {
            let reason = format!(
                "delivered {} times, limit is {}",
                message.delivery_count, self.settings.max_delivery_count
            );
            warn!(reason = %reason, "Delivery limit exceeded");
            self.stats.dead_lettered += 1;
            self.workflow
                .dead_letter(&message, FailureKind::DeliveryLimitExceeded, &reason)
                .await;
        } else {
            match self.process_locked(&message).await {
                Ok(outcome) => {
                    debug!(?outcome, "Workflow finished");
                    self.stats.record(&outcome);
                }
                Err(panic) => {
                    let reason =
                        format!("unanticipated fault: {}", panic_message(panic.as_ref()));
                    error!(reason = %reason, "Workflow aborted");
                    self.stats.unanticipated += 1;
                    self.workflow
                        .dead_letter(&message, FailureKind::Unanticipated, &reason)
                        .await;
                }
            }
        }

        match self.queue.complete(&message).await {
            Ok(()) => self.stats.completed += 1,
            Err(e) => {
                warn!(error = %e, "Failed to complete message");
                self.stats.completion_failures += 1;
            }
        }
    }

    /// Runs the workflow for `message`, renewing its lock until the workflow
    /// returns so retry backoffs cannot outlast it.
    async fn process_locked(&self, message: &RawMessage) -> thread::Result<Outcome> {
        let work = AssertUnwindSafe(self.workflow.process(message)).catch_unwind();
        tokio::pin!(work);

        let period = (self.settings.lock_timeout / 2).max(Duration::from_millis(1));
        let mut renewal = tokio::time::interval_at(Instant::now() + period, period);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut lock_held = true;

        loop {
            tokio::select! {
                biased;
                result = &mut work => return result,
                _ = renewal.tick(), if lock_held => {
                    match self.queue.renew_lock(message, self.settings.lock_timeout).await {
                        Ok(()) => debug!("Renewed message lock"),
                        Err(e) => {
                            warn!(error = %e, "Failed to renew message lock");
                            lock_held = false;
                        }
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

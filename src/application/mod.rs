//! Application layer containing the message-processing orchestration.
//!
//! `BalanceUpdateWorkflow` handles one message from classification to its
//! terminal outcome; `ConsumptionLoop` owns the peek-lock protocol and feeds
//! the workflow one message at a time.

pub mod consumer;
pub mod workflow;

//! Domain layer: funds-movement types, the payload classifier, the retry
//! policy and the capability ports the application layer depends on.

pub mod account;
pub mod classifier;
pub mod message;
pub mod ports;
pub mod request;
pub mod retry;

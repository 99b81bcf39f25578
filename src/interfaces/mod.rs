//! File formats used to seed and report on the worker from the command line.

pub mod csv;
pub mod jsonl;

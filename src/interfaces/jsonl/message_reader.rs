use crate::error::Result;
use std::io::BufRead;

/// Reads queue payloads from a JSON-lines source, one message body per line.
///
/// Lines are passed through untouched, so malformed payloads reach the queue
/// and are rejected by the worker like any other bad message. Blank lines are
/// skipped.
pub struct MessageReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> MessageReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn bodies(self) -> impl Iterator<Item = Result<String>> {
        self.source
            .lines()
            .filter(|line| !matches!(line, Ok(text) if text.trim().is_empty()))
            .map(|line| Ok(line?))
    }
}

use crate::domain::account::{Balance, BankAccount};
use crate::error::{Result, WorkerError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct AccountRow {
    id: String,
    balance: Decimal,
}

/// Reads opening balances from a CSV source with an `id,balance` header.
///
/// Whitespace around fields is trimmed, mirroring hand-edited fixture files.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes accounts.
    pub fn accounts(self) -> impl Iterator<Item = Result<BankAccount>> {
        self.reader.into_deserialize().map(|result| {
            let row: AccountRow = result.map_err(WorkerError::from)?;
            if row.id.is_empty() {
                return Err(WorkerError::ValidationError(
                    "account id must not be empty".to_string(),
                ));
            }
            Ok(BankAccount::new(row.id, Balance::new(row.balance)))
        })
    }
}

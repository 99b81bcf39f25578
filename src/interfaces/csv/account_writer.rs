use crate::domain::account::BankAccount;
use crate::error::Result;
use std::io::Write;

/// Writes account balances as CSV with an `id,balance` header.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(
        &mut self,
        accounts: impl IntoIterator<Item = BankAccount>,
    ) -> Result<()> {
        self.writer.write_record(["id", "balance"])?;
        for account in accounts {
            self.writer
                .write_record([account.id, account.balance.to_string()])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

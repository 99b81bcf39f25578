use crate::domain::message::DeadLetterRecord;
use crate::domain::ports::DeadLetterSink;
use crate::error::{Result, SinkFault};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends dead-letter records to a file, one JSON document per line.
pub struct JsonlDeadLetterSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlDeadLetterSink {
    /// Opens `path` for appending, creating it if missing.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeadLetterSink for JsonlDeadLetterSink {
    async fn record(&self, record: DeadLetterRecord) -> std::result::Result<(), SinkFault> {
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| SinkFault(format!("serialization error: {e}")))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| SinkFault(format!("{}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| SinkFault(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}

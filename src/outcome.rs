//! Outcome log for completed games
//!
//! Game workers call [`OutcomeLog::append`] exactly once per game. The file
//! implementation serializes "format, append, flush" under one mutex so
//! concurrent workers never interleave records.

use crate::error::{ChanceItError, Result};
use crate::types::{OutcomeRecord, OUTCOME_LOG_HEADER};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Append-only sink for outcome records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeLog: Send + Sync {
    /// Append one record
    async fn append(&self, record: &OutcomeRecord) -> Result<()>;
}

/// Comma-delimited outcome log file
pub struct CsvOutcomeLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvOutcomeLog {
    /// Open (or create) the log, writing the header if the file is empty
    pub async fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ChanceItError::OutcomeLog {
                message: format!("Failed to open {}: {}", path.display(), e),
            })?;

        if file.metadata().await?.len() == 0 {
            file.write_all(format!("{}\n", OUTCOME_LOG_HEADER).as_bytes())
                .await?;
            file.flush().await?;
        }

        info!("Logging outcomes to: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutcomeLog for CsvOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<()> {
        let mut file = self.file.lock().await;
        let line = format!("{}\n", record.to_log_line());
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ChanceItError::OutcomeLog {
                message: format!("Failed to append to {}: {}", self.path.display(), e),
            })?;
        file.flush().await?;
        debug!("Appended outcome for game {}", record.game_id);
        Ok(())
    }
}

/// In-memory outcome log, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryOutcomeLog {
    records: std::sync::Mutex<Vec<OutcomeRecord>>,
}

impl MemoryOutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All appended records
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OutcomeLog for MemoryOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<()> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}

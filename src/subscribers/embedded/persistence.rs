//! # PersistenceLogger: append-only lifecycle log.
//!
//! Appends every [`LifecycleRecord`] as one JSON line to
//! `<dir>/events_YYYYMMDD.log`, the date taken from the record timestamp (UTC).
//!
//! Persistence is diagnostic: a failed write is logged at `error` and
//! otherwise ignored. It never affects event status and never reaches callers.
//!
//! ## Example line
//! ```text
//! {"event_id":"8c1d…","event_type":"send.wechat.message","action":"completed",
//!  "timestamp":"2025-03-02T10:15:04.120Z","correlation_id":null,"source":"notify",
//!  "worker_id":"worker-1","error":null,"retry_count":0,"priority":"NORMAL","status":"completed"}
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::events::LifecycleRecord;
use crate::subscribers::Subscribe;

/// Writes lifecycle records to per-day JSON-lines files.
#[derive(Debug, Clone)]
pub struct PersistenceLogger {
    dir: PathBuf,
}

impl PersistenceLogger {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the log files live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the log directory (and parents) if missing.
    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// File a record lands in.
    pub fn file_for(&self, record: &LifecycleRecord) -> PathBuf {
        self.dir
            .join(format!("events_{}.log", record.timestamp.format("%Y%m%d")))
    }

    async fn append(&self, record: &LifecycleRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(record))
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }
}

#[async_trait]
impl Subscribe for PersistenceLogger {
    async fn on_record(&self, record: &LifecycleRecord) {
        if let Err(e) = self.append(record).await {
            tracing::error!(
                dir = %self.dir.display(),
                event_id = %record.event_id,
                error = %e,
                "failed to persist lifecycle record"
            );
        }
    }

    fn name(&self) -> &'static str {
        "persistence"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}

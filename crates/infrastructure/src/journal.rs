//! Append-only state journal implementations.
//!
//! Every mutation of the in-memory tables is appended here before it is
//! applied, so a crashed domain can rebuild its task/tenant/node tables and
//! checkpoint index by replaying the log in order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use fairsched_core::models::JournalRecord;
use fairsched_core::traits::StateJournal;
use fairsched_core::{SchedulerError, SchedulerResult};

/// JSON-lines journal backed by a single file.
///
/// Records are serialized one per line. Appends are serialized through a
/// mutex so interleaved writers cannot tear lines.
pub struct FileStateJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileStateJournal {
    pub async fn open(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
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
impl StateJournal for FileStateJournal {
    async fn append(&self, record: &JournalRecord) -> SchedulerResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(record.id = %record.id, "journal record appended");
        Ok(())
    }

    async fn replay(&self) -> SchedulerResult<Vec<JournalRecord>> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A torn tail line from a crash mid-append is expected;
                    // anything after it cannot be trusted either.
                    warn!(error = %e, "journal replay stopped at unparsable line");
                    break;
                }
            }
        }

        Ok(records)
    }
}

/// In-memory journal for tests and embedded runs.
#[derive(Default)]
pub struct InMemoryStateJournal {
    records: Mutex<Vec<JournalRecord>>,
}

impl InMemoryStateJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateJournal for InMemoryStateJournal {
    async fn append(&self, record: &JournalRecord) -> SchedulerResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn replay(&self) -> SchedulerResult<Vec<JournalRecord>> {
        Ok(self.records.lock().await.clone())
    }
}

/// Journal that fails every append, for exercising storage-unavailable paths.
#[derive(Default)]
pub struct FailingStateJournal;

#[async_trait]
impl StateJournal for FailingStateJournal {
    async fn append(&self, _record: &JournalRecord) -> SchedulerResult<()> {
        Err(SchedulerError::StorageUnavailable(
            "journal backend unavailable".to_string(),
        ))
    }

    async fn replay(&self) -> SchedulerResult<Vec<JournalRecord>> {
        Ok(Vec::new())
    }
}

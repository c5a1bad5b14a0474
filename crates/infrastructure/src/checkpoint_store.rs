//! Checkpoint blob stores.
//!
//! Checkpoints are immutable once written: a `put` with an already-used
//! sequence number is rejected rather than overwritten. Integrity is a
//! SHA-256 digest of the payload recorded at write time; verification is the
//! recovery path's responsibility when it fetches the blob back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use fairsched_core::models::{BlobRef, Checkpoint};
use fairsched_core::traits::CheckpointStore;
use fairsched_core::{SchedulerError, SchedulerResult};

pub fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// In-memory checkpoint store for tests and embedded runs.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    // task id -> sequence -> (metadata, payload)
    blobs: RwLock<BTreeMap<i64, BTreeMap<u64, (Checkpoint, Vec<u8>)>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip bytes of a stored payload without touching its recorded hash.
    /// Test hook for exercising integrity-verification fallback.
    pub async fn corrupt(&self, task_id: i64, sequence: u64) -> bool {
        let mut blobs = self.blobs.write().await;
        if let Some((_, payload)) = blobs
            .get_mut(&task_id)
            .and_then(|per_task| per_task.get_mut(&sequence))
        {
            for byte in payload.iter_mut() {
                *byte = !*byte;
            }
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(
        &self,
        task_id: i64,
        sequence: u64,
        payload: &[u8],
    ) -> SchedulerResult<Checkpoint> {
        let mut blobs = self.blobs.write().await;
        let per_task = blobs.entry(task_id).or_default();
        if per_task.contains_key(&sequence) {
            return Err(SchedulerError::Internal(format!(
                "checkpoint {task_id}/{sequence} already exists"
            )));
        }

        let checkpoint = Checkpoint {
            task_id,
            sequence,
            blob: BlobRef {
                location: format!("mem://checkpoints/{task_id}/{sequence}"),
                size_bytes: payload.len() as u64,
                sha256: sha256_hex(payload),
            },
            created_at: Utc::now(),
        };
        per_task.insert(sequence, (checkpoint.clone(), payload.to_vec()));

        debug!(task.id = task_id, sequence, "checkpoint stored");
        Ok(checkpoint)
    }

    async fn fetch(&self, checkpoint: &Checkpoint) -> SchedulerResult<Vec<u8>> {
        let blobs = self.blobs.read().await;
        blobs
            .get(&checkpoint.task_id)
            .and_then(|per_task| per_task.get(&checkpoint.sequence))
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| {
                SchedulerError::StorageUnavailable(format!(
                    "checkpoint {}/{} not found",
                    checkpoint.task_id, checkpoint.sequence
                ))
            })
    }

    async fn list(&self, task_id: i64) -> SchedulerResult<Vec<Checkpoint>> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .get(&task_id)
            .map(|per_task| per_task.values().map(|(cp, _)| cp.clone()).collect())
            .unwrap_or_default())
    }

    async fn remove(&self, task_id: i64, sequence: u64) -> SchedulerResult<()> {
        let mut blobs = self.blobs.write().await;
        if let Some(per_task) = blobs.get_mut(&task_id) {
            per_task.remove(&sequence);
        }
        Ok(())
    }
}

/// Filesystem checkpoint store: one file per (task, sequence).
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    pub async fn open(directory: impl AsRef<Path>) -> SchedulerResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    fn blob_path(&self, task_id: i64, sequence: u64) -> PathBuf {
        self.directory.join(format!("task-{task_id}"))
            .join(format!("seq-{sequence:010}.ckpt"))
    }

    fn meta_path(&self, task_id: i64, sequence: u64) -> PathBuf {
        self.directory.join(format!("task-{task_id}"))
            .join(format!("seq-{sequence:010}.meta.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn put(
        &self,
        task_id: i64,
        sequence: u64,
        payload: &[u8],
    ) -> SchedulerResult<Checkpoint> {
        let blob_path = self.blob_path(task_id, sequence);
        if tokio::fs::try_exists(&blob_path).await? {
            return Err(SchedulerError::Internal(format!(
                "checkpoint {task_id}/{sequence} already exists"
            )));
        }
        if let Some(parent) = blob_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let checkpoint = Checkpoint {
            task_id,
            sequence,
            blob: BlobRef {
                location: blob_path.to_string_lossy().into_owned(),
                size_bytes: payload.len() as u64,
                sha256: sha256_hex(payload),
            },
            created_at: Utc::now(),
        };

        tokio::fs::write(&blob_path, payload).await?;
        tokio::fs::write(
            self.meta_path(task_id, sequence),
            serde_json::to_vec(&checkpoint)?,
        )
        .await?;

        info!(
            task.id = task_id,
            sequence,
            size_bytes = payload.len(),
            "checkpoint written to disk"
        );
        Ok(checkpoint)
    }

    async fn fetch(&self, checkpoint: &Checkpoint) -> SchedulerResult<Vec<u8>> {
        let path = self.blob_path(checkpoint.task_id, checkpoint.sequence);
        tokio::fs::read(&path).await.map_err(|e| {
            SchedulerError::StorageUnavailable(format!(
                "checkpoint {}/{} unreadable: {e}",
                checkpoint.task_id, checkpoint.sequence
            ))
        })
    }

    async fn list(&self, task_id: i64) -> SchedulerResult<Vec<Checkpoint>> {
        let dir = self.directory.join(format!("task-{task_id}"));
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut checkpoints = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".meta.json") {
                let content = tokio::fs::read(entry.path()).await?;
                let checkpoint: Checkpoint = serde_json::from_slice(&content)?;
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by_key(|cp| cp.sequence);
        Ok(checkpoints)
    }

    async fn remove(&self, task_id: i64, sequence: u64) -> SchedulerResult<()> {
        let blob_path = self.blob_path(task_id, sequence);
        let meta_path = self.meta_path(task_id, sequence);
        if tokio::fs::try_exists(&blob_path).await? {
            tokio::fs::remove_file(&blob_path).await?;
        }
        if tokio::fs::try_exists(&meta_path).await? {
            tokio::fs::remove_file(&meta_path).await?;
        }
        debug!(task.id = task_id, sequence, "checkpoint pruned");
        Ok(())
    }
}

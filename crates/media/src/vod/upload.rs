// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded upload worker pool.
//!
//! Segment uploads queue into a bounded channel; a pump task runs them under
//! a concurrency cap with linear-backoff retries. Queue overflow surfaces
//! [`QueueFull`] to the caller, which logs and moves on — losing a segment
//! upload is preferable to stalling the encoder pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::storage::Storage;

/// Queue capacity: ≈200 segments of headroom.
pub const QUEUE_CAP: usize = 200;

/// Retries per task after the first attempt.
const MAX_RETRIES: u32 = 3;

/// Linear backoff step between attempts.
const RETRY_BASE: Duration = Duration::from_millis(500);

/// The upload queue is full.
#[derive(Debug)]
pub struct QueueFull;

impl std::fmt::Display for QueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("upload queue full")
    }
}

impl std::error::Error for QueueFull {}

/// One queued upload.
#[derive(Debug)]
pub struct UploadJob {
    pub room_id: String,
    pub segment_index: u32,
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// Completion report delivered back to the VOD manager.
#[derive(Debug)]
pub struct UploadOutcome {
    pub room_id: String,
    pub segment_index: u32,
    pub remote_key: String,
    pub success: bool,
}

#[derive(Clone)]
pub struct UploadPool {
    queue_tx: mpsc::Sender<UploadJob>,
}

impl UploadPool {
    /// Spawn the pump and return the enqueue handle. Outcomes stream to
    /// `outcome_tx` in completion order.
    pub fn spawn(
        storage: Storage,
        workers: usize,
        outcome_tx: mpsc::Sender<UploadOutcome>,
        shutdown: CancellationToken,
    ) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::channel::<UploadJob>(QUEUE_CAP);
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));

        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    job = queue_rx.recv() => {
                        let Some(job) = job else { break };
                        job
                    }
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else { break };
                let storage = storage.clone();
                let outcome_tx = outcome_tx.clone();
                tokio::spawn(async move {
                    let success = upload_with_retry(&storage, &job).await;
                    let _ = outcome_tx
                        .send(UploadOutcome {
                            room_id: job.room_id,
                            segment_index: job.segment_index,
                            remote_key: job.remote_key,
                            success,
                        })
                        .await;
                    drop(permit);
                });
            }
            debug!("upload pool stopped");
        });

        Self { queue_tx }
    }

    /// Queue a job without blocking.
    pub fn enqueue(&self, job: UploadJob) -> Result<(), QueueFull> {
        self.queue_tx.try_send(job).map_err(|_| QueueFull)
    }
}

async fn upload_with_retry(storage: &Storage, job: &UploadJob) -> bool {
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(RETRY_BASE * attempt).await;
        }
        match storage.put_file(&job.local_path, &job.remote_key).await {
            Ok(()) => return true,
            Err(e) if attempt == MAX_RETRIES => {
                warn!(
                    key = %job.remote_key,
                    attempts = MAX_RETRIES + 1,
                    err = %e,
                    "segment upload failed permanently"
                );
            }
            Err(e) => {
                debug!(key = %job.remote_key, attempt, err = %e, "segment upload retry");
            }
        }
    }
    false
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;

//! Synchronization orchestrator
//!
//! Drains the offline queue into one batch payload and reconciles the
//! reply. Commit is all-or-nothing at the batch level: records are deleted
//! only after a fully successful batch; any reported failure or transport
//! problem keeps every record queued for the next explicit run. No scoring
//! logic lives here.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{StorageRecord, StorageStore};
use crate::remote::RemoteService;
use crate::{Error, Result};

/// Fixed literal the service replies with on full batch success
pub const BATCH_SUCCESS_REPLY: &str = "ok";
/// Separator between per-residence failure messages in the reply
pub const FAILURE_SEPARATOR: char = '£';

/// Batch payload: residence id to its full snapshot plus metadata
pub type BatchPayload = BTreeMap<String, StorageRecord>;

/// Outcome of one synchronization run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was queued
    Empty,
    /// Every record was accepted and the queue was cleared
    Synchronized { count: usize },
    /// The batch did not fully succeed; every record stays queued and the
    /// message carries all reported failures, newline-joined
    Failed { message: String },
}

/// Drains the queue and submits it as a single request
pub struct SyncOrchestrator<R: RemoteService> {
    storage: StorageStore,
    remote: Arc<R>,
}

impl<R: RemoteService> SyncOrchestrator<R> {
    pub fn new(storage: StorageStore, remote: Arc<R>) -> Self {
        Self { storage, remote }
    }

    /// Run one synchronization pass
    pub async fn synchronize(&self) -> Result<SyncOutcome> {
        let records = self.storage.drain_all().await?;
        if records.is_empty() {
            return Ok(SyncOutcome::Empty);
        }

        let count = records.len();
        let residence_ids: Vec<String> =
            records.iter().map(|r| r.residence_id.clone()).collect();
        let payload: BatchPayload = records
            .into_iter()
            .map(|r| (r.residence_id.clone(), r))
            .collect();

        info!(residences = count, "Submitting synchronization batch");

        match self.remote.submit_batch(&payload).await {
            Ok(reply) if reply.trim() == BATCH_SUCCESS_REPLY => {
                self.storage.delete_many(&residence_ids).await?;
                info!(residences = count, "Synchronization batch accepted");
                Ok(SyncOutcome::Synchronized { count })
            }
            Ok(reply) => {
                let message = join_failures(&reply);
                warn!("Synchronization batch reported failures, keeping queue");
                Ok(SyncOutcome::Failed { message })
            }
            Err(Error::Rejected(reply)) => {
                let message = join_failures(&reply);
                warn!("Synchronization batch rejected, keeping queue");
                Ok(SyncOutcome::Failed { message })
            }
            Err(Error::Transport(cause)) => {
                warn!(%cause, "Synchronization transport failure, keeping queue");
                Ok(SyncOutcome::Failed {
                    message: "synchronization failed: service unreachable or timed out"
                        .to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Split a `£`-separated failure reply into displayable lines
fn join_failures(reply: &str) -> String {
    reply
        .split(FAILURE_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

//! # Sync Job State Machine
//!
//! Tracks one upload pass with validated state transitions.
//!
//! ## Overview
//!
//! A job lives only in memory: resumability comes from the sync cursor and the
//! server's chunk bookkeeping, so nothing here needs to survive a restart. The
//! coordinator drives the transitions and turns the final job into a
//! [`SyncReport`].
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓         ↑
//!     └──────→ Failed    │
//!     └──────→ Cancelled │
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncJob, SyncStatus};
//!
//! let mut job = SyncJob::new().start(3)?;
//! job.record_upload(1042)?;
//! let job = job.complete()?;
//! assert_eq!(job.status, SyncStatus::Completed);
//! ```

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    /// Create a new random sync job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sync job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SyncJobId> for Uuid {
    fn from(id: SyncJobId) -> Self {
        id.0
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Job has been created but not yet started
    Pending,
    /// Job is currently running
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
    /// Job was cancelled by the user
    Cancelled,
}

impl SyncStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled
        )
    }

    /// Check if this status represents an active state
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "cancelled" => Ok(SyncStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}


// ============================================================================
// Sync Job Entity
// ============================================================================

/// The item that stopped a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub file_name: String,
    /// `NETWORK_ERROR`, `FILE_ERROR`, `SERVER_ERROR` or `UNKNOWN`
    pub reason: String,
    pub message: String,
}

/// One upload pass with state machine semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub status: SyncStatus,
    /// Items detected as pending when the pass started
    pub total_items: u64,
    /// Items uploaded and committed to the cursor
    pub uploaded: u64,
    /// Highest generation committed during this pass
    pub last_generation: Option<i64>,
    pub failure: Option<ItemFailure>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl SyncJob {
    /// Create a new sync job in pending state
    pub fn new() -> Self {
        Self::with_id(SyncJobId::new())
    }

    pub fn with_id(id: SyncJobId) -> Self {
        Self {
            id,
            status: SyncStatus::Pending,
            total_items: 0,
            uploaded: 0,
            last_generation: None,
            failure: None,
            error_message: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Start the job with the number of pending items.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self, total_items: u64) -> Result<Self> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        self.total_items = total_items;
        self.started_at = Some(current_timestamp());
        Ok(self)
    }

    /// Count one uploaded item whose generation was committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn record_upload(&mut self, generation: i64) -> Result<()> {
        if self.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "record_upload".to_string(),
                reason: "Job must be running to record uploads".to_string(),
            });
        }

        self.uploaded += 1;
        self.last_generation = Some(self.last_generation.map_or(generation, |g| g.max(generation)));
        Ok(())
    }

    pub fn complete(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Completed)?;
        self.status = SyncStatus::Completed;
        self.completed_at = Some(current_timestamp());
        Ok(self)
    }

    /// Mark the job as failed. `failure` names the item that stopped the
    /// pass, if the failure came from an upload.
    pub fn fail(mut self, error_message: String, failure: Option<ItemFailure>) -> Result<Self> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.completed_at = Some(current_timestamp());
        self.error_message = Some(error_message);
        self.failure = failure;
        Ok(self)
    }

    pub fn cancel(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Cancelled)?;
        self.status = SyncStatus::Cancelled;
        self.completed_at = Some(current_timestamp());
        Ok(self)
    }

    /// Get the duration of the job in seconds
    ///
    /// Returns None if the job hasn't started or completed yet
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).max(0) as u64),
            _ => None,
        }
    }

    /// Summary of a finished job.
    pub fn report(&self) -> SyncReport {
        SyncReport {
            job_id: self.id,
            status: self.status,
            total_items: self.total_items,
            uploaded: self.uploaded,
            failure: self.failure.clone(),
            error_message: self.error_message.clone(),
            duration_secs: self.duration_secs().unwrap_or(0),
        }
    }

    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (SyncStatus::Pending, SyncStatus::Running)
                | (SyncStatus::Pending, SyncStatus::Cancelled)
                | (SyncStatus::Pending, SyncStatus::Failed)
                | (SyncStatus::Running, SyncStatus::Completed)
                | (SyncStatus::Running, SyncStatus::Failed)
                | (SyncStatus::Running, SyncStatus::Cancelled)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

impl Default for SyncJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub job_id: SyncJobId,
    pub status: SyncStatus,
    pub total_items: u64,
    pub uploaded: u64,
    pub failure: Option<ItemFailure>,
    pub error_message: Option<String>,
    pub duration_secs: u64,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Completed
    }
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_roundtrip_string() {
        let id = SyncJobId::new();
        assert_eq!(SyncJobId::from_string(&id.as_str()).unwrap(), id);
        assert!(SyncJobId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Running".parse::<SyncStatus>().unwrap(), SyncStatus::Running);
        assert!("paused".parse::<SyncStatus>().is_err());
        assert!(SyncStatus::Cancelled.is_terminal());
        assert!(SyncStatus::Pending.is_active());
    }

    #[test]
    fn test_happy_path() {
        let mut job = SyncJob::new().start(2).unwrap();
        job.record_upload(10).unwrap();
        job.record_upload(7).unwrap();
        let job = job.complete().unwrap();

        let report = job.report();
        assert!(report.is_success());
        assert_eq!(report.total_items, 2);
        assert_eq!(report.uploaded, 2);
        assert_eq!(job.last_generation, Some(10));
    }

    #[test]
    fn test_failure_keeps_item() {
        let job = SyncJob::new().start(3).unwrap();
        let failure = ItemFailure {
            file_name: "IMG_1.jpg".to_string(),
            reason: "NETWORK_ERROR".to_string(),
            message: "connection reset".to_string(),
        };
        let job = job
            .fail("connection reset".to_string(), Some(failure.clone()))
            .unwrap();

        assert_eq!(job.status, SyncStatus::Failed);
        assert_eq!(job.report().failure, Some(failure));
    }

    #[test]
    fn test_invalid_transitions() {
        let job = SyncJob::new();
        let mut pending = job.clone();
        assert!(pending.record_upload(1).is_err());
        assert!(job.clone().complete().is_err());

        let done = job.start(0).unwrap().complete().unwrap();
        assert!(done.clone().cancel().is_err());
        assert!(done.fail("late".to_string(), None).is_err());
    }
}

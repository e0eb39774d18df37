//! Media Upload API
//!
//! Typed view of the media server's upload endpoints. The sync core drives
//! uploads through [`MediaUploadApi`]; the provider crate maps it onto HTTP.
//!
//! Error mapping contract for implementations:
//! - the server answered with a non-success envelope: [`BridgeError::Rejected`]
//! - the request never completed (DNS, connect, reset, timeout): [`BridgeError::Network`]
//!
//! [`BridgeError::Rejected`]: crate::error::BridgeError::Rejected
//! [`BridgeError::Network`]: crate::error::BridgeError::Network

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::MediaKind;

/// Metadata sent with both direct uploads and merge requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub file_name: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub duration: i64,
    /// Capture time in milliseconds
    pub date_token: i64,
    /// Seconds since epoch
    pub date_added: i64,
    /// Seconds since epoch
    pub last_modified: i64,
    /// 0 or 1
    pub favorite: i32,
}

/// Parameters identifying a chunked upload session on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkCheck {
    pub file_id: String,
    pub chunk_size: u64,
    pub total_size: u64,
    pub total_chunks: u64,
}

/// Session fields appended to the metadata of a merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMerge {
    pub file_id: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

/// Server-side merge state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeState {
    Success,
    Failed,
    /// Any other status string the server reports while merging
    Pending(String),
}

impl MergeState {
    pub fn from_status(status: &str) -> Self {
        match status {
            "SUCCESS" => MergeState::Success,
            "FAILED" => MergeState::Failed,
            other => MergeState::Pending(other.to_string()),
        }
    }
}

/// Result of one merge poll.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeStatus {
    pub state: MergeState,
    /// Server-reported merge progress, 0.0..=1.0 when known
    pub progress: f32,
    pub error: Option<String>,
}

/// Upload endpoints of the media server.
#[async_trait]
pub trait MediaUploadApi: Send + Sync {
    /// Upload a whole file in one request.
    async fn upload_direct(&self, metadata: &UploadMetadata, content: Bytes) -> Result<()>;

    /// Ask the server how far a chunked session already got.
    ///
    /// Returns the index of the first chunk that still has to be uploaded.
    async fn check_chunks(&self, check: &ChunkCheck) -> Result<u64>;

    /// Upload one chunk of a session.
    async fn upload_chunk(&self, file_id: &str, chunk_index: u64, data: Bytes) -> Result<()>;

    /// Ask the server to assemble the uploaded chunks.
    async fn notify_merge(&self, metadata: &UploadMetadata, merge: &ChunkMerge) -> Result<()>;

    /// Poll the state of a merge started with [`MediaUploadApi::notify_merge`].
    async fn poll_merge(&self, file_id: &str) -> Result<MergeStatus>;
}

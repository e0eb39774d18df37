//! # Upload Engine
//!
//! Moves one media item to the server, either in a single multipart request
//! or as a resumable chunked session followed by a server-side merge.
//!
//! Items larger than [`UploadConfig::chunk_threshold`] go through the chunked
//! path:
//!
//! 1. ask the server which chunk to resume from
//! 2. skip the bytes already uploaded and send the remaining chunks in order
//! 3. request the merge and poll until the server reports a final state
//!
//! Failures never escape as errors; they are folded into an [`UploadResult`]
//! carrying a coarse [`UploadFailureReason`] for the UI.

use crate::detector::MediaSyncItem;
use crate::state::{SyncStateManager, SyncStep};
use bridge_traits::error::BridgeError;
use bridge_traits::media::MediaIndex;
use bridge_traits::upload::{ChunkCheck, ChunkMerge, MediaUploadApi, MergeState};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 20 * 1024 * 1024;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MERGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 5;

type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub chunk_size: u64,
    /// Items strictly larger than this are uploaded in chunks
    pub chunk_threshold: u64,
    pub poll_interval: Duration,
    pub merge_timeout: Duration,
    pub max_poll_failures: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            merge_timeout: DEFAULT_MERGE_TIMEOUT,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailureReason {
    NetworkError,
    FileError,
    ServerError,
    Unknown,
}

impl UploadFailureReason {
    pub fn classify(err: &BridgeError) -> Self {
        match err {
            BridgeError::Network(_) => UploadFailureReason::NetworkError,
            BridgeError::Rejected { .. } => UploadFailureReason::ServerError,
            BridgeError::Io(_) => UploadFailureReason::FileError,
            _ => UploadFailureReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFailureReason::NetworkError => "NETWORK_ERROR",
            UploadFailureReason::FileError => "FILE_ERROR",
            UploadFailureReason::ServerError => "SERVER_ERROR",
            UploadFailureReason::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for UploadFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Success,
    Failure {
        reason: UploadFailureReason,
        message: String,
    },
    Cancelled,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success)
    }

    fn failure(reason: UploadFailureReason, message: impl Into<String>) -> Self {
        UploadResult::Failure {
            reason,
            message: message.into(),
        }
    }

    fn from_error(err: &BridgeError) -> Self {
        let message = match err {
            BridgeError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::failure(UploadFailureReason::classify(err), message)
    }
}

pub struct UploadEngine {
    api: Arc<dyn MediaUploadApi>,
    index: Arc<dyn MediaIndex>,
    state: SyncStateManager,
    config: UploadConfig,
}

impl UploadEngine {
    pub fn new(
        api: Arc<dyn MediaUploadApi>,
        index: Arc<dyn MediaIndex>,
        state: SyncStateManager,
        config: UploadConfig,
    ) -> Self {
        Self {
            api,
            index,
            state,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Whether `item` takes the chunked path.
    pub fn is_chunked(&self, item: &MediaSyncItem) -> bool {
        item.size > self.config.chunk_threshold
    }

    #[instrument(skip(self, item, cancel), fields(file = %item.file_name, size = item.size))]
    pub async fn upload(&self, item: &MediaSyncItem, cancel: &CancellationToken) -> UploadResult {
        if cancel.is_cancelled() {
            return UploadResult::Cancelled;
        }

        if self.is_chunked(item) {
            info!(content_ref = %item.content_ref, "Starting chunked upload");
            self.upload_chunked(item, cancel).await
        } else {
            info!(content_ref = %item.content_ref, "Starting direct upload");
            self.upload_direct(item).await
        }
    }

    async fn upload_direct(&self, item: &MediaSyncItem) -> UploadResult {
        self.state.set_step(SyncStep::Uploading);
        self.state.set_file_progress(0.0);

        let content = match self.read_all(item).await {
            Ok(content) => content,
            Err(e) => {
                error!(error = %e, "Failed to read media");
                return UploadResult::from_error(&e);
            }
        };

        match self.api.upload_direct(&item.metadata(), content).await {
            Ok(()) => {
                info!("Direct upload finished");
                self.state.set_file_progress(1.0);
                UploadResult::Success
            }
            Err(e) => {
                error!(error = %e, "Direct upload failed");
                UploadResult::from_error(&e)
            }
        }
    }

    async fn upload_chunked(&self, item: &MediaSyncItem, cancel: &CancellationToken) -> UploadResult {
        self.state.set_step(SyncStep::Uploading);
        self.state.set_file_progress(0.0);

        let chunk_size = self.config.chunk_size;
        let file_id = item.file_id();
        let total_chunks = item.size.div_ceil(chunk_size);

        let start = self.start_chunk_index(&file_id, item.size, total_chunks).await;
        debug!(file_id = %file_id, total_chunks, start, "Resolved resume point");

        let (mut stream, start) = match self.open_at_chunk(item, start).await {
            Ok(opened) => opened,
            Err(e) => {
                error!(error = %e, "Failed to open media");
                return UploadResult::from_error(&e);
            }
        };

        for chunk_index in start..total_chunks {
            if cancel.is_cancelled() {
                info!(chunk_index, "Upload cancelled between chunks");
                return UploadResult::Cancelled;
            }

            let data = match read_chunk(&mut stream, chunk_size).await {
                Ok(data) => data,
                Err(e) => {
                    error!(chunk_index, error = %e, "Failed to read chunk");
                    return UploadResult::from_error(&e);
                }
            };
            if data.is_empty() {
                warn!(chunk_index, "Media ended before the last chunk");
                break;
            }

            if let Err(e) = self.api.upload_chunk(&file_id, chunk_index, data).await {
                error!(chunk_index, error = %e, "Chunk upload failed");
                return UploadResult::from_error(&e);
            }

            debug!(chunk_index, "Chunk uploaded");
            self.state
                .set_file_progress(chunk_index as f32 / total_chunks as f32);
        }

        let merge = ChunkMerge {
            file_id: file_id.clone(),
            chunk_size,
            total_chunks,
        };
        if let Err(e) = self.api.notify_merge(&item.metadata(), &merge).await {
            error!(error = %e, "Merge request failed");
            return UploadResult::from_error(&e);
        }

        info!(file_id = %file_id, "Chunks uploaded, waiting for merge");
        self.state.set_step(SyncStep::MergingChunks);
        self.poll_merge(&file_id, cancel).await
    }

    /// Resume point reported by the server. Anything unexpected restarts at 0.
    async fn start_chunk_index(&self, file_id: &str, total_size: u64, total_chunks: u64) -> u64 {
        let check = ChunkCheck {
            file_id: file_id.to_string(),
            chunk_size: self.config.chunk_size,
            total_size,
            total_chunks,
        };

        match self.api.check_chunks(&check).await {
            Ok(index) => index.min(total_chunks),
            Err(e) => {
                warn!(error = %e, "Chunk check failed, starting from 0");
                0
            }
        }
    }

    /// Open the item and skip to `start`. A short or failed skip reopens the
    /// item and starts over from the first chunk.
    async fn open_at_chunk(&self, item: &MediaSyncItem, start: u64) -> Result<(ContentStream, u64), BridgeError> {
        let mut stream = self.index.open_read(&item.content_ref).await?;
        if start == 0 {
            return Ok((stream, 0));
        }

        let offset = start * self.config.chunk_size;
        let skipped = {
            let mut limited = (&mut stream).take(offset);
            tokio::io::copy(&mut limited, &mut tokio::io::sink()).await
        };
        match skipped {
            Ok(skipped) if skipped == offset => Ok((stream, start)),
            Ok(skipped) => {
                warn!(skipped, offset, "Incomplete skip, restarting from 0");
                Ok((self.index.open_read(&item.content_ref).await?, 0))
            }
            Err(e) => {
                warn!(error = %e, "Skip failed, restarting from 0");
                Ok((self.index.open_read(&item.content_ref).await?, 0))
            }
        }
    }

    async fn poll_merge(&self, file_id: &str, cancel: &CancellationToken) -> UploadResult {
        let deadline = tokio::time::Instant::now() + self.config.merge_timeout;
        let max_failures = self.config.max_poll_failures;
        let mut failures = 0u32;
        let mut polls = 0u32;

        while tokio::time::Instant::now() < deadline {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(polls, "Merge polling cancelled");
                    return UploadResult::Cancelled;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            polls += 1;

            match self.api.poll_merge(file_id).await {
                Ok(status) => match status.state {
                    MergeState::Success => {
                        info!(polls, "Merge finished");
                        self.state.set_file_progress(1.0);
                        return UploadResult::Success;
                    }
                    MergeState::Failed => {
                        failures += 1;
                        warn!(failures, error = ?status.error, "Merge reported failure");
                        if failures >= max_failures {
                            return UploadResult::failure(
                                UploadFailureReason::ServerError,
                                status.error.unwrap_or_else(|| "Merge failed".to_string()),
                            );
                        }
                    }
                    MergeState::Pending(phase) => {
                        debug!(phase = %phase, progress = status.progress, "Merging");
                    }
                },
                Err(e) => {
                    failures += 1;
                    warn!(failures, error = %e, "Merge poll failed");
                    if failures >= max_failures {
                        return match e {
                            BridgeError::Rejected { .. } => UploadResult::failure(
                                UploadFailureReason::ServerError,
                                "Poll merge result failed",
                            ),
                            other => UploadResult::from_error(&other),
                        };
                    }
                }
            }
        }

        error!(polls, failures, "Merge poll timeout");
        UploadResult::failure(UploadFailureReason::ServerError, "Merge poll timeout")
    }

    async fn read_all(&self, item: &MediaSyncItem) -> Result<Bytes, BridgeError> {
        let mut stream = self.index.open_read(&item.content_ref).await?;
        let mut buf = Vec::with_capacity(item.size as usize);
        stream.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// Read up to `chunk_size` bytes; fewer only at the end of the stream.
async fn read_chunk(stream: &mut ContentStream, chunk_size: u64) -> Result<Bytes, BridgeError> {
    let mut buf = Vec::with_capacity(chunk_size as usize);
    stream.take(chunk_size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

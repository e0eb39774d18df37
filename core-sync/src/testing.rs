//! In-memory fakes shared by the unit tests.

use crate::detector::MediaSyncItem;
use crate::state::SyncState;
use async_trait::async_trait;
use bridge_desktop::SqliteSettingsStore;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::media::{MediaAlbum, MediaIndex, MediaKind, MediaRecord};
use bridge_traits::storage::SettingsStore;
use bridge_traits::upload::{
    ChunkCheck, ChunkMerge, MediaUploadApi, MergeState, MergeStatus, UploadMetadata,
};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub async fn memory_settings() -> Arc<dyn SettingsStore> {
    Arc::new(SqliteSettingsStore::in_memory().await.unwrap())
}

/// An image record whose content ref is its name.
pub fn record(name: &str, bucket_id: i64, size: u64, generation: i64) -> MediaRecord {
    MediaRecord {
        content_ref: name.to_string(),
        kind: MediaKind::Image,
        bucket_id,
        display_name: name.to_string(),
        size,
        width: 100,
        height: 80,
        date_taken: 1_600_000_000_000,
        date_added: 1_600_000_000,
        date_modified: 1_600_000_000,
        duration: 0,
        favorite: false,
        generation_added: generation,
        generation_modified: generation,
    }
}

pub fn item_with_size(name: &str, size: u64) -> MediaSyncItem {
    MediaSyncItem::from_record(record(name, 1, size, 1), false)
}

pub struct FakeMediaIndex {
    version: String,
    generation: i64,
    albums: Vec<MediaAlbum>,
    records: Vec<MediaRecord>,
    content: HashMap<String, Vec<u8>>,
    refreshes: AtomicUsize,
    opens: AtomicUsize,
}

impl FakeMediaIndex {
    pub fn new(version: &str, generation: i64) -> Self {
        Self {
            version: version.to_string(),
            generation,
            albums: Vec::new(),
            records: Vec::new(),
            content: HashMap::new(),
            refreshes: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_albums(mut self, albums: Vec<MediaAlbum>) -> Self {
        self.albums = albums;
        self
    }

    pub fn with_records(mut self, records: Vec<MediaRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_content(mut self, content_ref: &str, bytes: Vec<u8>) -> Self {
        self.content.insert(content_ref.to_string(), bytes);
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaIndex for FakeMediaIndex {
    async fn refresh(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    async fn current_generation(&self) -> Result<i64> {
        Ok(self.generation)
    }

    async fn list_albums(&self) -> Result<Vec<MediaAlbum>> {
        Ok(self.albums.clone())
    }

    async fn query_changed(
        &self,
        bucket_ids: &[i64],
        since_generation: i64,
    ) -> Result<Vec<MediaRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| bucket_ids.contains(&r.bucket_id))
            .filter(|r| r.generation_added > since_generation || r.generation_modified > since_generation)
            .cloned()
            .collect())
    }

    async fn open_read(
        &self,
        content_ref: &str,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.content.get(content_ref) {
            Some(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.clone()))),
            None => Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", content_ref),
            ))),
        }
    }
}

#[derive(Default)]
struct UploadScript {
    direct: Vec<Vec<u8>>,
    reject_direct: Option<(i32, String)>,
    reject_direct_for: HashMap<String, (i32, String)>,
    direct_network_failure: Option<String>,
    check: Option<Result<u64>>,
    chunks: Vec<(String, u64, Vec<u8>)>,
    reject_chunk: HashMap<u64, String>,
    merges: Vec<ChunkMerge>,
    merge_polls: VecDeque<Result<MergeStatus>>,
    polls: usize,
    cancel_after_chunk: Option<(u64, CancellationToken)>,
    state: Option<watch::Receiver<SyncState>>,
    progress_seen: Vec<f32>,
}

/// Records every call and answers from a script. Merge polls report
/// `MERGING` once the script runs out.
#[derive(Default)]
pub struct ScriptedUploadApi {
    script: Mutex<UploadScript>,
}

impl ScriptedUploadApi {
    pub fn reject_direct(&self, code: i32, message: &str) {
        self.script.lock().unwrap().reject_direct = Some((code, message.to_string()));
    }

    pub fn reject_direct_for(&self, file_name: &str, code: i32, message: &str) {
        self.script
            .lock()
            .unwrap()
            .reject_direct_for
            .insert(file_name.to_string(), (code, message.to_string()));
    }

    pub fn fail_direct_network(&self, message: &str) {
        self.script.lock().unwrap().direct_network_failure = Some(message.to_string());
    }

    pub fn set_check_result(&self, result: Result<u64>) {
        self.script.lock().unwrap().check = Some(result);
    }

    pub fn reject_chunk(&self, index: u64, message: &str) {
        self.script
            .lock()
            .unwrap()
            .reject_chunk
            .insert(index, message.to_string());
    }

    /// Cancel `token` once chunk `index` has been accepted.
    pub fn cancel_after_chunk(&self, index: u64, token: CancellationToken) {
        self.script.lock().unwrap().cancel_after_chunk = Some((index, token));
    }

    /// Record the published file progress whenever a chunk or merge request
    /// arrives.
    pub fn watch_progress(&self, state: watch::Receiver<SyncState>) {
        self.script.lock().unwrap().state = Some(state);
    }

    pub fn progress_seen(&self) -> Vec<f32> {
        self.script.lock().unwrap().progress_seen.clone()
    }

    pub fn push_merge(&self, result: Result<MergeStatus>) {
        self.script.lock().unwrap().merge_polls.push_back(result);
    }

    pub fn direct_uploads(&self) -> Vec<Vec<u8>> {
        self.script.lock().unwrap().direct.clone()
    }

    pub fn chunks(&self) -> Vec<(String, u64, Vec<u8>)> {
        self.script.lock().unwrap().chunks.clone()
    }

    pub fn merges(&self) -> Vec<ChunkMerge> {
        self.script.lock().unwrap().merges.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.script.lock().unwrap().polls
    }
}

impl UploadScript {
    fn note_progress(&mut self) {
        if let Some(state) = &self.state {
            let progress = state.borrow().file_progress;
            self.progress_seen.push(progress);
        }
    }
}

#[async_trait]
impl MediaUploadApi for ScriptedUploadApi {
    async fn upload_direct(&self, metadata: &UploadMetadata, content: Bytes) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        if let Some(message) = &script.direct_network_failure {
            return Err(BridgeError::Network(message.clone()));
        }
        let rejection = script
            .reject_direct_for
            .get(&metadata.file_name)
            .or(script.reject_direct.as_ref())
            .cloned();
        if let Some((code, message)) = rejection {
            return Err(BridgeError::Rejected { code, message });
        }
        script.direct.push(content.to_vec());
        Ok(())
    }

    async fn check_chunks(&self, _check: &ChunkCheck) -> Result<u64> {
        self.script.lock().unwrap().check.take().unwrap_or(Ok(0))
    }

    async fn upload_chunk(&self, file_id: &str, chunk_index: u64, data: Bytes) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        if let Some(message) = script.reject_chunk.get(&chunk_index) {
            return Err(BridgeError::Rejected {
                code: 500,
                message: message.clone(),
            });
        }
        script.note_progress();
        script
            .chunks
            .push((file_id.to_string(), chunk_index, data.to_vec()));
        if let Some((index, token)) = &script.cancel_after_chunk {
            if *index == chunk_index {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn notify_merge(&self, _metadata: &UploadMetadata, merge: &ChunkMerge) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.note_progress();
        script.merges.push(merge.clone());
        Ok(())
    }

    async fn poll_merge(&self, _file_id: &str) -> Result<MergeStatus> {
        let mut script = self.script.lock().unwrap();
        script.polls += 1;
        script.merge_polls.pop_front().unwrap_or_else(|| {
            Ok(MergeStatus {
                state: MergeState::Pending("MERGING".to_string()),
                progress: 0.0,
                error: None,
            })
        })
    }
}

//! Filenest media server connector
//!
//! Implements [`MediaUploadApi`] on top of the host [`HttpClient`] and adds
//! the read-only browse endpoints used by gallery screens.

use async_trait::async_trait;
use bridge_traits::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm, MultipartPart, RetryPolicy,
};
use bridge_traits::upload::{
    ChunkCheck, ChunkMerge, MediaUploadApi, MergeState, MergeStatus, UploadMetadata,
};
use bytes::Bytes;
use core_auth::{Session, SessionManager};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{FilenestError, Result};
use crate::types::{
    ApiResponse, CheckChunkResponse, ChunkQuery, DetailQuery, ListMediaQuery, MediaDetailItem,
    MediaListItem, MergeChunkRequest, MergeResultRequest, MergeResultResponse, Page, PageData,
    UNKNOWN_ERROR,
};

const UPLOAD_DIRECT_PATH: &str = "/api/media/upload/direct";
const CHECK_CHUNKS_PATH: &str = "/api/media/upload/checkChunks";
const UPLOAD_CHUNK_PATH: &str = "/api/media/upload/chunk";
const NOTIFY_MERGE_PATH: &str = "/api/media/upload/notifyMergeChunks";
const POLL_MERGE_PATH: &str = "/api/media/upload/pollMergeResult";
const COUNT_PATH: &str = "/api/media/count";
const LIST_PATH: &str = "/api/media/list";
const DETAIL_PATH: &str = "/api/media/detail";

/// Content type of every uploaded body part.
const OCTET_STREAM: &str = "application/octet-stream";

/// Timeout for requests carrying file content.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for small JSON requests.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Connector for one Filenest server.
///
/// The server URL and bearer token are read from the [`SessionManager`] on
/// every call, so a re-login takes effect without rebuilding the client.
///
/// # Example
///
/// ```ignore
/// use provider_filenest::FilenestClient;
///
/// let client = FilenestClient::new(http_client, sessions);
/// let total = client.count_media().await?;
/// let first = client.page(None, 1, 40).await?;
/// ```
pub struct FilenestClient {
    http_client: Arc<dyn HttpClient>,
    sessions: Arc<SessionManager>,
    browse_retry: RetryPolicy,
}

impl FilenestClient {
    pub fn new(http_client: Arc<dyn HttpClient>, sessions: Arc<SessionManager>) -> Self {
        Self {
            http_client,
            sessions,
            browse_retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy used for idempotent browse requests.
    pub fn with_browse_retry(mut self, policy: RetryPolicy) -> Self {
        self.browse_retry = policy;
        self
    }

    /// Build an authorized request for `path`, optionally with a query string.
    async fn request<Q: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        query: Option<&Q>,
    ) -> Result<HttpRequest> {
        let session = self.sessions.require_session().await?;
        let mut url = endpoint(&session, path)?;

        if let Some(query) = query {
            let encoded = serde_urlencoded::to_string(query)
                .map_err(|e| FilenestError::EncodeError(e.to_string()))?;
            url.set_query(Some(&encoded));
        }

        Ok(HttpRequest::new(method, url.as_str()).bearer_token(session.token()))
    }

    /// Execute a request and decode the envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        retry: Option<RetryPolicy>,
    ) -> Result<ApiResponse<T>> {
        let response = match retry {
            Some(policy) => self.http_client.execute_with_retry(request, policy).await?,
            None => self.http_client.execute(request).await?,
        };
        decode(response)
    }

    /// Execute a request whose envelope must be ok; returns its payload.
    async fn call<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        retry: Option<RetryPolicy>,
    ) -> Result<Option<T>> {
        let envelope = self.send::<T>(request, retry).await?;
        if !envelope.is_ok() {
            let message = envelope.message_or_default();
            warn!(code = envelope.code, message = %message, "Media server rejected request");
            return Err(FilenestError::Api {
                code: envelope.code,
                message,
            });
        }
        Ok(envelope.data)
    }

    /// Total number of media items on the server.
    #[instrument(skip(self))]
    pub async fn count_media(&self) -> Result<i64> {
        let request = self
            .request::<()>(HttpMethod::Get, COUNT_PATH, None)
            .await?
            .timeout(API_TIMEOUT);
        let count = self
            .call::<i64>(request, Some(self.browse_retry.clone()))
            .await?
            .unwrap_or(0);
        debug!(count, "Server media count");
        Ok(count)
    }

    /// One page of the server's media list, optionally restricted to an album.
    ///
    /// `page_num` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_media(
        &self,
        album_id: Option<i64>,
        page_num: u32,
        page_size: u32,
    ) -> Result<Page<MediaListItem>> {
        let query = ListMediaQuery {
            album_id,
            page_num,
            page_size,
        };
        let request = self
            .request(HttpMethod::Get, LIST_PATH, Some(&query))
            .await?
            .timeout(API_TIMEOUT);

        self.call::<Page<MediaListItem>>(request, Some(self.browse_retry.clone()))
            .await?
            .ok_or_else(|| FilenestError::ParseError("media list without data".to_string()))
    }

    /// Like [`list_media`](Self::list_media), reshaped with navigation flags.
    pub async fn page(
        &self,
        album_id: Option<i64>,
        page_num: u32,
        page_size: u32,
    ) -> Result<PageData<MediaListItem>> {
        let page = self.list_media(album_id, page_num, page_size).await?;
        debug!(
            records = page.records.len(),
            current = page.current,
            pages = page.pages,
            "Fetched media page"
        );
        Ok(PageData::from_page(page_num, page))
    }

    /// Details of one server-side media item.
    #[instrument(skip(self))]
    pub async fn fetch_media(&self, id: i64) -> Result<MediaDetailItem> {
        let request = self
            .request(HttpMethod::Get, DETAIL_PATH, Some(&DetailQuery { id }))
            .await?
            .timeout(API_TIMEOUT);

        self.call::<MediaDetailItem>(request, Some(self.browse_retry.clone()))
            .await?
            .ok_or_else(|| FilenestError::Api {
                code: 404,
                message: format!("Media {} not found", id),
            })
    }

    /// Stream a server path such as [`MediaDetailItem::original_path`].
    #[instrument(skip(self))]
    pub async fn open_media_stream(
        &self,
        path: &str,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let request = self.request::<()>(HttpMethod::Get, path, None).await?;
        Ok(self.http_client.download_stream(request).await?)
    }
}

#[async_trait]
impl MediaUploadApi for FilenestClient {
    #[instrument(skip(self, content), fields(file_name = %metadata.file_name, size = content.len()))]
    async fn upload_direct(
        &self,
        metadata: &UploadMetadata,
        content: Bytes,
    ) -> bridge_traits::error::Result<()> {
        let form = MultipartForm::new().part(MultipartPart::file(
            "file",
            metadata.file_name.clone(),
            OCTET_STREAM,
            content,
        ));
        let request = self
            .request(HttpMethod::Post, UPLOAD_DIRECT_PATH, Some(metadata))
            .await?
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT);

        self.call::<serde_json::Value>(request, None).await?;
        info!("Direct upload accepted");
        Ok(())
    }

    #[instrument(skip(self), fields(file_id = %check.file_id))]
    async fn check_chunks(&self, check: &ChunkCheck) -> bridge_traits::error::Result<u64> {
        let request = self
            .request::<()>(HttpMethod::Post, CHECK_CHUNKS_PATH, None)
            .await?
            .json(check)?
            .timeout(API_TIMEOUT);

        let response = self.call::<CheckChunkResponse>(request, None).await?;
        let next = response
            .map(|r| r.max_chunk_index.max(0) as u64)
            .unwrap_or(0);
        debug!(next, "Chunk session state");
        Ok(next)
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_chunk(
        &self,
        file_id: &str,
        chunk_index: u64,
        data: Bytes,
    ) -> bridge_traits::error::Result<()> {
        let form = MultipartForm::new().part(MultipartPart::file(
            "chunk",
            format!("chunk_{}", chunk_index),
            OCTET_STREAM,
            data,
        ));
        let query = ChunkQuery {
            file_id,
            chunk_index,
        };
        let request = self
            .request(HttpMethod::Post, UPLOAD_CHUNK_PATH, Some(&query))
            .await?
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT);

        self.call::<serde_json::Value>(request, None).await?;
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(file_id = %merge.file_id))]
    async fn notify_merge(
        &self,
        metadata: &UploadMetadata,
        merge: &ChunkMerge,
    ) -> bridge_traits::error::Result<()> {
        let body = MergeChunkRequest { metadata, merge };
        let request = self
            .request::<()>(HttpMethod::Post, NOTIFY_MERGE_PATH, None)
            .await?
            .json(&body)?
            .timeout(API_TIMEOUT);

        self.call::<serde_json::Value>(request, None).await?;
        info!("Merge requested");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn poll_merge(&self, file_id: &str) -> bridge_traits::error::Result<MergeStatus> {
        let request = self
            .request::<()>(HttpMethod::Post, POLL_MERGE_PATH, None)
            .await?
            .json(&MergeResultRequest { file_id })?
            .timeout(API_TIMEOUT);

        let result = self.call::<MergeResultResponse>(request, None).await?;
        let status = match result {
            Some(result) => MergeStatus {
                state: MergeState::from_status(&result.status),
                progress: result.progress,
                error: result.error.filter(|e| !e.is_empty()),
            },
            None => MergeStatus {
                state: MergeState::Pending(String::new()),
                progress: 0.0,
                error: None,
            },
        };
        debug!(state = ?status.state, progress = status.progress, "Merge poll");
        Ok(status)
    }
}

fn endpoint(session: &Session, path: &str) -> Result<url::Url> {
    session
        .endpoint(path)
        .map_err(|e| FilenestError::InvalidEndpoint {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

/// Decode an envelope. An empty or unparseable body from a failing status
/// is reported as a rejection carrying the HTTP status.
fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<ApiResponse<T>> {
    if response.body.is_empty() {
        return Err(FilenestError::Api {
            code: i32::from(response.status),
            message: UNKNOWN_ERROR.to_string(),
        });
    }

    match serde_json::from_slice::<ApiResponse<T>>(&response.body) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !response.is_success() => Err(FilenestError::Api {
            code: i32::from(response.status),
            message: String::from_utf8_lossy(&response.body).trim().to_string(),
        }),
        Err(e) => Err(FilenestError::ParseError(e.to_string())),
    }
}

//! Filenest API wire types
//!
//! Every endpoint answers with the [`ApiResponse`] envelope; `data` carries
//! the payload when `code` is 200.

use bridge_traits::upload::{ChunkMerge, UploadMetadata};
use serde::{Deserialize, Serialize};

/// Message used when the server gives no reason for a failure.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Response envelope shared by all endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }

    pub fn message_or_default(&self) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_ERROR)
            .to_string()
    }
}

/// `true` only for a present envelope with code 200.
pub fn is_ok<T>(response: Option<&ApiResponse<T>>) -> bool {
    response.is_some_and(ApiResponse::is_ok)
}

/// Server message of an envelope, or [`UNKNOWN_ERROR`] when absent.
pub fn message_of<T>(response: Option<&ApiResponse<T>>) -> String {
    response
        .map(ApiResponse::message_or_default)
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// `checkChunks` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckChunkResponse {
    pub max_chunk_index: i64,
}

/// `pollMergeResult` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeResultResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `notifyMergeChunks`: the upload metadata plus the session fields.
#[derive(Debug, Serialize)]
pub(crate) struct MergeChunkRequest<'a> {
    #[serde(flatten)]
    pub metadata: &'a UploadMetadata,
    #[serde(flatten)]
    pub merge: &'a ChunkMerge,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MergeResultRequest<'a> {
    pub file_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChunkQuery<'a> {
    pub file_id: &'a str,
    pub chunk_index: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListMediaQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<i64>,
    pub page_num: u32,
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct DetailQuery {
    pub id: i64,
}

/// One server-side page of media.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub pages: u32,
}

/// A page reshaped for list UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData<T> {
    pub has_next: bool,
    pub has_previous: bool,
    pub list: Vec<T>,
}

impl<T> PageData<T> {
    /// Builds navigation flags for page `page_num` (1-based).
    pub fn from_page(page_num: u32, page: Page<T>) -> Self {
        Self {
            has_next: page_num < page.pages,
            has_previous: page_num > 1,
            list: page.records,
        }
    }
}

/// Grid entry of the server's media list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListItem {
    pub id: i64,
    /// `IMAGE` or `VIDEO`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub duration_text: String,
    #[serde(default)]
    pub sort_date: String,
    #[serde(default)]
    pub sort_time: String,
    #[serde(default)]
    pub thumbnail: String,
}

/// Full description of one server-side media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaDetailItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub duration: i64,
    pub duration_text: String,
    pub original_path: String,
    pub preview_path: String,
    pub favorite: bool,
    pub in_album_ids: Vec<i64>,
}

impl MediaDetailItem {
    pub fn is_video(&self) -> bool {
        self.kind.eq_ignore_ascii_case("video")
    }
}

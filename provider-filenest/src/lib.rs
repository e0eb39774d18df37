//! # Filenest Provider
//!
//! REST client for a self-hosted Filenest media server.
//!
//! ## Overview
//!
//! This module provides:
//! - [`MediaUploadApi`](bridge_traits::upload::MediaUploadApi) over the
//!   server's direct and chunked upload endpoints
//! - Read-only browsing: media count, paged media list, item details and
//!   original/preview streaming
//! - Envelope decoding with server rejections surfaced as
//!   [`BridgeError::Rejected`](bridge_traits::error::BridgeError::Rejected)

pub mod client;
pub mod error;
pub mod types;

pub use client::FilenestClient;
pub use error::{FilenestError, Result};
pub use types::{ApiResponse, MediaDetailItem, MediaListItem, Page, PageData};

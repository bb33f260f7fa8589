//! HTTP client used to download generated images.
//!
//! Generated image URLs expire after a few hours, so the batch runner downloads
//! the bytes right after generation through this module.

mod client;

pub use client::{DownloadClient, DownloadClientBuilder, HttpClient, MockClient, MockResponse};

//! Tool fetching: bounded-concurrency downloads with verification.
//!
//! The fetcher walks a resolved tool set, reuses verified cache entries
//! where the expected hash still matches, and downloads the rest through a
//! [`ToolDownloader`]. Transient network failures are retried with bounded
//! exponential backoff; hash mismatches are never retried, because wrong
//! content from a mirror is a fact to surface, not a condition to wait out.

mod download;
mod fetch;

pub use download::{DownloadFailure, HttpDownloader, ToolDownloader};
pub use fetch::{
    DEFAULT_ATTEMPTS, DEFAULT_CONCURRENCY, DEFAULT_RETRY_BASE_DELAY, FetchFailure, FetchMode,
    FetchOptions, FetchReport, ToolFetcher,
};

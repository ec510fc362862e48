//! Batch fetch orchestration: cache reuse, retries, bounded concurrency,
//! and the fail-fast / best-effort batch policies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use opack_cache::{CacheEntry, ToolCache};
use opack_core::artifact::ToolReference;
use opack_core::resolve::ResolvedToolSet;
use opack_core::{Error, Result};

use crate::download::{DownloadFailure, ToolDownloader};

/// Default number of concurrent downloads.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of attempts per tool (first try plus retries).
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff between attempts.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Batch failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Any single tool's unrecoverable failure aborts the batch: in-flight
    /// downloads drain, no new ones start, and the first fatal error is
    /// reported.
    FailFast,
    /// Attempt every tool and report failures alongside successes.
    BestEffort,
}

/// Tuning knobs for a fetch batch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Worker limit for concurrent downloads.
    pub concurrency: usize,
    /// Attempts per tool before the download error escalates.
    pub attempts: u32,
    /// Base backoff delay, doubled after each failed attempt.
    pub retry_base_delay: Duration,
    /// Batch failure policy.
    pub mode: FetchMode,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            attempts: DEFAULT_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            mode: FetchMode::FailFast,
        }
    }
}

/// A tool that could not be fetched.
#[derive(Debug)]
pub struct FetchFailure {
    /// The tool identifier.
    pub identifier: String,
    /// Why it failed.
    pub error: Error,
}

/// Outcome of a fetch batch.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Successfully fetched (or reused) entries, keyed by identifier.
    pub fetched: BTreeMap<String, CacheEntry>,
    /// Tools that failed terminally.
    pub failed: Vec<FetchFailure>,
}

impl FetchReport {
    /// Whether every requested tool was fetched.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Fetched(String, CacheEntry),
    Failed(FetchFailure),
    Skipped,
}

/// Fetches resolved tool sets into a [`ToolCache`].
pub struct ToolFetcher<D> {
    downloader: D,
    options: FetchOptions,
}

impl<D: ToolDownloader> ToolFetcher<D> {
    /// Create a fetcher with default options.
    #[must_use]
    pub fn new(downloader: D) -> Self {
        Self::with_options(downloader, FetchOptions::default())
    }

    /// Create a fetcher with explicit options.
    #[must_use]
    pub fn with_options(downloader: D, options: FetchOptions) -> Self {
        Self {
            downloader,
            options,
        }
    }

    /// Fetch every tool in `tools`, reusing verified cache entries.
    ///
    /// Package assembly must not start until this returns: the call is the
    /// join point where all downloads have terminally completed.
    ///
    /// # Errors
    ///
    /// In fail-fast mode, returns the first unrecoverable per-tool error
    /// after in-flight downloads drain. In best-effort mode per-tool
    /// failures land in the report instead, and only infrastructure errors
    /// (none currently) would surface here.
    pub async fn fetch_all(
        &self,
        tools: &ResolvedToolSet,
        cache: &ToolCache,
    ) -> Result<FetchReport> {
        let abort = AtomicBool::new(false);
        let mut report = FetchReport::default();

        let mut outcomes = futures::stream::iter(
            tools
                .iter()
                .map(|tool| self.fetch_one(tool, cache, &abort)),
        )
        .buffer_unordered(self.options.concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Fetched(identifier, entry) => {
                    report.fetched.insert(identifier, entry);
                }
                Outcome::Failed(failure) => {
                    if self.options.mode == FetchMode::FailFast {
                        // Drain in-flight downloads, start no new ones.
                        abort.store(true, Ordering::Relaxed);
                    }
                    report.failed.push(failure);
                }
                Outcome::Skipped => {}
            }
        }

        if self.options.mode == FetchMode::FailFast && !report.failed.is_empty() {
            let first = report.failed.remove(0);
            warn!(tool = %first.identifier, "Aborting fetch batch");
            return Err(first.error);
        }

        info!(
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            "Fetch batch complete"
        );
        Ok(report)
    }

    async fn fetch_one(
        &self,
        tool: &ToolReference,
        cache: &ToolCache,
        abort: &AtomicBool,
    ) -> Outcome {
        if abort.load(Ordering::Relaxed) {
            debug!(tool = %tool.name, "Skipping fetch, batch aborted");
            return Outcome::Skipped;
        }

        match self.resolve_entry(tool, cache).await {
            Ok(entry) => Outcome::Fetched(tool.name.clone(), entry),
            Err(error) => {
                warn!(tool = %tool.name, %error, "Tool fetch failed");
                Outcome::Failed(FetchFailure {
                    identifier: tool.name.clone(),
                    error,
                })
            }
        }
    }

    async fn resolve_entry(&self, tool: &ToolReference, cache: &ToolCache) -> Result<CacheEntry> {
        if let Some(entry) = cache.lookup(&tool.name, &tool.expected_hash)? {
            info!(tool = %tool.name, hash = %entry.hash, "Reusing cached tool");
            return Ok(entry);
        }

        let bytes = self.download_with_retry(tool).await?;
        // A mismatch here is terminal: either the mirror serves wrong
        // content or the definition's hash is stale. Retrying cannot
        // distinguish the two, so neither is retried.
        cache.store(&tool.name, &tool.url, &bytes, &tool.expected_hash)
    }

    async fn download_with_retry(&self, tool: &ToolReference) -> Result<Vec<u8>> {
        let attempts = self.options.attempts.max(1);
        let mut delay = self.options.retry_base_delay;

        for attempt in 1..=attempts {
            debug!(tool = %tool.name, attempt, "Starting download attempt");
            match self.downloader.download(&tool.url).await {
                Ok(bytes) => return Ok(bytes),
                Err(DownloadFailure::Terminal(message)) => {
                    return Err(Error::download(&tool.name, &tool.url, attempt, message));
                }
                Err(DownloadFailure::Transient(message)) => {
                    if attempt == attempts {
                        return Err(Error::download(&tool.name, &tool.url, attempts, message));
                    }
                    warn!(
                        tool = %tool.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %message,
                        "Transient download failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        unreachable!("attempt loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opack_core::artifact::parse_artifact;
    use opack_core::hash::sha256_hex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const DATA: &[u8] = b"tool bytes";

    /// Scripted downloader: pops one canned response per call.
    #[derive(Default)]
    struct MockDownloader {
        responses: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<u8>, DownloadFailure>>>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl MockDownloader {
        fn respond(&self, url: &str, response: std::result::Result<Vec<u8>, DownloadFailure>) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ToolDownloader for MockDownloader {
        async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, DownloadFailure> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
            self.responses
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| panic!("unexpected download of {url}"))
        }
    }

    fn toolset(tools: &[(&str, &str)]) -> ResolvedToolSet {
        let mut text = String::from("name: T\ntype: CLIENT\nsources:\n  - query: SELECT 1\ntools:\n");
        for (name, hash) in tools {
            text.push_str(&format!(
                "  - name: {name}\n    url: https://example.com/{name}\n    expected_hash: {hash}\n"
            ));
        }
        let def = parse_artifact(&text).unwrap();
        let resolver = opack_core::resolve::DependencyResolver::new(vec![def]).unwrap();
        resolver.resolve(&["T".to_string()]).unwrap().tools
    }

    fn fast_options(mode: FetchMode) -> FetchOptions {
        FetchOptions {
            concurrency: 1,
            attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            mode,
        }
    }

    #[tokio::test]
    async fn test_download_verify_store() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        let tools = toolset(&[("t1", hash.as_str())]);

        let mock = MockDownloader::default();
        mock.respond("https://example.com/t1", Ok(DATA.to_vec()));

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));
        let report = fetcher.fetch_all(&tools, &cache).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.fetched.len(), 1);
        assert_eq!(report.fetched["t1"].hash, hash);
        assert!(cache.lookup("t1", hash.as_str()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_verified_cache_entry_is_reused() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        cache
            .store("t1", "https://example.com/t1", DATA, hash.as_str())
            .unwrap();

        let tools = toolset(&[("t1", hash.as_str())]);
        // No responses scripted: any download attempt panics the test.
        let mock = MockDownloader::default();
        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));

        let report = fetcher.fetch_all(&tools, &cache).await.unwrap();
        assert_eq!(report.fetched.len(), 1);
        assert_eq!(fetcher.downloader.calls("https://example.com/t1"), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        let tools = toolset(&[("t1", hash.as_str())]);

        let mock = MockDownloader::default();
        let url = "https://example.com/t1";
        mock.respond(url, Err(DownloadFailure::Transient("timeout".into())));
        mock.respond(url, Err(DownloadFailure::Transient("HTTP 503".into())));
        mock.respond(url, Ok(DATA.to_vec()));

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));
        let report = fetcher.fetch_all(&tools, &cache).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(fetcher.downloader.calls(url), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_escalates() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        let tools = toolset(&[("t1", hash.as_str())]);

        let mock = MockDownloader::default();
        let url = "https://example.com/t1";
        for _ in 0..3 {
            mock.respond(url, Err(DownloadFailure::Transient("timeout".into())));
        }

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));
        let err = fetcher.fetch_all(&tools, &cache).await.unwrap_err();

        match err {
            Error::Download { tool, attempts, .. } => {
                assert_eq!(tool, "t1");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected download error, got {other:?}"),
        }
        assert_eq!(fetcher.downloader.calls(url), 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        let tools = toolset(&[("t1", hash.as_str())]);

        let mock = MockDownloader::default();
        let url = "https://example.com/t1";
        mock.respond(url, Err(DownloadFailure::Terminal("HTTP 404".into())));

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));
        let err = fetcher.fetch_all(&tools, &cache).await.unwrap_err();

        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(fetcher.downloader.calls(url), 1);
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_never_retried_and_never_cached() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let expected = sha256_hex(DATA);
        let tools = toolset(&[("t1", expected.as_str())]);

        let mock = MockDownloader::default();
        let url = "https://example.com/t1";
        // Wrong bytes: hash will not match the declaration.
        mock.respond(url, Ok(b"compromised mirror content".to_vec()));

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));
        let err = fetcher.fetch_all(&tools, &cache).await.unwrap_err();

        match err {
            Error::HashMismatch { tool, expected: e, .. } => {
                assert_eq!(tool, "t1");
                assert_eq!(e, expected);
            }
            other => panic!("expected hash mismatch, got {other:?}"),
        }
        // Exactly one download, nothing in the cache.
        assert_eq!(fetcher.downloader.calls(url), 1);
        assert!(cache.lookup("t1", expected.as_str()).unwrap().is_none());
        assert!(cache.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_skips_queued_tools() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        // Identifier order determines schedule with concurrency 1.
        let tools = toolset(&[("a_broken", hash.as_str()), ("b_pending", hash.as_str())]);

        let mock = MockDownloader::default();
        mock.respond(
            "https://example.com/a_broken",
            Err(DownloadFailure::Terminal("HTTP 410".into())),
        );
        // b_pending intentionally unscripted: fetching it would panic.

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::FailFast));
        let err = fetcher.fetch_all(&tools, &cache).await.unwrap_err();

        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(fetcher.downloader.calls("https://example.com/b_pending"), 0);
    }

    #[tokio::test]
    async fn test_best_effort_reports_failures_alongside_successes() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolCache::new(tmp.path());
        let hash = sha256_hex(DATA);
        let tools = toolset(&[("a_broken", hash.as_str()), ("b_good", hash.as_str())]);

        let mock = MockDownloader::default();
        for _ in 0..3 {
            mock.respond(
                "https://example.com/a_broken",
                Err(DownloadFailure::Transient("connection reset".into())),
            );
        }
        mock.respond("https://example.com/b_good", Ok(DATA.to_vec()));

        let fetcher = ToolFetcher::with_options(mock, fast_options(FetchMode::BestEffort));
        let report = fetcher.fetch_all(&tools, &cache).await.unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.fetched.len(), 1);
        assert!(report.fetched.contains_key("b_good"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].identifier, "a_broken");
    }
}

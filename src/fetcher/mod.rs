mod client;

use std::path::PathBuf;

use futures::{future, stream, StreamExt};
use log::{debug, info, warn};

pub use client::{ArchiveClient, DEFAULT_BASE_URL};

use crate::error::{ActivityError, Result};
use crate::store::ArtifactStore;
use crate::timestamp::TimestampKey;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub concurrency: usize,
    /// Download again even when the archive is already on disk.
    pub force: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: usize,
    pub failed: usize,
}

async fn fetch_one(
    client: &ArchiveClient,
    store: &ArtifactStore,
    timestamp: TimestampKey,
) -> Result<PathBuf> {
    let bytes = client.fetch_archive(timestamp).await?;
    store.write_archive(timestamp, &bytes)
}

/// Downloads every archive in `timestamps` into the store.
///
/// Each outcome is logged as soon as its download completes. Failures never
/// stop the batch.
pub async fn fetch_all(
    client: &ArchiveClient,
    store: &ArtifactStore,
    timestamps: &[TimestampKey],
    options: &FetchOptions,
) -> FetchSummary {
    let pending: Vec<TimestampKey> = timestamps
        .iter()
        .copied()
        .filter(|ts| options.force || !store.has_archive(*ts))
        .collect();

    let mut summary = FetchSummary {
        skipped: timestamps.len() - pending.len(),
        ..FetchSummary::default()
    };

    info!(
        "Fetching {} archives ({} already present)...",
        pending.len(),
        summary.skipped
    );

    stream::iter(pending)
        .map(|ts| async move { (ts, fetch_one(client, store, ts).await) })
        .buffer_unordered(options.concurrency.max(1))
        .for_each(|(timestamp, result)| {
            match result {
                Ok(path) => {
                    debug!("Saved {}", path.display());
                    summary.downloaded += 1;
                }
                Err(ActivityError::ArchiveMissing(_)) => {
                    warn!("No archive published for {timestamp}");
                    summary.missing += 1;
                }
                Err(e) => {
                    warn!("Error fetching archive with timestamp = {timestamp}: {e}");
                    summary.failed += 1;
                }
            }
            future::ready(())
        })
        .await;

    info!(
        "Fetched {} archives ({} missing, {} failed)",
        summary.downloaded, summary.missing, summary.failed
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> TimestampKey {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_all_tolerates_missing_hours() {
        let mut server = mockito::Server::new_async().await;
        let found = server
            .mock("GET", "/2015-01-01-0.json.gz")
            .with_status(200)
            .with_body(b"hour zero")
            .create_async()
            .await;
        let gone = server
            .mock("GET", "/2015-01-01-1.json.gz")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 2015);
        store.write_archive(ts("2015-01-01-2"), b"cached").unwrap();

        let client = ArchiveClient::new(&server.url()).unwrap();
        let summary = fetch_all(
            &client,
            &store,
            &[ts("2015-01-01-0"), ts("2015-01-01-1"), ts("2015-01-01-2")],
            &FetchOptions::default(),
        )
        .await;

        assert_eq!(
            summary,
            FetchSummary {
                downloaded: 1,
                skipped: 1,
                missing: 1,
                failed: 0,
            }
        );
        found.assert_async().await;
        gone.assert_async().await;

        let saved = std::fs::read(store.archive_path(ts("2015-01-01-0"))).unwrap();
        assert_eq!(saved, b"hour zero");
        assert!(!store.has_archive(ts("2015-01-01-1")));
        let cached = std::fs::read(store.archive_path(ts("2015-01-01-2"))).unwrap();
        assert_eq!(cached, b"cached");
    }

    #[tokio::test]
    async fn test_fetch_all_force_overwrites() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/2015-03-01-4.json.gz")
            .with_status(200)
            .with_body(b"fresh")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 2015);
        store.write_archive(ts("2015-03-01-4"), b"stale").unwrap();

        let client = ArchiveClient::new(&server.url()).unwrap();
        let options = FetchOptions {
            force: true,
            ..FetchOptions::default()
        };
        let summary = fetch_all(&client, &store, &[ts("2015-03-01-4")], &options).await;

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.skipped, 0);
        mock.assert_async().await;

        let saved = std::fs::read(store.archive_path(ts("2015-03-01-4"))).unwrap();
        assert_eq!(saved, b"fresh");
    }

    #[tokio::test]
    async fn test_fetch_all_counts_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/2015-01-01-0.json.gz")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 2015);
        let client = ArchiveClient::new(&server.url()).unwrap();

        let summary = fetch_all(
            &client,
            &store,
            &[ts("2015-01-01-0")],
            &FetchOptions::default(),
        )
        .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.downloaded, 0);
    }

    #[tokio::test]
    async fn test_fetch_all_mixed_outcomes_counted_once_each() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for (hour, status) in [(0, 200), (1, 404), (2, 500), (3, 200), (4, 404)] {
            mocks.push(
                server
                    .mock("GET", format!("/2015-01-01-{hour}.json.gz").as_str())
                    .with_status(status)
                    .with_body(b"body")
                    .create_async()
                    .await,
            );
        }

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 2015);
        let client = ArchiveClient::new(&server.url()).unwrap();
        let timestamps: Vec<TimestampKey> = (0..5)
            .map(|hour| ts(&format!("2015-01-01-{hour}")))
            .collect();
        let options = FetchOptions {
            concurrency: 2,
            ..FetchOptions::default()
        };

        let summary = fetch_all(&client, &store, &timestamps, &options).await;

        assert_eq!(
            summary,
            FetchSummary {
                downloaded: 2,
                skipped: 0,
                missing: 2,
                failed: 1,
            }
        );
        for mock in &mocks {
            mock.assert_async().await;
        }
        assert!(store.has_archive(ts("2015-01-01-0")));
        assert!(store.has_archive(ts("2015-01-01-3")));
        assert!(!store.has_archive(ts("2015-01-01-2")));
    }
}

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{info, warn};

use crate::error::{ActivityError, Result};
use crate::models::ActivityTable;
use crate::store::{ArtifactKind, ArtifactStore};
use crate::timestamp::TimestampKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateReport {
    pub kind: ArtifactKind,
    pub merged: usize,
    pub skipped: usize,
    pub entries: usize,
    pub path: PathBuf,
}

/// Walks every present per-hour artifact of `kind` in chronological order.
///
/// Artifacts that exist but fail to load are logged and skipped. Returns the
/// `(merged, skipped)` hour counts.
pub(crate) fn for_each_artifact<T, L, F>(
    store: &ArtifactStore,
    kind: ArtifactKind,
    load: L,
    mut apply: F,
) -> Result<(usize, usize)>
where
    L: Fn(&ArtifactStore, TimestampKey) -> Result<T>,
    F: FnMut(T),
{
    let timestamps = store.list_available_timestamps(Some(kind))?;
    let mut merged = 0;
    let mut skipped = 0;

    for timestamp in timestamps {
        match load(store, timestamp) {
            Ok(value) => {
                apply(value);
                merged += 1;
            }
            Err(e) => {
                warn!("Skipping {kind} artifact for {timestamp}: {e}");
                skipped += 1;
            }
        }
    }

    Ok((merged, skipped))
}

fn unexpected(store: &ArtifactStore, timestamp: TimestampKey, kind: ArtifactKind) -> ActivityError {
    ActivityError::UnexpectedPayload {
        path: store.artifact_path(timestamp, kind),
        reason: format!("expected {kind} payload"),
    }
}

/// Unions the per-hour `actors` or `repos` collections into `all-<kind>`.
pub fn aggregate_identifiers(store: &ArtifactStore, kind: ArtifactKind) -> Result<AggregateReport> {
    if !matches!(kind, ArtifactKind::Actors | ArtifactKind::Repos) {
        return Err(ActivityError::ConfigError(format!(
            "cannot union {kind} artifacts, expected actors or repos"
        )));
    }

    info!("Aggregating {kind} in {}", store.root().display());

    let mut union: BTreeSet<String> = BTreeSet::new();
    let (merged, skipped) = for_each_artifact(
        store,
        kind,
        |store, ts| {
            store
                .load_artifact(ts, kind)?
                .into_identifiers()
                .ok_or_else(|| unexpected(store, ts, kind))
        },
        |ids| union.extend(ids),
    )?;

    let path = store.save_global(kind, &union)?;
    info!(
        "Wrote {} distinct {kind} from {merged} hours to {}",
        union.len(),
        path.display()
    );

    Ok(AggregateReport {
        kind,
        merged,
        skipped,
        entries: union.len(),
        path,
    })
}

/// Sums every per-hour activity table into `all-activity`.
pub fn aggregate_activity(store: &ArtifactStore) -> Result<AggregateReport> {
    let kind = ArtifactKind::Activity;
    info!("Aggregating {kind} in {}", store.root().display());

    let mut total = ActivityTable::new();
    let (merged, skipped) = for_each_artifact(
        store,
        kind,
        |store, ts| {
            store
                .load_artifact(ts, kind)?
                .into_activity()
                .ok_or_else(|| unexpected(store, ts, kind))
        },
        |table| total.merge(&table),
    )?;

    if total.is_empty() {
        warn!("No activity found in {}", store.root().display());
    }

    let path = store.save_global(kind, &total)?;
    info!(
        "Wrote activity of {} actors ({} events) from {merged} hours to {}",
        total.actor_count(),
        total.total(),
        path.display()
    );

    Ok(AggregateReport {
        kind,
        merged,
        skipped,
        entries: total.actor_count(),
        path,
    })
}

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::aggregator::for_each_artifact;
use crate::error::{ActivityError, Result};
use crate::models::OwnershipMap;
use crate::store::{ArtifactKind, ArtifactStore};

/// Arrival-ordered repo counts per actor, actors in priority order.
pub type ActorRepoCounts = IndexMap<String, IndexMap<String, u64>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipReport {
    pub actors: usize,
    pub owned_repos: usize,
    pub unknown_actors: usize,
    pub merged: usize,
    pub skipped: usize,
    pub path: PathBuf,
}

/// Shuffles `items` with a generator seeded from `seed`.
///
/// Only a fixed, arbitrary order is needed, so the same seed and input always
/// give the same permutation.
pub fn seeded_permutation<T>(items: &mut [T], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
}

/// Each actor, in priority order, claims the still-unclaimed repos it touched,
/// in the order it first touched them. Repos outside `claimable` are ignored.
pub fn assign_ownership(counts: &ActorRepoCounts, claimable: &HashSet<String>) -> OwnershipMap {
    let mut remaining = claimable.clone();

    counts
        .iter()
        .map(|(actor, repos)| {
            let owned: Vec<String> = repos
                .keys()
                .filter(|repo| remaining.remove(repo.as_str()))
                .cloned()
                .collect();
            (actor.clone(), owned)
        })
        .collect()
}

/// Builds `all-ownership` from the global actor and repo sets and every
/// per-hour event list.
///
/// Requires `all-actors` and `all-repos` to exist.
pub fn derive_ownership(store: &ArtifactStore, seed: u64) -> Result<OwnershipReport> {
    let mut actors = load_global_identifiers(store, ArtifactKind::Actors)?;
    let repos: HashSet<String> = load_global_identifiers(store, ArtifactKind::Repos)?
        .into_iter()
        .collect();

    // Serialized order of the global set is not stable, so normalize first.
    actors.sort();
    actors.dedup();
    seeded_permutation(&mut actors, seed);

    info!(
        "Deriving ownership for {} actors over {} repos (seed {seed})",
        actors.len(),
        repos.len()
    );

    let mut counts: ActorRepoCounts = actors
        .into_iter()
        .map(|actor| (actor, IndexMap::new()))
        .collect();
    let mut unknown_actors: usize = 0;

    let kind = ArtifactKind::Events;
    let (merged, skipped) = for_each_artifact(
        store,
        kind,
        |store, ts| {
            store
                .load_artifact(ts, kind)?
                .into_events()
                .ok_or_else(|| ActivityError::UnexpectedPayload {
                    path: store.artifact_path(ts, kind),
                    reason: format!("expected {kind} payload"),
                })
        },
        |events| {
            for (actor, repo) in events {
                match counts.get_mut(&actor) {
                    Some(repos) => *repos.entry(repo).or_insert(0) += 1,
                    None => unknown_actors += 1,
                }
            }
        },
    )?;

    if unknown_actors > 0 {
        warn!("{unknown_actors} events reference actors missing from all-actors");
    }

    let ownership = assign_ownership(&counts, &repos);
    let owned_repos: usize = ownership.values().map(Vec::len).sum();

    let path = store.save_global(ArtifactKind::Ownership, &ownership)?;
    info!(
        "Assigned {owned_repos} repos to {} actors in {}",
        ownership.len(),
        path.display()
    );

    Ok(OwnershipReport {
        actors: ownership.len(),
        owned_repos,
        unknown_actors,
        merged,
        skipped,
        path,
    })
}

fn load_global_identifiers(store: &ArtifactStore, kind: ArtifactKind) -> Result<Vec<String>> {
    store
        .load_global(kind)?
        .into_identifiers()
        .ok_or_else(|| ActivityError::UnexpectedPayload {
            path: store.global_path(kind),
            reason: format!("expected {kind} list"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Artifact;
    use crate::timestamp::TimestampKey;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn counts(entries: &[(&str, Vec<&str>)]) -> ActorRepoCounts {
        entries
            .iter()
            .map(|(actor, repos)| {
                let repos: IndexMap<String, u64> =
                    repos.iter().map(|r| ((*r).to_string(), 1)).collect();
                ((*actor).to_string(), repos)
            })
            .collect()
    }

    fn pair(actor: &str, repo: &str) -> (String, String) {
        (actor.to_string(), repo.to_string())
    }

    #[test]
    fn test_seeded_permutation_is_reproducible() {
        let original: Vec<u32> = (0..50).collect();

        let mut first = original.clone();
        seeded_permutation(&mut first, 42);
        let mut second = original.clone();
        seeded_permutation(&mut second, 42);

        assert_eq!(first, second);
    }

    #[test]
    fn test_seeded_permutation_keeps_every_item() {
        let original: Vec<u32> = (0..50).collect();
        let mut shuffled = original.clone();
        seeded_permutation(&mut shuffled, 7);

        let mut sorted = shuffled.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, original);
    }

    #[test]
    fn test_seeded_permutation_depends_on_seed() {
        let original: Vec<u32> = (0..50).collect();

        let mut a = original.clone();
        seeded_permutation(&mut a, 1);
        let mut b = original.clone();
        seeded_permutation(&mut b, 2);

        assert_ne!(a, b);
    }

    #[test]
    fn test_assign_ownership_first_actor_wins() {
        let counts = counts(&[
            ("b", vec!["r1", "r2"]),
            ("a", vec!["r2", "r3"]),
            ("c", vec![]),
        ]);
        let claimable: HashSet<String> = strings(&["r1", "r2", "r3"]).into_iter().collect();

        let ownership = assign_ownership(&counts, &claimable);

        assert_eq!(ownership.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(ownership["b"], strings(&["r1", "r2"]));
        assert_eq!(ownership["a"], strings(&["r3"]));
        assert!(ownership["c"].is_empty());
    }

    #[test]
    fn test_assign_ownership_ignores_unknown_repos() {
        let counts = counts(&[("a", vec!["r9", "r1"])]);
        let claimable: HashSet<String> = strings(&["r1"]).into_iter().collect();

        let ownership = assign_ownership(&counts, &claimable);

        assert_eq!(ownership["a"], strings(&["r1"]));
    }

    #[test]
    fn test_derive_ownership_requires_global_actors() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 2015);

        let err = derive_ownership(&store, 0).unwrap_err();
        assert!(matches!(err, ActivityError::MissingArtifact(_)));
    }

    #[test]
    fn test_derive_ownership_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), 2015);
        let ts = |s: &str| s.parse::<TimestampKey>().unwrap();

        store
            .save_global(ArtifactKind::Actors, &strings(&["a", "b"]))
            .unwrap();
        store
            .save_global(ArtifactKind::Repos, &strings(&["r1", "r2", "r3"]))
            .unwrap();
        store
            .save_artifact(
                ts("2015-01-01-0"),
                ArtifactKind::Events,
                &vec![pair("a", "r1"), pair("b", "r1"), pair("ghost", "r3")],
            )
            .unwrap();
        store
            .save_artifact(
                ts("2015-01-01-1"),
                ArtifactKind::Events,
                &vec![pair("b", "r2"), pair("a", "r2"), pair("a", "r3")],
            )
            .unwrap();

        let report = derive_ownership(&store, 3).unwrap();
        assert_eq!(report.actors, 2);
        assert_eq!(report.owned_repos, 3);
        assert_eq!(report.unknown_actors, 1);
        assert_eq!(report.merged, 2);

        let Artifact::Ownership(ownership) = store.load_global(ArtifactKind::Ownership).unwrap()
        else {
            panic!("expected ownership payload");
        };

        let mut owned: Vec<String> = ownership.values().flatten().cloned().collect();
        owned.sort();
        assert_eq!(owned, strings(&["r1", "r2", "r3"]));

        // Same seed, same result.
        let first = std::fs::read(store.global_path(ArtifactKind::Ownership)).unwrap();
        derive_ownership(&store, 3).unwrap();
        let second = std::fs::read(store.global_path(ArtifactKind::Ownership)).unwrap();
        assert_eq!(first, second);
    }
}

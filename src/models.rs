use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One `(actor, repo)` observation, serialized as a two-element array.
pub type EventPair = (String, String);

/// actor -> repos it claimed, in actor priority order.
pub type OwnershipMap = IndexMap<String, Vec<String>>;

/// Sink for the pairs extracted from an event stream.
pub trait Accumulator {
    fn record(&mut self, actor: &str, repo: &str);
}

/// actor -> repo -> number of events.
///
/// Actors and repos without activity are absent rather than stored with a
/// zero count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityTable(BTreeMap<String, BTreeMap<String, u64>>);

impl ActivityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, actor: &str, repo: &str, count: u64) {
        if count == 0 {
            return;
        }

        *self
            .0
            .entry(actor.to_string())
            .or_default()
            .entry(repo.to_string())
            .or_insert(0) += count;
    }

    /// Sums every count of `other` into `self`.
    pub fn merge(&mut self, other: &ActivityTable) {
        for (actor, repos) in &other.0 {
            for (repo, count) in repos {
                self.add(actor, repo, *count);
            }
        }
    }

    pub fn get(&self, actor: &str, repo: &str) -> u64 {
        self.0
            .get(actor)
            .and_then(|repos| repos.get(repo))
            .copied()
            .unwrap_or(0)
    }

    pub fn actor_count(&self) -> usize {
        self.0.len()
    }

    pub fn total(&self) -> u64 {
        self.0.values().flat_map(BTreeMap::values).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Accumulator for ActivityTable {
    fn record(&mut self, actor: &str, repo: &str) {
        self.add(actor, repo, 1);
    }
}

/// Distinct actors and repos of one hour, plus every pair in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSets {
    pub actors: BTreeSet<String>,
    pub repos: BTreeSet<String>,
    pub events: Vec<EventPair>,
}

impl IdentifierSets {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for IdentifierSets {
    fn record(&mut self, actor: &str, repo: &str) {
        if !self.actors.contains(actor) {
            self.actors.insert(actor.to_string());
        }
        if !self.repos.contains(repo) {
            self.repos.insert(repo.to_string());
        }
        self.events.push((actor.to_string(), repo.to_string()));
    }
}

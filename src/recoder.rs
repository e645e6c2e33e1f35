use std::io::BufRead;

use clap::ValueEnum;
use log::{info, warn};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Accumulator, ActivityTable, IdentifierSets};
use crate::store::{ArtifactKind, ArtifactStore};
use crate::timestamp::TimestampKey;

/// Where the actor and repo identifiers live inside an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FieldPath {
    /// `actor.url` and `repo.url`
    Url,
    /// `actor.login` and `repo.name`
    Login,
}

impl FieldPath {
    fn pointers(self) -> (&'static str, &'static str) {
        match self {
            Self::Url => ("/actor/url", "/repo/url"),
            Self::Login => ("/actor/login", "/repo/name"),
        }
    }
}

/// Shape of the per-hour output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Distinct actors, distinct repos and the raw pair list
    Sets,
    /// Nested actor -> repo -> count table
    Activity,
}

impl OutputMode {
    pub fn default_fields(self) -> FieldPath {
        match self {
            Self::Sets => FieldPath::Url,
            Self::Activity => FieldPath::Login,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecodeReport {
    pub extracted: usize,
    pub lost: usize,
}

impl RecodeReport {
    pub fn records(&self) -> usize {
        self.extracted + self.lost
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecodeSummary {
    pub completed: usize,
    pub failed: usize,
    pub extracted: usize,
    pub lost: usize,
}

/// Pulls the `(actor, repo)` identifiers out of one decoded record.
///
/// Absent fields and non-string values both yield `None`.
pub fn extract_pair(event: &Value, fields: FieldPath) -> Option<(&str, &str)> {
    let (actor_ptr, repo_ptr) = fields.pointers();
    let actor = event.pointer(actor_ptr)?.as_str()?;
    let repo = event.pointer(repo_ptr)?.as_str()?;
    Some((actor, repo))
}

/// Feeds every well-formed record of `reader` into `acc`.
///
/// Blank lines are not records. Lines that are not valid UTF-8 JSON or lack
/// either identifier are counted as lost. Read errors abort with `Err`.
pub fn extract_into<R, A>(reader: R, fields: FieldPath, acc: &mut A) -> Result<RecodeReport>
where
    R: BufRead,
    A: Accumulator + ?Sized,
{
    let mut report = RecodeReport::default();

    for line in reader.split(b'\n') {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let Ok(event) = serde_json::from_slice::<Value>(&line) else {
            report.lost += 1;
            continue;
        };

        match extract_pair(&event, fields) {
            Some((actor, repo)) => {
                acc.record(actor, repo);
                report.extracted += 1;
            }
            None => report.lost += 1,
        }
    }

    Ok(report)
}

pub struct Recoder<'a> {
    store: &'a ArtifactStore,
    mode: OutputMode,
    fields: FieldPath,
}

impl<'a> Recoder<'a> {
    pub fn new(store: &'a ArtifactStore, mode: OutputMode, fields: Option<FieldPath>) -> Self {
        Self {
            store,
            mode,
            fields: fields.unwrap_or_else(|| mode.default_fields()),
        }
    }

    /// Recodes one hourly archive and writes its per-hour artifacts.
    pub fn recode(&self, timestamp: TimestampKey) -> Result<RecodeReport> {
        let archive = self.store.archive_path(timestamp);
        info!("converting {} ...", archive.display());

        let reader = self.store.open_archive(timestamp)?;

        let report = match self.mode {
            OutputMode::Sets => {
                let mut sets = IdentifierSets::new();
                let report = extract_into(reader, self.fields, &mut sets)?;

                self.store
                    .save_artifact(timestamp, ArtifactKind::Actors, &sets.actors)?;
                self.store
                    .save_artifact(timestamp, ArtifactKind::Repos, &sets.repos)?;
                self.store
                    .save_artifact(timestamp, ArtifactKind::Events, &sets.events)?;
                report
            }
            OutputMode::Activity => {
                let mut activity = ActivityTable::new();
                let report = extract_into(reader, self.fields, &mut activity)?;

                self.store
                    .save_artifact(timestamp, ArtifactKind::Activity, &activity)?;
                report
            }
        };

        if report.lost > 0 {
            warn!("lost {} events from {}", report.lost, archive.display());
        }
        info!(
            "converted {timestamp}: {} of {} events kept",
            report.extracted,
            report.records()
        );

        Ok(report)
    }

    /// Recodes each timestamp in turn. A failing timestamp is logged and
    /// skipped.
    pub fn recode_batch(&self, timestamps: &[TimestampKey]) -> RecodeSummary {
        let mut summary = RecodeSummary::default();

        for &timestamp in timestamps {
            match self.recode(timestamp) {
                Ok(report) => {
                    summary.completed += 1;
                    summary.extracted += report.extracted;
                    summary.lost += report.lost;
                }
                Err(e) => {
                    warn!("Error converting log file with timestamp = {timestamp}: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

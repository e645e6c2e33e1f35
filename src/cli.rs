use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;

use crate::aggregator::{aggregate_activity, aggregate_identifiers, AggregateReport};
use crate::fetcher::{self, ArchiveClient, FetchOptions, DEFAULT_BASE_URL, DEFAULT_CONCURRENCY};
use crate::ordering::derive_ownership;
use crate::recoder::{FieldPath, OutputMode, Recoder};
use crate::store::{ArtifactKind, ArtifactStore};
use crate::timestamp::{year_timestamps, TimestampKey};

#[derive(Parser)]
#[command(name = "ghactivity")]
#[command(author, version, about = "GitHub archive activity tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding archives and artifacts
    #[arg(short, long, global = true, env = "GHACTIVITY_DIR", default_value = ".")]
    dir: PathBuf,

    /// Year whose hourly archives are processed
    #[arg(short, long, global = true, env = "GHACTIVITY_YEAR", default_value_t = 2015)]
    year: i32,
}

#[derive(Subcommand)]
enum Commands {
    /// Download hourly event archives
    Fetch {
        /// Timestamps to download (YYYY-MM-DD-H); defaults to every hour of the year
        timestamps: Vec<String>,

        /// Archive server base URL
        #[arg(short, long, env = "GHACTIVITY_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Number of downloads in flight
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Download again even if the archive already exists
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },

    /// Recode hourly archives into per-hour artifacts
    Recode {
        /// Timestamps to convert (YYYY-MM-DD-H); defaults to every archive in the directory
        timestamps: Vec<String>,

        /// Per-hour output shape
        #[arg(short, long, value_enum, default_value_t = OutputMode::Sets)]
        mode: OutputMode,

        /// Identifier fields to extract (defaults: url for sets, login for activity)
        #[arg(long, value_enum)]
        fields: Option<FieldPath>,
    },

    /// Merge per-hour artifacts into whole-year artifacts
    Aggregate {
        #[arg(value_enum, default_value_t = AggregateTarget::Sets)]
        target: AggregateTarget,
    },

    /// Derive a seeded actor priority and the repos each actor claims
    Order {
        /// Seed for the actor permutation
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AggregateTarget {
    Actors,
    Repos,
    /// Both actors and repos
    Sets,
    Activity,
}

/// Parses explicit timestamps, logging and counting the invalid ones.
fn parse_timestamps(raw: &[String]) -> (Vec<TimestampKey>, usize) {
    let mut invalid = 0;
    let timestamps: Vec<TimestampKey> = raw
        .iter()
        .filter_map(|value| match value.parse::<TimestampKey>() {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("{e}");
                invalid += 1;
                None
            }
        })
        .collect();

    (timestamps, invalid)
}

fn warn_outside_year(timestamps: &[TimestampKey], year: i32) {
    for ts in timestamps.iter().filter(|ts| ts.year() != year) {
        warn!("{ts} is outside {year}; later discovery passes will not see it");
    }
}

fn log_report(report: &AggregateReport) {
    if report.skipped > 0 {
        warn!(
            "{} {} artifacts could not be read and were skipped",
            report.skipped, report.kind
        );
    }
    info!(
        "{}: {} entries from {} hours written to {}",
        report.kind,
        report.entries,
        report.merged,
        report.path.display()
    );
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let store = ArtifactStore::new(&self.dir, self.year);

        match &self.command {
            Commands::Fetch {
                timestamps,
                base_url,
                concurrency,
                force,
            } => {
                let (timestamps, invalid) = if timestamps.is_empty() {
                    (year_timestamps(store.year()).collect(), 0)
                } else {
                    parse_timestamps(timestamps)
                };
                warn_outside_year(&timestamps, store.year());

                let client = ArchiveClient::new(base_url)?;
                let options = FetchOptions {
                    concurrency: *concurrency,
                    force: *force,
                };
                let summary = fetcher::fetch_all(&client, &store, &timestamps, &options).await;

                info!(
                    "Fetch finished: {} downloaded, {} skipped, {} missing, {} failed, {} invalid",
                    summary.downloaded, summary.skipped, summary.missing, summary.failed, invalid
                );
                Ok(())
            }
            Commands::Recode {
                timestamps,
                mode,
                fields,
            } => {
                let (timestamps, invalid) = if timestamps.is_empty() {
                    info!(
                        "No timestamps provided, converting all archives in {}",
                        store.root().display()
                    );
                    (store.list_available_timestamps(None)?, 0)
                } else {
                    parse_timestamps(timestamps)
                };
                warn_outside_year(&timestamps, store.year());

                let recoder = Recoder::new(&store, *mode, *fields);
                let summary = recoder.recode_batch(&timestamps);

                info!(
                    "Recode finished: {} converted, {} failed, {} invalid, {} events kept, {} lost",
                    summary.completed, summary.failed, invalid, summary.extracted, summary.lost
                );
                Ok(())
            }
            Commands::Aggregate { target } => {
                let reports = match target {
                    AggregateTarget::Actors => {
                        vec![aggregate_identifiers(&store, ArtifactKind::Actors)?]
                    }
                    AggregateTarget::Repos => {
                        vec![aggregate_identifiers(&store, ArtifactKind::Repos)?]
                    }
                    AggregateTarget::Sets => vec![
                        aggregate_identifiers(&store, ArtifactKind::Actors)?,
                        aggregate_identifiers(&store, ArtifactKind::Repos)?,
                    ],
                    AggregateTarget::Activity => vec![aggregate_activity(&store)?],
                };

                reports.iter().for_each(log_report);
                Ok(())
            }
            Commands::Order { seed } => {
                let report = derive_ownership(&store, *seed)?;

                info!(
                    "Ownership written to {}: {} actors, {} repos claimed, {} events from unknown actors",
                    report.path.display(),
                    report.actors,
                    report.owned_repos,
                    report.unknown_actors
                );
                Ok(())
            }
        }
    }
}

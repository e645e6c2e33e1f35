use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ActivityError, Result};
use crate::models::{ActivityTable, EventPair, OwnershipMap};
use crate::timestamp::{year_timestamps, TimestampKey};

/// Extension shared by raw archives and every derived artifact.
pub const EXTENSION: &str = "json.gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Actors,
    Repos,
    Events,
    Activity,
    Ownership,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actors => "actors",
            Self::Repos => "repos",
            Self::Events => "events",
            Self::Activity => "activity",
            Self::Ownership => "ownership",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded payload of one artifact file.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Identifiers(Vec<String>),
    Events(Vec<EventPair>),
    Activity(ActivityTable),
    Ownership(OwnershipMap),
}

impl Artifact {
    pub fn into_identifiers(self) -> Option<Vec<String>> {
        match self {
            Self::Identifiers(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn into_events(self) -> Option<Vec<EventPair>> {
        match self {
            Self::Events(events) => Some(events),
            _ => None,
        }
    }

    pub fn into_activity(self) -> Option<ActivityTable> {
        match self {
            Self::Activity(table) => Some(table),
            _ => None,
        }
    }
}

/// The on-disk layout shared by every stage.
///
/// - `<ts>.json.gz`: raw hourly archive
/// - `<ts>-<kind>.json.gz`: per-hour artifact
/// - `all-<kind>.json.gz`: global artifact
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    year: i32,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, year: i32) -> Self {
        Self {
            root: root.into(),
            year,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    fn file_name(timestamp: TimestampKey, kind: Option<ArtifactKind>) -> String {
        match kind {
            Some(kind) => format!("{timestamp}-{kind}.{EXTENSION}"),
            None => format!("{timestamp}.{EXTENSION}"),
        }
    }

    pub fn archive_path(&self, timestamp: TimestampKey) -> PathBuf {
        self.root.join(Self::file_name(timestamp, None))
    }

    pub fn artifact_path(&self, timestamp: TimestampKey, kind: ArtifactKind) -> PathBuf {
        self.root.join(Self::file_name(timestamp, Some(kind)))
    }

    pub fn global_path(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!("all-{kind}.{EXTENSION}"))
    }

    /// Timestamps of the configured year whose file exists, in chronological
    /// order. `None` looks for raw archives, `Some(kind)` for per-hour
    /// artifacts of that kind.
    pub fn list_available_timestamps(
        &self,
        kind: Option<ArtifactKind>,
    ) -> Result<Vec<TimestampKey>> {
        let present: HashSet<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();

        let timestamps: Vec<_> = year_timestamps(self.year)
            .filter(|ts| present.contains(&Self::file_name(*ts, kind)))
            .collect();

        debug!(
            "Discovered {} {} files in {}",
            timestamps.len(),
            kind.map_or("archive", ArtifactKind::as_str),
            self.root.display()
        );

        Ok(timestamps)
    }

    /// Opens the decompressed line stream of a raw archive.
    ///
    /// Concatenated gzip members are read through to the end.
    pub fn open_archive(
        &self,
        timestamp: TimestampKey,
    ) -> Result<BufReader<MultiGzDecoder<File>>> {
        let file = File::open(self.archive_path(timestamp)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ActivityError::ArchiveMissing(timestamp)
            } else {
                ActivityError::IoError(e)
            }
        })?;

        Ok(BufReader::new(MultiGzDecoder::new(file)))
    }

    pub fn has_archive(&self, timestamp: TimestampKey) -> bool {
        self.archive_path(timestamp).is_file()
    }

    /// Stores already-compressed archive bytes under the timestamp's name.
    pub fn write_archive(&self, timestamp: TimestampKey, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.archive_path(timestamp);
        let tmp = temp_path(&path);

        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        Ok(path)
    }

    pub fn load_artifact(&self, timestamp: TimestampKey, kind: ArtifactKind) -> Result<Artifact> {
        load_kind(&self.artifact_path(timestamp, kind), kind)
    }

    pub fn load_global(&self, kind: ArtifactKind) -> Result<Artifact> {
        load_kind(&self.global_path(kind), kind)
    }

    pub fn save_artifact<T: Serialize + ?Sized>(
        &self,
        timestamp: TimestampKey,
        kind: ArtifactKind,
        value: &T,
    ) -> Result<PathBuf> {
        let path = self.artifact_path(timestamp, kind);
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn save_global<T: Serialize + ?Sized>(
        &self,
        kind: ArtifactKind,
        value: &T,
    ) -> Result<PathBuf> {
        let path = self.global_path(kind);
        write_json(&path, value)?;
        Ok(path)
    }
}

fn load_kind(path: &Path, kind: ArtifactKind) -> Result<Artifact> {
    let artifact = match kind {
        ArtifactKind::Actors | ArtifactKind::Repos => Artifact::Identifiers(read_json(path)?),
        ArtifactKind::Events => Artifact::Events(read_json(path)?),
        ArtifactKind::Activity => Artifact::Activity(read_json(path)?),
        ArtifactKind::Ownership => Artifact::Ownership(read_json(path)?),
    };
    Ok(artifact)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reads a gzip-compressed JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ActivityError::MissingArtifact(path.to_path_buf())
        } else {
            ActivityError::IoError(e)
        }
    })?;

    let reader = BufReader::new(MultiGzDecoder::new(file));
    serde_json::from_reader(reader).map_err(|e| {
        if e.is_io() {
            ActivityError::IoError(e.into())
        } else {
            ActivityError::UnexpectedPayload {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })
}

/// Writes `value` as gzip-compressed JSON, replacing `path` only once the
/// whole document is on disk.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = temp_path(path);

    let file = File::create(&tmp)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, value)?;
    encoder.finish()?.flush()?;

    fs::rename(&tmp, path)?;
    Ok(())
}

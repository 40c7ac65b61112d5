//! Durable storage of the last known matching slots.
//!
//! One slot per line as `{date} {weekday}\t{time}`, e.g.
//! `2024-06-01 Saturday\t10:00`. Every save rewrites the whole file; a missing
//! file is an empty snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::request::{DATE_FORMAT, TIME_FORMAT};
use crate::slot::{Slot, Snapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {action} snapshot at {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt snapshot line {line}: {content:?}")]
    Corrupt { line: usize, content: String },
}

/// Sole reader and writer of the persisted snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file is not an error.
    pub fn load(&self) -> Result<Snapshot, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::empty()),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        decode(&content).map(Snapshot::new)
    }

    /// Replace the persisted snapshot with `snapshot`.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                action: "create directory for",
                path: self.path.clone(),
                source,
            })?;
        }

        // Written beside the target and renamed over it, so a crash mid-write
        // leaves the previous snapshot intact.
        let staging = self.staging_path();
        fs::write(&staging, encode(snapshot)).map_err(|source| StoreError::Io {
            action: "write",
            path: staging.clone(),
            source,
        })?;

        fs::rename(&staging, &self.path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            StoreError::Io {
                action: "replace",
                path: self.path.clone(),
                source,
            }
        })
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

pub fn encode(snapshot: &Snapshot) -> String {
    snapshot
        .iter()
        .map(|slot| {
            format!(
                "{} {}\t{}\n",
                slot.date_str(),
                slot.weekday_name(),
                slot.time_str()
            )
        })
        .collect()
}

pub fn decode(content: &str) -> Result<Vec<Slot>, StoreError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            decode_line(line.trim()).ok_or_else(|| StoreError::Corrupt {
                line: index + 1,
                content: line.to_string(),
            })
        })
        .collect()
}

/// Also accepts the all-spaces form `2024-06-01 Saturday 10:00`.
fn decode_line(line: &str) -> Option<Slot> {
    let (head, time) = line.split_once('\t').or_else(|| line.rsplit_once(' '))?;
    let (date, weekday) = head.trim().split_once(' ')?;

    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    let start_time = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT).ok()?;
    let slot = Slot::new(date, start_time);

    (slot.weekday_name() == weekday.trim()).then_some(slot)
}

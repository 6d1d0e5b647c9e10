//! Snapshot store: a flat JSON list of saved estimates
//!
//! Persistence is best-effort. A missing or corrupt file reads as an empty
//! list and a failed write is logged and reported as `false`; neither ever
//! surfaces as an error to the caller. The whole list is rewritten on every
//! save with no locking, so concurrent writers are last-write-wins.

use crate::types::{Estimate, EstimateSnapshot};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default file name for the snapshot list
pub const DEFAULT_STORE_FILE: &str = "saved_results.json";

const ID_FORMAT: &str = "%Y%m%d%H%M%S";
const SAVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the saved-estimates listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotListing {
    /// Display number, counting down from the newest
    pub number: usize,
    pub id: String,
    pub saved_at: String,
    pub part_number: String,
    pub part_name: String,
    pub vehicle_model: String,
    pub company: String,
    pub name: String,
}

/// Append-only snapshot list backed by a single JSON file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every snapshot; missing or unreadable data yields an empty list
    pub fn load_all(&self) -> Vec<EstimateSnapshot> {
        if !self.path.exists() {
            return Vec::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot store unreadable");
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot store corrupt, ignoring");
                Vec::new()
            }
        }
    }

    /// Overwrite the file with `snapshots`; returns `false` if the write failed
    pub fn save_all(&self, snapshots: &[EstimateSnapshot]) -> bool {
        let json = match serde_json::to_string_pretty(snapshots) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize snapshots");
                return false;
            }
        };

        match fs::write(&self.path, json) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to write snapshot store");
                false
            }
        }
    }

    /// Load, push, save
    pub fn append(&self, snapshot: EstimateSnapshot) -> bool {
        let mut all = self.load_all();
        debug!(id = %snapshot.id, existing = all.len(), "appending snapshot");
        all.push(snapshot);
        self.save_all(&all)
    }

    /// Snapshot `estimate` with a fresh id and append it
    ///
    /// `name` defaults to `"{part number} - {part name}"`. The returned flag
    /// tells whether the write actually reached disk.
    pub fn save_estimate(&self, estimate: &Estimate, name: Option<&str>) -> (EstimateSnapshot, bool) {
        self.save_estimate_at(estimate, name, Local::now())
    }

    pub(crate) fn save_estimate_at(
        &self,
        estimate: &Estimate,
        name: Option<&str>,
        now: DateTime<Local>,
    ) -> (EstimateSnapshot, bool) {
        let existing = self.load_all();
        let id = unique_id(&now.format(ID_FORMAT).to_string(), &existing);
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => estimate.default_name(),
        };

        let snapshot = EstimateSnapshot::capture(
            estimate,
            id,
            now.format(SAVED_AT_FORMAT).to_string(),
            name,
        );

        let mut all = existing;
        all.push(snapshot.clone());
        let written = self.save_all(&all);
        (snapshot, written)
    }

    /// Exact id lookup
    pub fn find(&self, id: &str) -> Option<EstimateSnapshot> {
        self.load_all().into_iter().find(|s| s.id == id)
    }

    /// Listing rows in display order (newest first)
    pub fn list_newest_first(&self) -> Vec<SnapshotListing> {
        let all = self.load_all();
        let count = all.len();
        all.iter()
            .rev()
            .enumerate()
            .map(|(idx, s)| SnapshotListing {
                number: count - idx,
                id: s.id.clone(),
                saved_at: s.saved_at.clone(),
                part_number: s.part_number.clone(),
                part_name: s.part_name.clone(),
                vehicle_model: s.vehicle_model.clone(),
                company: s.company.clone(),
                name: s.name.clone(),
            })
            .collect()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_FILE)
    }
}

/// Second-resolution ids collide when two saves land in the same second;
/// later ones get a `-2`, `-3`, ... suffix so lookup never shadows a record.
fn unique_id(base: &str, existing: &[EstimateSnapshot]) -> String {
    let taken = |candidate: &str| existing.iter().any(|s| s.id == candidate);
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-assigned identifier for one file in the upload queue. Generated
/// when the file is added and stable for the life of the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-assigned identifier of the analysis task created for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle of one queued file. Transitions are one-directional:
/// `Queued -> Uploading -> (Succeeded | Failed)`, with the local size check
/// short-circuiting `Queued -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Queued,
    Uploading,
    Succeeded,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Succeeded | UploadState::Failed)
    }
}

/// One analysis module as advertised by the service catalog. `replicas` is
/// a capacity signal: zero means the worker is unavailable and must not be
/// surfaced anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub replicas: u32,
}

/// Ordered worker catalog. Iteration order is the order the catalog was
/// supplied in, and every downstream ordering (selection panel, disabled
/// set, wire encoding) derives from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerCatalog {
    workers: Vec<WorkerDescriptor>,
}

impl WorkerCatalog {
    pub fn new(workers: Vec<WorkerDescriptor>) -> Self {
        Self { workers }
    }

    /// Workers that may be offered for selection: the `replicas > 0` subset
    /// in catalog order. A zero-replica worker is invisible end-to-end, not
    /// merely hidden.
    pub fn selectable(&self) -> impl Iterator<Item = &WorkerDescriptor> {
        self.workers.iter().filter(|w| w.replicas > 0)
    }
}

impl FromIterator<WorkerDescriptor> for WorkerCatalog {
    fn from_iter<I: IntoIterator<Item = WorkerDescriptor>>(iter: I) -> Self {
        Self {
            workers: iter.into_iter().collect(),
        }
    }
}

/// Human-readable byte count, binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            if unit == "B" {
                return format!("{bytes} B");
            }
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} ZiB")
}

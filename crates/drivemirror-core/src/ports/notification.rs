//! Status notifications
//!
//! One-way signals the engine emits for whatever front end is listening.
//! Emitters never wait for a consumer; events without a listener are dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of a sync cycle or usage scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A status signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    SyncStarted,
    SyncUpdate { message: String },
    SyncDone { outcome: Outcome },
    /// A selected folder no longer resolves to its recorded id
    SyncInvalidSelection,
    /// Emitted once per second while waiting for the next cycle
    SyncCountdown { remaining_secs: u64 },
    UsageStarted { total: u64 },
    UsageUpdate { processed: u64 },
    UsageDone { outcome: Outcome },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyncStarted => write!(f, "Sync started"),
            Self::SyncUpdate { message } => write!(f, "{message}"),
            Self::SyncDone { outcome: Outcome::Success } => write!(f, "Sync completed"),
            Self::SyncDone { outcome: Outcome::Failure } => write!(f, "Sync failed"),
            Self::SyncInvalidSelection => write!(f, "Some sync folders are not valid anymore"),
            Self::SyncCountdown { remaining_secs } => write!(
                f,
                "Sync starts in {:02}m:{:02}s",
                remaining_secs / 60,
                remaining_secs % 60
            ),
            Self::UsageStarted { total } => write!(f, "Calculating usage of {total} entries"),
            Self::UsageUpdate { processed } => write!(f, "Scanned {processed} entries"),
            Self::UsageDone { outcome: Outcome::Success } => write!(f, "Usage calculation done"),
            Self::UsageDone { outcome: Outcome::Failure } => {
                write!(f, "Usage calculation failed")
            }
        }
    }
}

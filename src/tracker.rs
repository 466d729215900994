// Notification state tracker - remembers what was last sent per certificate
// so unchanged states are not re-notified inside the renotify interval
//
// Records are mutated only after a successful dispatch; a failed delivery
// leaves the record untouched so the next cycle retries the notification.
// The daemon serializes all access through a single mutex.

use crate::error::PersistenceError;
use crate::evaluator::UrgencyState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Last notification sent for one certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub last_notified_state: UrgencyState,
    pub last_notified_at: DateTime<Utc>,
}

/// Persistent map of certificate id to last notification
pub struct NotificationTracker {
    state_path: Option<PathBuf>,
    renotify_interval: Duration,
    records: HashMap<String, NotificationRecord>,
}

impl NotificationTracker {
    /// Load the tracker from its state file, rehydrating records from a
    /// previous run
    ///
    /// A missing file means a first run and yields an empty tracker. A
    /// corrupt file is logged and discarded rather than halting monitoring;
    /// the cost is at most one redundant notification per certificate.
    pub fn load(state_path: &Path, renotify_interval_hours: u64) -> Self {
        let records = match read_records(state_path) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("discarding notification state: {}", err);
                HashMap::new()
            }
        };

        if !records.is_empty() {
            tracing::info!(
                "rehydrated {} notification record(s) from {}",
                records.len(),
                state_path.display()
            );
        }

        Self {
            state_path: Some(state_path.to_path_buf()),
            renotify_interval: Duration::hours(renotify_interval_hours as i64),
            records,
        }
    }

    /// Tracker without a backing file, for one-shot runs and tests
    pub fn in_memory(renotify_interval_hours: u64) -> Self {
        Self {
            state_path: None,
            renotify_interval: Duration::hours(renotify_interval_hours as i64),
            records: HashMap::new(),
        }
    }

    /// Decide whether the current state warrants a notification
    ///
    /// Notify when no record exists yet, when the state changed since the
    /// last notification (which covers the one-shot "resolved" notice on a
    /// transition back to healthy), or when an unchanged `Warning`/`Expired`
    /// state has gone unrepeated for the renotify interval. Unchanged
    /// `Healthy` and `Unreadable` states are never re-notified.
    pub fn should_notify(&self, id: &str, state: UrgencyState, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get(id) else {
            return true;
        };

        if record.last_notified_state != state {
            return true;
        }

        if !matches!(state, UrgencyState::Warning | UrgencyState::Expired) {
            return false;
        }

        now - record.last_notified_at >= self.renotify_interval
    }

    /// Record a delivered notification and flush to disk
    pub fn record(
        &mut self,
        id: &str,
        state: UrgencyState,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.records.insert(
            id.to_string(),
            NotificationRecord {
                last_notified_state: state,
                last_notified_at: now,
            },
        );
        self.flush()
    }

    /// Change the minimum spacing between repeated notifications
    ///
    /// Applied by the daemon when the configuration is reloaded, so the new
    /// interval governs decisions from the next cycle on.
    pub fn set_renotify_interval(&mut self, hours: u64) {
        self.renotify_interval = Duration::hours(hours as i64);
    }

    /// Repoint the tracker at a new state file, carrying current records over
    ///
    /// The in-memory records are authoritative for a running daemon, so they
    /// are flushed to the new location rather than replaced by whatever it
    /// may contain.
    pub fn set_state_path(&mut self, path: &Path) -> Result<(), PersistenceError> {
        if self.state_path.as_deref() == Some(path) {
            return Ok(());
        }
        self.state_path = Some(path.to_path_buf());
        self.flush()
    }

    /// Last notification sent for a certificate, if any
    pub fn last_record(&self, id: &str) -> Option<&NotificationRecord> {
        self.records.get(id)
    }

    /// Number of tracked certificates
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no notifications have been recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };

        let json =
            serde_json::to_string_pretty(&self.records).map_err(|e| PersistenceError::Corrupt {
                path: path.clone(),
                details: e.to_string(),
            })?;

        fs::write(path, json).map_err(|source| PersistenceError::Unwritable {
            path: path.clone(),
            source,
        })
    }
}

fn read_records(path: &Path) -> Result<HashMap<String, NotificationRecord>, PersistenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => {
            return Err(PersistenceError::Corrupt {
                path: path.to_path_buf(),
                details: e.to_string(),
            });
        }
    };

    if contents.trim().is_empty() {
        return Ok(HashMap::new());
    }

    serde_json::from_str(&contents).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

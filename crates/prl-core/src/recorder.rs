//! De-duplicated, append-only status log.
//!
//! Two files back the recorder:
//! - the history store, one JSON `StatusEvent` per line, only ever appended to;
//! - the last-status store, a single `StatusEvent` overwritten on each accepted
//!   transition and used purely to detect whether a sample is new.
//!
//! The last-status record is a singleton, not keyed by user: the relay monitors one
//! configured target, and comparison is on `last_online` alone.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    domain::{StatusEvent, UserId},
    errors::Error,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The sample was new: history gained a line and the baseline was replaced.
    Recorded,
    /// The sample matched the baseline; nothing was written.
    Unchanged,
}

#[derive(Debug)]
pub struct Recorder {
    history_path: PathBuf,
    last_status_path: PathBuf,
    // Serializes read-check-write so concurrent samples cannot duplicate history lines.
    write_lock: Mutex<()>,
}

impl Recorder {
    pub fn new(history_path: impl Into<PathBuf>, last_status_path: impl Into<PathBuf>) -> Self {
        Self {
            history_path: history_path.into(),
            last_status_path: last_status_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn last_status_path(&self) -> &Path {
        &self.last_status_path
    }

    /// Persist `(user_id, last_online)` unless it equals the current baseline.
    pub fn record_if_changed(&self, user_id: UserId, last_online: i64) -> Result<RecordOutcome> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(prev) = self.read_last_status()? {
            if prev.last_online == last_online {
                return Ok(RecordOutcome::Unchanged);
            }
        }

        let event = StatusEvent {
            user_id,
            last_online,
        };
        self.append_history(&event)?;
        self.write_last_status(&event)?;

        Ok(RecordOutcome::Recorded)
    }

    /// Current baseline, or `None` when nothing has been recorded yet.
    pub fn last_status(&self) -> Result<Option<StatusEvent>> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.read_last_status()
    }

    fn read_last_status(&self) -> Result<Option<StatusEvent>> {
        let txt = match fs::read_to_string(&self.last_status_path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::Store {
                    path: self.last_status_path.clone(),
                    source,
                })
            }
        };

        let event = serde_json::from_str::<StatusEvent>(txt.trim_end()).map_err(|source| {
            Error::Decode {
                path: self.last_status_path.clone(),
                source,
            }
        })?;
        Ok(Some(event))
    }

    fn append_history(&self, event: &StatusEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let store_err = |source: std::io::Error| Error::Store {
            path: self.history_path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(store_err)?;
        // One write per record keeps each line intact under O_APPEND.
        file.write_all(line.as_bytes()).map_err(store_err)?;
        Ok(())
    }

    fn write_last_status(&self, event: &StatusEvent) -> Result<()> {
        let mut txt = serde_json::to_string(event)?;
        txt.push('\n');
        fs::write(&self.last_status_path, txt).map_err(|source| Error::Store {
            path: self.last_status_path.clone(),
            source,
        })
    }
}

//! Local persistence of the current thread identifier.
//!
//! Consecutive CLI invocations share one conversation thread: the id is kept
//! in a small JSON file under the state directory and replaced when the
//! server assigns a different one or the caller asks for a new thread.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name for the persisted thread id.
const THREAD_FILE_NAME: &str = "thread.json";
/// On-disk schema version for [`PersistedThread`].
const THREAD_FILE_VERSION: u32 = 1;

/// On-disk payload shape for the persisted thread id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedThread {
    /// File-format version for forward compatibility checks.
    version: u32,
    /// Current thread identifier.
    thread_id: String,
    /// Last save timestamp in Unix epoch milliseconds.
    updated_at_millis: u64,
}

/// Filesystem-backed store for the current thread id.
#[derive(Debug, Clone)]
pub struct ThreadStore {
    path: PathBuf,
}

impl ThreadStore {
    /// Open/create a thread store rooted under the given state directory.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, String> {
        let state_dir = state_dir.as_ref();
        fs::create_dir_all(state_dir)
            .map_err(|e| format!("failed to create state directory {}: {e}", state_dir.display()))?;
        Ok(Self {
            path: state_dir.join(THREAD_FILE_NAME),
        })
    }

    /// Load the persisted thread id, if any.
    ///
    /// Unreadable or malformed files are treated as absent so one bad file
    /// never blocks starting a conversation.
    pub fn current(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let payload: PersistedThread = serde_json::from_str(&raw).ok()?;
        if payload.version != THREAD_FILE_VERSION || payload.thread_id.trim().is_empty() {
            return None;
        }
        Some(payload.thread_id)
    }

    /// Persist `thread_id` as the current thread.
    pub fn save(&self, thread_id: &str) -> Result<(), String> {
        let payload = PersistedThread {
            version: THREAD_FILE_VERSION,
            thread_id: thread_id.to_string(),
            updated_at_millis: crate::conversation::now_unix_millis(),
        };
        let json = serde_json::to_vec_pretty(&payload)
            .map_err(|e| format!("failed to serialize thread state: {e}"))?;
        // Write to a sibling temporary file first so partial writes do not
        // corrupt the last known-good thread id.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| {
            format!(
                "failed to write temporary thread file {}: {e}",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            format!(
                "failed to move thread file into place {}: {e}",
                self.path.display()
            )
        })?;
        Ok(())
    }

    /// Forget the persisted thread id.
    pub fn clear(&self) -> Result<(), String> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!(
                "failed to remove thread file {}: {e}",
                self.path.display()
            )),
        }
    }
}

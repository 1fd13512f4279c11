//! The optional disk mirror (§4.D, §6): a single JSON file containing
//! `{flag_key -> flag}`. Writes are serialized through an internal lock
//! (§6 single-writer invariant) — the periodic refresh tick and a
//! webhook-triggered invalidation can both want to snapshot at once, and
//! without serialization their write-temp-then-rename calls would race on
//! the same temp path. Startup load happens before any writer is running,
//! so readers never contend with the writer (§5).

use crate::model::Flag;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct DiskMirror {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the mirror. Missing file is treated as "no prior state"; a
    /// corrupt file is logged and treated the same way rather than failing
    /// startup (§4.D).
    pub async fn load(&self) -> HashMap<String, Flag> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no disk mirror present yet");
                return HashMap::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read disk mirror");
                return HashMap::new();
            }
        };

        match serde_json::from_str::<HashMap<String, Flag>>(&content) {
            Ok(flags) => flags,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "disk mirror corrupt, starting cold");
                HashMap::new()
            }
        }
    }

    /// Write a snapshot via write-temp-then-rename so a crash mid-write
    /// never leaves a half-written file for the next `load` to choke on.
    /// Holds `write_lock` for the duration, so two concurrent snapshots
    /// (e.g. a refresh tick and a webhook invalidation) serialize instead
    /// of racing on the same temp path.
    pub async fn snapshot(&self, flags: &[Flag]) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let map: HashMap<&str, &Flag> = flags.iter().map(|f| (f.key.as_str(), f)).collect();
        let encoded = serde_json::to_vec(&map)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &encoded).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

//! Size ledger: the persisted running total of bytes stored.
//!
//! The ledger is a single JSON document `{"totalSize": <u64>}`. Every
//! mutation re-reads the file, applies the delta clamped at zero and rewrites
//! the whole document through [`AtomicFile`]. Mutations are serialized by an
//! in-process mutex; separate processes sharing the file are not coordinated.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::atomic::AtomicFile;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerDocument {
    #[serde(default)]
    total_size: u64,
}

#[derive(Debug)]
pub struct SizeLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SizeLedger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current total. Missing, unreadable or malformed files all read as 0.
    pub async fn read(&self) -> u64 {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?self.path, error = %err, "ledger unreadable, treating as 0");
                }
                return 0;
            }
        };
        match serde_json::from_slice::<LedgerDocument>(&bytes) {
            Ok(doc) => doc.total_size,
            Err(err) => {
                warn!(path = ?self.path, error = %err, "ledger malformed, treating as 0");
                0
            }
        }
    }

    /// Applies `delta`, clamps at zero, persists and returns the new total.
    pub async fn adjust(&self, delta: i64) -> io::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let current = self.read().await;
        let next = (i128::from(current) + i128::from(delta)).clamp(0, i128::from(u64::MAX)) as u64;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec(&LedgerDocument { total_size: next })
            .map_err(|err| io::Error::other(err.to_string()))?;
        let mut atomic = AtomicFile::new(&self.path).await?;
        if let Err(err) = atomic.write_all(&content).await {
            atomic.cleanup().await;
            return Err(err);
        }
        atomic.finalize().await?;

        debug!(delta, previous = current, total = next, "ledger adjusted");
        Ok(next)
    }
}

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::{info, warn};

use crate::atomic::is_temp_name;
use crate::naming::{client_file_name, stored_file_name};

/// Destination directory for uploaded reports.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Picks the final on-disk path for a client supplied file name.
    pub fn upload_target(&self, client_name: &str) -> PathBuf {
        self.root.join(stored_file_name(&client_file_name(client_name)))
    }

    pub async fn resolve_path_checked(
        &self,
        relative: &str,
        allow_missing_leaf: bool,
    ) -> Result<PathBuf, StorageError> {
        let target = self.resolve(relative)?;
        self.ensure_no_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    /// Resolves a stored report name: a single plain file name that is not an
    /// in-flight upload's temp file.
    pub async fn resolve_report_name(&self, name: &str) -> Result<PathBuf, StorageError> {
        let name = name.trim();
        let mut components = Path::new(name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single || name.contains(['/', '\\']) || is_temp_name(name) {
            return Err(StorageError::InvalidPath);
        }
        self.resolve_path_checked(name, true).await
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();
        let trimmed = relative.trim().trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath);
        }

        Ok(self.root.join(normalized))
    }

    async fn ensure_no_symlink_components(
        &self,
        target: &Path,
        allow_missing_leaf: bool,
    ) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::InvalidPath);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound && allow_missing_leaf => {
                    return Ok(());
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// Removes partial-upload temp files older than `ttl`; returns how many went.
    pub async fn sweep_stale_temp_files(&self, ttl: Duration) -> io::Result<usize> {
        if ttl.is_zero() {
            return Ok(0);
        }
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if !is_temp_name(&name.to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            match temp_file_age(&path, now).await? {
                Some(age) if age >= ttl => {}
                _ => continue,
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = ?path, "removed stale partial upload");
                    removed += 1;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = ?path, error = %err, "failed to remove stale partial upload")
                }
            }
        }

        Ok(removed)
    }
}

/// Age of a regular temp file; `None` when it vanished or is not a plain file.
async fn temp_file_age(path: &Path, now: SystemTime) -> io::Result<Option<Duration>> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    Ok(metadata
        .modified()
        .ok()
        .and_then(|modified| now.duration_since(modified).ok()))
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

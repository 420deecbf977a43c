//! 同目录临时文件 + rename 的原子写入。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// 临时文件名中的固定标记，后台清理据此识别残留文件。
pub const TEMP_MARKER: &str = ".tmp.";

/// 目标文件的临时替身；`finalize` 前目标路径不会出现。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
    written: u64,
}

impl AtomicFile {
    /// 在目标路径同目录创建隐藏临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{base}{TEMP_MARKER}{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
            written: 0,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// 已写入的字节数。
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// 放弃并删除临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// fsync 后替换目标文件，返回最终字节数。
    pub async fn finalize(mut self) -> io::Result<u64> {
        let result = async {
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok() {
                    fs::rename(&self.temp_path, &self.target).await?;
                } else {
                    let _ = fs::remove_file(&self.temp_path).await;
                    return Err(err);
                }
            }
            #[cfg(not(windows))]
            {
                let _ = fs::remove_file(&self.temp_path).await;
                return Err(err);
            }
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(self.written)
    }
}

/// 判断文件名是否为 `AtomicFile` 产生的临时文件。
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

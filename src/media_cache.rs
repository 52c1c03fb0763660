//! # Media Cache
//!
//! On-disk store for downloaded message attachments. Files live in one
//! category directory per broad content type and are addressed by their path
//! relative to the cache root, which is what `message_attachments.local_path`
//! records.

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CATEGORIES: [&str; 5] = ["images", "videos", "audio", "documents", "other"];

/// Result of an orphan sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
pub struct MediaCache {
    root: PathBuf,
}

impl MediaCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_directories(&self) -> io::Result<()> {
        for category in CATEGORIES {
            fs::create_dir_all(self.root.join(category)).await?;
        }
        Ok(())
    }

    /// Category directory for a MIME type.
    pub fn category_for(content_type: Option<&str>) -> &'static str {
        match content_type {
            Some(ct) if ct.starts_with("image/") => "images",
            Some(ct) if ct.starts_with("video/") => "videos",
            Some(ct) if ct.starts_with("audio/") => "audio",
            Some(ct) if ct.contains("pdf") || ct.contains("document") => "documents",
            _ => "other",
        }
    }

    /// Write `bytes` under a collision-free name and return the relative path.
    pub async fn store(
        &self,
        filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<String> {
        let category = Self::category_for(content_type);
        let original = Path::new(filename);
        let stem = original
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("file");
        let extension = original
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let stored_name = format!("{stem}_{}.{extension}", Uuid::new_v4());

        let dir = self.root.join(category);
        fs::create_dir_all(&dir).await?;

        let mut file = fs::File::create(dir.join(&stored_name)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        let relative = format!("{category}/{stored_name}");
        debug!(path = %relative, size = bytes.len(), "Cached attachment");
        Ok(relative)
    }

    /// Delete a cached file. A file that is already gone counts as removed.
    pub async fn remove(&self, relative: &str) -> io::Result<()> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %relative, "Cached file already missing");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Remove files older than `cutoff` that no attachment row references.
    ///
    /// Failures on single files are logged and counted; only an unreadable
    /// category directory aborts the sweep.
    pub async fn sweep_older_than(
        &self,
        cutoff: DateTime<Utc>,
        referenced: &HashSet<String>,
    ) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();

        for category in CATEGORIES {
            let dir = self.root.join(category);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };

            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let relative = format!("{category}/{name}");
                if referenced.contains(&relative) {
                    continue;
                }

                let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                    Ok(modified) => DateTime::<Utc>::from(modified),
                    Err(err) => {
                        warn!(path = %relative, error = %err, "Cannot read cached file metadata");
                        report.failed += 1;
                        continue;
                    }
                };
                if modified >= cutoff {
                    continue;
                }

                match fs::remove_file(entry.path()).await {
                    Ok(()) => report.removed += 1,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(path = %relative, error = %err, "Failed to remove orphaned cached file");
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Join a stored relative path onto the root, refusing anything that escapes it.
    fn resolve(&self, relative: &str) -> io::Result<PathBuf> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cache path outside cache root: {relative}"),
            ));
        }
        Ok(self.root.join(path))
    }
}

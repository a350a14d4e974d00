//! Tar archiving of the server directory.
//!
//! Writes an uncompressed tar whose entries are relative to the source
//! directory, so `tar -xf` inside the remote directory recreates the tree in
//! place.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use dockship_core::ArchiveArtifact;

use crate::error::{Result, TransportError};
use crate::traits::Archiver;

/// Directory names left out of the archive unless configured otherwise.
pub const DEFAULT_EXCLUDES: &[&str] = &["venv"];

#[derive(Debug, Default, Clone)]
pub struct TarArchiver;

impl TarArchiver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    fn name(&self) -> &'static str {
        "tar"
    }

    async fn create_archive(
        &self,
        source_dir: &Path,
        exclude: &BTreeSet<String>,
        archive_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ArchiveArtifact> {
        if !source_dir.is_dir() {
            return Err(TransportError::DirectoryNotFound(source_dir.to_path_buf()));
        }

        info!(
            source = %source_dir.display(),
            archive = %archive_path.display(),
            ?exclude,
            "Creating archive"
        );

        let source = source_dir.to_path_buf();
        let exclude = exclude.clone();
        let dest = archive_path.to_path_buf();
        let cancel = cancel.clone();

        spawn_blocking(move || write_archive(&source, &exclude, &dest, &cancel))
            .await
            .map_err(|e| TransportError::ArchiveFailed(format!("archive task failed: {}", e)))?
    }
}

fn write_archive(
    source: &Path,
    exclude: &BTreeSet<String>,
    archive_path: &Path,
    cancel: &CancellationToken,
) -> Result<ArchiveArtifact> {
    let file = File::create(archive_path).map_err(|e| {
        TransportError::ArchiveFailed(format!(
            "cannot create {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let source = std::fs::canonicalize(source)?;
    let source = source.as_path();
    // The archive may have been placed inside the tree it packs.
    let own_path: Option<PathBuf> = std::fs::canonicalize(archive_path).ok();

    let mut builder = tar::Builder::new(BufWriter::new(file));
    builder.follow_symlinks(false);

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry, exclude));

    let mut entries = 0usize;
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled("tar".to_string()));
        }

        let entry = entry.map_err(|e| TransportError::ArchiveFailed(e.to_string()))?;
        let path = entry.path();

        if own_path.as_deref() == Some(path) {
            continue;
        }

        let relative = path.strip_prefix(source).map_err(|_| {
            TransportError::ArchiveFailed(format!(
                "{} is outside {}",
                path.display(),
                source.display()
            ))
        })?;

        let appended = if entry.file_type().is_dir() {
            builder.append_dir(relative, path)
        } else {
            builder.append_path_with_name(path, relative)
        };
        appended.map_err(|e| {
            TransportError::ArchiveFailed(format!("cannot add {}: {}", relative.display(), e))
        })?;
        entries += 1;
    }

    let mut writer = builder
        .into_inner()
        .map_err(|e| TransportError::ArchiveFailed(format!("cannot finish archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| TransportError::ArchiveFailed(format!("cannot flush archive: {}", e)))?;
    drop(writer);

    let size = std::fs::metadata(archive_path)?.len();
    debug!(entries, size, "Archive written");

    Ok(ArchiveArtifact::new(archive_path).created(size))
}

fn is_excluded(entry: &DirEntry, exclude: &BTreeSet<String>) -> bool {
    segment_matches(entry.file_name(), exclude)
}

fn segment_matches(name: &OsStr, exclude: &BTreeSet<String>) -> bool {
    name.to_str().is_some_and(|name| exclude.contains(name))
}

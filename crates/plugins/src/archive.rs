//! Gzipped tarball extraction into a cache slot.

use std::{
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Unpack a `.tgz` into `target`, dropping the archive's top-level wrapper
/// directory (`package/` for npm tarballs).
///
/// Link entries are skipped; entries that would escape `target` abort the
/// extraction. Dropping the returned future stops the blocking extraction
/// at the next entry and removes `target`.
pub async fn unpack_tarball(bytes: Vec<u8>, target: &Path) -> Result<()> {
    tokio::fs::create_dir_all(target).await?;
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(Arc::clone(&cancel));
    let target_owned = target.to_path_buf();
    tokio::task::spawn_blocking(move || extract_or_discard(&bytes, &target_owned, &cancel))
        .await
        .map_err(|e| Error::external("tarball extraction task failed", e))?
}

/// Raises its flag when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn extract_or_discard(bytes: &[u8], target: &Path, cancel: &AtomicBool) -> Result<()> {
    let result = unpack_blocking(bytes, target, cancel);
    if cancel.load(Ordering::Relaxed)
        && let Err(e) = std::fs::remove_dir_all(target)
    {
        debug!(path = %target.display(), error = %e, "failed to remove cancelled extraction");
    }
    result
}

fn unpack_blocking(bytes: &[u8], target: &Path, cancel: &AtomicBool) -> Result<()> {
    let canonical_target = std::fs::canonicalize(target)?;
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::message("tarball extraction cancelled"));
        }
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if entry.header().entry_type().is_symlink() || entry.header().entry_type().is_hard_link()
        {
            warn!(path = %path.display(), "skipping symlink/hardlink archive entry");
            continue;
        }

        let Some(stripped) = sanitize_archive_path(&path)? else {
            continue;
        };

        let dest = target.join(&stripped);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
            let canonical_parent = std::fs::canonicalize(parent)?;
            if !canonical_parent.starts_with(&canonical_target) {
                return Err(Error::unsafe_archive(&path));
            }
        }

        if dest.exists() {
            let meta = std::fs::symlink_metadata(&dest)?;
            if meta.file_type().is_symlink() {
                return Err(Error::unsafe_archive(&path));
            }
        }

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }

        entry.unpack(&dest)?;
    }
    Ok(())
}

/// Drop the first path component and reject anything that is not a plain
/// relative path.
pub(crate) fn sanitize_archive_path(path: &Path) -> Result<Option<PathBuf>> {
    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }

    for component in stripped.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::unsafe_archive(path));
            },
        }
    }

    Ok(Some(stripped))
}

/// Build a gzipped tarball from `(path, contents)` pairs.
#[allow(clippy::unwrap_used)]
#[cfg(test)]
pub(crate) fn build_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;

    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

//! Gzipped tarball extraction

use crate::{PackageError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

/// Extract a `.tar.gz` into `target_dir`.
///
/// Entries that would land outside `target_dir` abort the extraction with
/// [`PackageError::PathTraversal`]. Links and special files are skipped.
pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        let target = contained_path(target_dir, &relative)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
            }
            EntryType::XGlobalHeader | EntryType::XHeader => {}
            other => {
                tracing::warn!(
                    entry = %relative.display(),
                    kind = ?other,
                    "skipping unsupported tar entry"
                );
            }
        }
    }
    Ok(())
}

/// Join an archive path onto `root`, rejecting absolute and `..` components
fn contained_path(root: &Path, relative: &Path) -> Result<PathBuf> {
    let mut out = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PackageError::PathTraversal(relative.to_path_buf()));
            }
        }
    }
    Ok(out)
}

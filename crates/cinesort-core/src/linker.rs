use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::platform::{is_symlink, symlink_file};

const TEMP_SUFFIX: &str = ".cinesort-tmp";

/// Materialize `link` as a symlink to `source`.
///
/// The link is created under a temporary name, renamed into place and read
/// back, so an interrupted run never leaves a half-written entry at `link`.
/// Without `replace`, an existing entry is a collision. With it, only an
/// existing symlink may be replaced, never a regular file.
pub fn create_link(source: &Path, link: &Path, replace: bool) -> Result<PathBuf, Error> {
    let target = fs::canonicalize(source)?;
    let parent = link
        .parent()
        .ok_or_else(|| Error::Other(format!("No parent directory for {}", link.display())))?;
    fs::create_dir_all(parent)?;

    if let Ok(meta) = link.symlink_metadata() {
        if !replace || !meta.file_type().is_symlink() {
            return Err(Error::PlacementCollision(link.to_path_buf()));
        }
    }

    let tmp = temp_path(link);
    if is_symlink(&tmp) {
        fs::remove_file(&tmp)?;
    }
    symlink_file(&target, &tmp)?;
    if let Err(e) = fs::rename(&tmp, link) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    match fs::read_link(link) {
        Ok(found) if found == target => {
            debug!("Linked {} -> {}", link.display(), target.display());
            Ok(target)
        }
        Ok(found) => Err(Error::Other(format!(
            "Link {} points to {} instead of {}",
            link.display(),
            found.display(),
            target.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(link: &Path) -> PathBuf {
    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    link.with_file_name(format!(".{}{}", name, TEMP_SUFFIX))
}

/// Whether `link` is a symlink resolving to the same file as `source`.
pub fn links_to(link: &Path, source: &Path) -> bool {
    let Ok(found) = fs::read_link(link) else {
        return false;
    };
    if found == source {
        return true;
    }
    match (fs::canonicalize(link), fs::canonicalize(source)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Remove an archive entry, refusing anything that is not a symlink.
pub fn remove_link(link: &Path) -> Result<(), Error> {
    if !is_symlink(link) {
        return Err(Error::PlacementCollision(link.to_path_buf()));
    }
    fs::remove_file(link)?;
    info!("Removed {}", link.display());
    Ok(())
}

/// Delete dangling symlinks below `dir`, plus leftovers of interrupted link
/// creation. Returns the removed (or, in dry-run, removable) paths.
pub fn prune_broken_links(dir: &Path, dry_run: bool) -> Result<Vec<PathBuf>, Error> {
    let mut broken = Vec::new();
    collect_broken(dir, &mut broken)?;
    broken.sort();

    if broken.is_empty() {
        info!("All symlinks are valid");
        return Ok(broken);
    }
    warn!("Broken symlinks detected: {}", broken.len());
    for link in &broken {
        if dry_run {
            info!("SIMULATION - remove {}", link.display());
            continue;
        }
        match fs::remove_file(link) {
            Ok(()) => info!("Broken link removed: {}", link.display()),
            Err(e) => warn!("Could not remove {}: {}", link.display(), e),
        }
    }
    Ok(broken)
}

fn collect_broken(dir: &Path, broken: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let leftover = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(TEMP_SUFFIX))
                .unwrap_or(false);
            if leftover || fs::metadata(&path).is_err() {
                broken.push(path);
            }
        } else if file_type.is_dir() {
            collect_broken(&path, broken)?;
        }
    }
    Ok(())
}

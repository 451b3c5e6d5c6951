#[cfg(target_os = "windows")]
pub mod windows;

use std::io;
use std::path::Path;

/// Create a symlink at `link` pointing to the file `target`.
#[cfg(target_os = "windows")]
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    windows::symlink_file(target, link)
}

#[cfg(unix)]
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Whether a directory entry is a symlink, without following it.
pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

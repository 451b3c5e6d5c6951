use std::io;
use std::path::Path;

/// File symlinks need either admin rights or developer mode on Windows.
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!(
                "cannot create symlink {} (developer mode or admin rights required): {}",
                link.display(),
                e
            ),
        )
    })
}

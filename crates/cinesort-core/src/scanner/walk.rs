use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::model::Category;

/// A candidate video found under one of the category folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub category: Category,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Walk every category folder present under `config.search_dir`.
/// Skips symlinks, empty files, non-video extensions, glob-ignored paths and
/// files older than `modified_after`. Results are sorted by path.
pub fn discover_videos(
    config: &AppConfig,
    modified_after: Option<SystemTime>,
) -> io::Result<Vec<DiscoveredFile>> {
    let ignore_patterns: Vec<Pattern> = config
        .ignore_patterns
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let roots = category_roots(&config.search_dir);
    if roots.is_empty() {
        warn!("No category folders found in {}", config.search_dir.display());
        return Ok(Vec::new());
    }
    info!(
        "Categories found: {:?}",
        roots.iter().map(|(_, p)| p.display().to_string()).collect::<Vec<_>>()
    );

    let map: DashMap<PathBuf, DiscoveredFile> = DashMap::new();
    let walker = Walker {
        config,
        ignore_patterns: &ignore_patterns,
        modified_after,
        map: &map,
    };

    roots
        .par_iter()
        .try_for_each(|(category, root)| walker.visit_dirs(root, *category))?;

    let mut files: Vec<DiscoveredFile> = map.into_iter().map(|(_, f)| f).collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Discovered {} video files", files.len());
    Ok(files)
}

/// Category folders that exist under `search_dir`, in a fixed order.
pub fn category_roots(search_dir: &Path) -> Vec<(Category, PathBuf)> {
    Category::ALL
        .iter()
        .flat_map(|category| {
            category
                .search_dir_names()
                .iter()
                .map(move |name| (*category, search_dir.join(name)))
        })
        .filter(|(_, path)| path.is_dir())
        .collect()
}

struct Walker<'a> {
    config: &'a AppConfig,
    ignore_patterns: &'a [Pattern],
    modified_after: Option<SystemTime>,
    map: &'a DashMap<PathBuf, DiscoveredFile>,
}

impl Walker<'_> {
    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn visit_dirs(&self, dir: &Path, category: Category) -> io::Result<()> {
        if !dir.is_dir() || self.is_ignored(dir) {
            return Ok(());
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                error!("Access denied reading directory {}: {}", dir.display(), err);
                return Ok(());
            }
            Err(err) => {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        };

        entries.par_bridge().try_for_each(|entry_result| {
            let entry = entry_result.map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("Error reading entry in directory {}: {}", dir.display(), err),
                )
            })?;

            let path = entry.path();
            let metadata = fs::symlink_metadata(&path).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("Error getting metadata for {}: {}", path.display(), err),
                )
            })?;

            if metadata.file_type().is_symlink() {
                return Ok(());
            }
            if metadata.is_dir() {
                return self.visit_dirs(&path, category);
            }
            if metadata.len() == 0 || !self.config.is_video(&path) || self.is_ignored(&path) {
                return Ok(());
            }

            let modified = metadata.modified().ok();
            if let (Some(cutoff), Some(modified)) = (self.modified_after, modified) {
                if modified < cutoff {
                    return Ok(());
                }
            }

            self.map.insert(
                path.clone(),
                DiscoveredFile {
                    path,
                    category,
                    size: metadata.len(),
                    modified,
                },
            );
            Ok(())
        })
    }
}

pub mod xxhash;

use ahash::AHashMap;
use dashmap::DashMap;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};

use crate::error::Error;
use crate::model::ContentHash;
use crate::progress::{CancelFlag, ProgressReporter};

pub use xxhash::content_hash;

/// Per-file hashing results, joined back before the single-threaded phase.
pub type HashResults = AHashMap<PathBuf, Result<ContentHash, String>>;

/// Hash a batch of files. Runs on a bounded rayon pool only when the batch is
/// larger than `parallel_threshold`; small batches stay on the calling thread.
/// Returns `Error::Cancelled` if the flag is raised before the batch finishes.
pub fn hash_files(
    files: &[PathBuf],
    parallel_threshold: usize,
    workers: usize,
    cancel: &CancelFlag,
    reporter: &dyn ProgressReporter,
) -> Result<HashResults, Error> {
    let total = files.len();
    let done = AtomicUsize::new(0);
    reporter.on_hash_start(total);

    let hash_one = |path: &PathBuf| -> Option<(PathBuf, Result<ContentHash, String>)> {
        if cancel.is_cancelled() {
            return None;
        }
        let result = content_hash(path).map_err(|e| describe(path, e));
        if let Err(msg) = &result {
            error!("{}", msg);
        }
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.on_hash_progress(n, total);
        Some((path.clone(), result))
    };

    let results: HashResults = if total > parallel_threshold {
        debug!("Hashing {} files on a worker pool", total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Other(format!("Could not start hash workers: {}", e)))?;
        let collected: DashMap<PathBuf, Result<ContentHash, String>> = DashMap::new();
        pool.install(|| {
            files.par_iter().for_each(|path| {
                if let Some((path, result)) = hash_one(path) {
                    collected.insert(path, result);
                }
            })
        });
        collected.into_iter().collect()
    } else {
        debug!("Hashing {} files sequentially", total);
        files.iter().filter_map(hash_one).collect()
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(results)
}

fn describe(path: &Path, err: io::Error) -> String {
    format!("Error hashing '{}': {}", path.display(), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use std::fs;
    use tempfile::tempdir;

    fn make_files(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("f{}.mkv", i));
                fs::write(&path, format!("content {}", i % 3)).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let tmp = tempdir().unwrap();
        let files = make_files(tmp.path(), 12);
        let cancel = CancelFlag::new();

        let sequential = hash_files(&files, 100, 0, &cancel, &SilentReporter).unwrap();
        let parallel = hash_files(&files, 2, 4, &cancel, &SilentReporter).unwrap();
        assert_eq!(sequential.len(), 12);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential[&files[0]], sequential[&files[3]]);
    }

    #[test]
    fn test_missing_file_is_reported_per_file() {
        let tmp = tempdir().unwrap();
        let mut files = make_files(tmp.path(), 2);
        files.push(tmp.path().join("gone.mkv"));
        let results = hash_files(&files, 100, 0, &CancelFlag::new(), &SilentReporter).unwrap();
        assert!(results[&files[0]].is_ok());
        assert!(results[&files[2]].is_err());
    }

    #[test]
    fn test_cancelled_batch_returns_error() {
        let tmp = tempdir().unwrap();
        let files = make_files(tmp.path(), 3);
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            hash_files(&files, 100, 0, &cancel, &SilentReporter),
            Err(Error::Cancelled)
        ));
    }
}

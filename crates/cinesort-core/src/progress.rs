use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Trait for reporting pipeline progress.
///
/// The CLI implements it with indicatif bars. Hash callbacks arrive from
/// worker threads. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_discover_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_file_start(&self, _index: usize, _total: usize, _path: &Path) {}
    fn on_file_complete(&self, _index: usize, _total: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Shared cancellation switch, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

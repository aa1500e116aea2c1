//! Scan options DTO

use std::num::NonZeroUsize;
use std::thread;

/// Options for one recovery pass
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Whether independent locator segments may be parsed in parallel
    pub parallel: bool,
    /// Number of worker threads for parallel parsing
    pub thread_count: usize,
    /// Whether to resolve names and parents from directory structures
    pub resolve_names: bool,
    /// Only report deleted records (the catalog still holds everything)
    pub deleted_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            thread_count: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            resolve_names: true,
            deleted_only: false,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables parallel parsing
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self.thread_count = 1;
        self
    }

    /// Sets the worker thread count; zero keeps the default
    pub fn with_threads(mut self, count: usize) -> Self {
        if count > 0 {
            self.thread_count = count;
        }
        self
    }

    pub fn with_name_resolution(mut self, resolve_names: bool) -> Self {
        self.resolve_names = resolve_names;
        self
    }

    pub fn with_deleted_only(mut self, deleted_only: bool) -> Self {
        self.deleted_only = deleted_only;
        self
    }
}

//! Process-wide registry of open device paths
//!
//! At most one handle per device path may be open at a time.

use crate::domain::repositories::BlockDeviceError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

static OPEN_PATHS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

fn registry_key(path: &str) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path))
}

/// Claim on a device path, released on drop
#[derive(Debug)]
pub struct OpenGuard {
    key: PathBuf,
}

impl OpenGuard {
    /// Claims `path`, failing with `AlreadyOpen` if another handle holds it
    pub fn acquire(path: &str) -> Result<Self, BlockDeviceError> {
        let key = registry_key(path);
        let mut open = OPEN_PATHS.lock();
        if !open.insert(key.clone()) {
            return Err(BlockDeviceError::AlreadyOpen(path.to_string()));
        }
        debug!("claimed {}", key.display());
        Ok(Self { key })
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        OPEN_PATHS.lock().remove(&self.key);
        debug!("released {}", self.key.display());
    }
}

//! Test fixtures.
//!
//! Provides temporary mirror directories and log initialization.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

/// A temporary mirror root with automatic cleanup.
pub struct TempMirror {
    temp_dir: TempDir,
}

impl TempMirror {
    /// Creates a new empty mirror root.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the mirror root.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the absolute path of a file under the root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }

    /// Reads a mirrored file, or `None` if it does not exist yet.
    pub fn read(&self, relative: impl AsRef<Path>) -> Option<String> {
        fs::read_to_string(self.path(relative)).ok()
    }

    /// Writes a mirrored file, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, text: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(path, text).expect("Failed to write mirrored file");
    }
}

impl Default for TempMirror {
    fn default() -> Self {
        Self::new()
    }
}

static INIT_LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber for tests, once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

//! Persisting replica text to files under the mirror root.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Maps a document id to its path relative to the mirror root.
///
/// `http://` and `https://` prefixes are stripped, so
/// `https://example.com/a/b` becomes `example.com/a/b`.
pub fn relative_path_for(doc_id: &str) -> SyncResult<PathBuf> {
    let stripped = doc_id
        .strip_prefix("https://")
        .or_else(|| doc_id.strip_prefix("http://"))
        .unwrap_or(doc_id);

    let path = Path::new(stripped);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(SyncError::InvalidDocumentId(doc_id.to_string())),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(SyncError::InvalidDocumentId(doc_id.to_string()));
    }
    Ok(relative)
}

/// Where replica text is persisted.
#[async_trait]
pub trait FileSink: Send + Sync + 'static {
    /// The mirror root.
    fn root(&self) -> &Path;

    /// Reads the file at `relative`.
    async fn read(&self, relative: &Path) -> SyncResult<String>;

    /// Replaces the file at `relative`, creating parent directories.
    async fn write(&self, relative: &Path, text: &str) -> SyncResult<()>;
}

/// A [`FileSink`] writing plain files under a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Creates a sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, relative: &Path) -> SyncResult<String> {
        let path = self.root.join(relative);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| SyncError::persistence(path, err))
    }

    async fn write(&self, relative: &Path, text: &str) -> SyncResult<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SyncError::persistence(parent, err))?;
        }
        tokio::fs::write(&path, text)
            .await
            .map_err(|err| SyncError::persistence(path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textmirror_testkit::TempMirror;

    #[test]
    fn strips_scheme() {
        assert_eq!(
            relative_path_for("https://example.com/notes/today").unwrap(),
            PathBuf::from("example.com/notes/today")
        );
        assert_eq!(
            relative_path_for("http://localhost:8888/doc").unwrap(),
            PathBuf::from("localhost:8888/doc")
        );
        assert_eq!(
            relative_path_for("example.com/./doc").unwrap(),
            PathBuf::from("example.com/doc")
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        for bad in ["https://", "https://example.com/../../etc/passwd", "/etc/passwd", ""] {
            assert!(
                matches!(relative_path_for(bad), Err(SyncError::InvalidDocumentId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn writes_create_parents() {
        let mirror = TempMirror::new();
        let sink = DirectorySink::new(mirror.root());
        let relative = PathBuf::from("example.com/a/b");

        sink.write(&relative, "hello 😀").await.unwrap();
        assert_eq!(mirror.read("example.com/a/b").as_deref(), Some("hello 😀"));
        assert_eq!(sink.read(&relative).await.unwrap(), "hello 😀");
    }

    #[tokio::test]
    async fn missing_file_is_a_persistence_error() {
        let mirror = TempMirror::new();
        let sink = DirectorySink::new(mirror.root());
        let err = sink.read(Path::new("nope")).await.unwrap_err();
        assert!(matches!(err, SyncError::Persistence { .. }));
    }
}

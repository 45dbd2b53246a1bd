//! File-based status source.
//!
//! Reads status output that another process writes to a file, for setups
//! where the exporter cannot run the status command itself.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use olicense_pipeline::{RawStatus, StatusSource};
use olicense_status::StatusError;

/// A status source that reads the whole file on every fetch.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self { path, description }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatusSource for FileSource {
    async fn fetch(&self) -> Result<RawStatus, StatusError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            StatusError::SourceUnavailable(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        Ok(RawStatus::new(String::from_utf8_lossy(&bytes)))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_source_new() {
        let source = FileSource::new("/tmp/status.json");
        assert_eq!(source.path(), Path::new("/tmp/status.json"));
        assert_eq!(source.description(), "file: /tmp/status.json");
    }

    #[tokio::test]
    async fn test_file_source_reads_current_contents() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"total\": 10}}").unwrap();

        let source = FileSource::new(file.path());
        assert_eq!(source.fetch().await.unwrap().text, "{\"total\": 10}");

        // Every fetch re-reads the file.
        file.as_file_mut().set_len(0).unwrap();
        file.rewind().unwrap();
        write!(file, "{{\"total\": 20}}").unwrap();
        assert_eq!(source.fetch().await.unwrap().text, "{\"total\": 20}");
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let source = FileSource::new("/nonexistent/path/status.json");
        match source.fetch().await {
            Err(StatusError::SourceUnavailable(msg)) => {
                assert!(msg.contains("/nonexistent/path/status.json"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

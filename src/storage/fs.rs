//! Filesystem byte store writing `<dir>/<job id>_processed.csv`

use super::{ByteStore, ResultRef, ResultWriter};
use crate::jobs::JobId;
use async_trait::async_trait;
use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte store backed by one file per job in a single directory
#[derive(Debug, Clone)]
pub struct FsByteStore {
    dir: PathBuf,
}

impl FsByteStore {
    /// Open the store, creating `dir` if it does not exist
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Filesystem byte store ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{job_id}_processed.csv"))
    }
}

#[async_trait]
impl ByteStore for FsByteStore {
    fn location(&self, job_id: &JobId) -> ResultRef {
        ResultRef::new(self.path_for(job_id).to_string_lossy())
    }

    fn writer(&self, job_id: &JobId) -> io::Result<(ResultRef, ResultWriter)> {
        let file = File::create(self.path_for(job_id))?;
        Ok((self.location(job_id), Box::new(BufWriter::new(file))))
    }

    async fn read(&self, location: &ResultRef) -> io::Result<Bytes> {
        let contents = tokio::fs::read(location.as_str()).await?;
        Ok(Bytes::from(contents))
    }

    async fn remove(&self, location: &ResultRef) -> io::Result<()> {
        match tokio::fs::remove_file(location.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsByteStore::new(temp_dir.path().join("processed_files")).unwrap();
        let job_id = Uuid::new_v4();

        let (location, mut writer) = store.writer(&job_id).unwrap();
        writer.write_all(b"a,has_email\n").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert!(location.as_str().ends_with(&format!("{job_id}_processed.csv")));
        assert_eq!(store.read(&location).await.unwrap(), Bytes::from_static(b"a,has_email\n"));

        store.remove(&location).await.unwrap();
        assert!(store.read(&location).await.is_err());
        // Second removal is a no-op
        store.remove(&location).await.unwrap();
    }

    #[test]
    fn test_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        let store = FsByteStore::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested.as_path());
        assert_eq!(store.backend_name(), "filesystem");
    }
}

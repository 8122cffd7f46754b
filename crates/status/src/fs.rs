use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};

use crate::error::Error;
use crate::store::Store;

/// Key-value store keeping one file per key in a directory.
#[derive(Clone, Debug)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Creates a new `FsStore` in `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl Store for FsStore {
    type Error = Error;

    async fn del<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error> {
        match fs::remove_file(self.file_path(&key.into())).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io("error deleting file", e)),
        }
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Bytes>, Self::Error> {
        match fs::read(self.file_path(&key.into())).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io("error reading file", e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, Self::Error> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io("error reading directory", e)),
        };
        let mut keys = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io("error reading directory entry", e))?
        {
            if let Some(key) = entry.file_name().to_str() {
                // in-flight writes
                if !key.ends_with(".tmp") {
                    keys.push(key.to_string());
                }
            }
        }

        Ok(keys)
    }

    async fn put<K: Into<String> + Send>(&self, key: K, bytes: Bytes) -> Result<(), Self::Error> {
        let path = self.file_path(&key.into());
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Io("error creating directory", e))?;

        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| Error::Io("error creating file", e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| Error::Io("error writing file", e))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Io("error syncing file", e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Io("error renaming file", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path().join("status"));

        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(store.get("nothing").await.unwrap(), None);
        store.del("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_get_del() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path().join("status"));

        store.put("a", Bytes::from_static(b"1")).await.unwrap();
        store.put("a", Bytes::from_static(b"2")).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["a".to_string()]);
        assert_eq!(
            store.get("a").await.unwrap(),
            Some(Bytes::from_static(b"2"))
        );

        store.del("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}

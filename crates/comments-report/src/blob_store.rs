//! The opaque blob store backing materialized reports: one file per
//! `DlRequest`, named by its `filename` and extension by format.

use std::path::{Path, PathBuf};

use comments_core::DlFormat;
use snafu::{Location, ResultExt as _, Snafu};
use tokio::fs;
use tokio::io::AsyncWriteExt as _;

#[derive(Debug, Snafu)]
pub enum BlobStoreError {
    #[snafu(display("Failed to create blob store directory {path}: {source}"))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to write blob {path}: {source}"))]
    Write {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to rename blob into place {path}: {source}"))]
    Rename {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to open blob {path}: {source}"))]
    Open {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}
pub type BlobStoreResult<T> = std::result::Result<T, BlobStoreError>;

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> BlobStoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .context(CreateDirSnafu { path: root.clone() })?;
        Ok(Self { root })
    }

    pub fn path_for(&self, filename: &str, fmt: DlFormat) -> PathBuf {
        self.root.join(format!("{filename}.{}", fmt.extension()))
    }

    /// Writes `contents` to the blob for `filename`, using a temp-file +
    /// rename so concurrent readers never observe a partial file: the
    /// report builder's contract ("writer completes before publishing the
    /// completion signal") relies on the rename being the only thing that
    /// makes the final path exist.
    pub async fn write_atomic(
        &self,
        filename: &str,
        fmt: DlFormat,
        contents: &[u8],
    ) -> BlobStoreResult<PathBuf> {
        let final_path = self.path_for(filename, fmt);
        let tmp_path = self.root.join(format!("{filename}.{}.tmp", fmt.extension()));

        let mut file = fs::File::create(&tmp_path)
            .await
            .context(WriteSnafu { path: tmp_path.clone() })?;
        file.write_all(contents)
            .await
            .context(WriteSnafu { path: tmp_path.clone() })?;
        file.flush()
            .await
            .context(WriteSnafu { path: tmp_path.clone() })?;
        drop(file);

        fs::rename(&tmp_path, &final_path)
            .await
            .context(RenameSnafu { path: final_path.clone() })?;
        Ok(final_path)
    }

    pub async fn read(&self, filename: &str, fmt: DlFormat) -> BlobStoreResult<Vec<u8>> {
        let path = self.path_for(filename, fmt);
        fs::read(&path).await.context(OpenSnafu { path })
    }

    pub fn exists(&self, filename: &str, fmt: DlFormat) -> bool {
        self.path_for(filename, fmt).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        assert!(!store.exists("abc", DlFormat::Xml));
        store.write_atomic("abc", DlFormat::Xml, b"<report/>").await.unwrap();
        assert!(store.exists("abc", DlFormat::Xml));

        let bytes = store.read("abc", DlFormat::Xml).await.unwrap();
        assert_eq!(bytes, b"<report/>");
    }

    #[test_log::test(tokio::test)]
    async fn write_atomic_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        store.write_atomic("xyz", DlFormat::Xml, b"data").await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["xyz.xml".to_string()]);
    }

    #[test_log::test(tokio::test)]
    async fn read_of_missing_blob_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        assert!(store.read("missing", DlFormat::Xml).await.is_err());
    }
}

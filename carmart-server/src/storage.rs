use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use carmart_api::ObjectStorage;

/// Stores objects as files under `root`, served back from `public_url`
pub struct FsStorage {
    root: PathBuf,
    public_url: String,
}

impl FsStorage {
    pub fn new(root: PathBuf, public_url: String) -> FsStorage {
        FsStorage {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn file(&self, path: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(path);
        anyhow::ensure!(
            !path.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_))),
            "invalid object path {path:?}"
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStorage for FsStorage {
    async fn upload(&self, path: &str, content_type: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let file = self.file(path)?;
        if let Some(dir) = file.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating directory {dir:?}"))?;
        }
        tokio::fs::write(&file, data)
            .await
            .with_context(|| format!("writing object {file:?}"))?;
        tracing::debug!(%path, %content_type, "stored object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_url, path)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        let file = self.file(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing object {file:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_and_delete() {
        let dir = tempfile::tempdir().expect("creating tempdir");
        let storage = FsStorage::new(dir.path().to_path_buf(), String::from("http://cdn/"));

        storage
            .upload("listings/1/abc-front.jpg", "image/jpeg", vec![1, 2, 3])
            .await
            .unwrap();
        let file = dir.path().join("listings/1/abc-front.jpg");
        assert_eq!(std::fs::read(&file).unwrap(), vec![1, 2, 3]);
        assert_eq!(
            storage.public_url("listings/1/abc-front.jpg"),
            "http://cdn/listings/1/abc-front.jpg"
        );

        storage.delete("listings/1/abc-front.jpg").await.unwrap();
        assert!(!file.exists());
        // deleting twice is fine
        storage.delete("listings/1/abc-front.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn paths_stay_under_root() {
        let dir = tempfile::tempdir().expect("creating tempdir");
        let storage = FsStorage::new(dir.path().to_path_buf(), String::from("http://cdn"));
        assert!(storage.upload("../escape", "image/png", vec![1]).await.is_err());
        assert!(storage.upload("/etc/passwd", "image/png", vec![1]).await.is_err());
        assert!(storage.upload("", "image/png", vec![1]).await.is_err());
        assert!(storage.delete("a/../../b").await.is_err());
    }
}

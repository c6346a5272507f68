use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Directory where uploaded documents live until they are analyzed.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("financial_document_{id}.pdf"))
    }

    /// Writes `bytes` under a fresh unique name. The returned guard deletes the
    /// file when dropped unless ownership is handed off with [`TempUpload::into_path`].
    pub async fn save(&self, bytes: &[u8]) -> std::io::Result<TempUpload> {
        self.ensure().await?;

        let path = self.path_for(Uuid::new_v4());
        tokio::fs::write(&path, bytes).await?;

        Ok(TempUpload { path: Some(path) })
    }
}

#[derive(Debug)]
pub struct TempUpload {
    path: Option<PathBuf>,
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Disarms the guard; whoever holds the path is now responsible for deleting it.
    pub fn into_path(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }

    /// Deletes the file now.
    pub async fn cleanup(mut self) {
        if let Some(path) = self.path.take() {
            remove_upload(&path).await;
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove upload")
                }
            }
        }
    }
}

/// Best-effort delete. A file that is already gone counts as removed.
pub async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove upload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_uploads_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path().join("uploads"));

        let a = uploads.save(b"%PDF-a").await.unwrap();
        let b = uploads.save(b"%PDF-b").await.unwrap();

        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("financial_document_") && name.ends_with(".pdf"));
        assert_eq!(std::fs::read(a.path()).unwrap(), b"%PDF-a");
    }

    #[tokio::test]
    async fn guard_removes_file_on_drop_and_on_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path());

        let dropped = uploads.save(b"x").await.unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let cleaned = uploads.save(b"y").await.unwrap();
        let cleaned_path = cleaned.path().to_path_buf();
        cleaned.cleanup().await;
        assert!(!cleaned_path.exists());
    }

    #[tokio::test]
    async fn handed_off_upload_survives_the_guard() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path());

        let path = uploads.save(b"z").await.unwrap().into_path();
        assert!(path.exists());

        remove_upload(&path).await;
        assert!(!path.exists());
        // second removal is a no-op
        remove_upload(&path).await;
    }
}

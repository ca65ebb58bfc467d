use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use uuid::Uuid;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Persist a blob and return the stable public path it is retrievable
    /// under. `suggested_name` only influences the stored filename, it is
    /// never used verbatim.
    async fn store(&self, body: Bytes, suggested_name: &str) -> anyhow::Result<String>;
    async fn delete(&self, public_path: &str) -> anyhow::Result<()>;
}

/// Filesystem-backed blob storage for uploaded images.
///
/// Each upload gets a generated unique filename so concurrent writers never
/// collide and client-supplied names cannot escape the upload directory.
pub struct FsStorage {
    root: PathBuf,
    public_base: String,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }

    fn file_name_from_public(&self, public_path: &str) -> Option<String> {
        let rest = public_path.strip_prefix(&self.public_base)?;
        let rest = rest.trim_start_matches('/');
        // Only plain filenames ever come back out of `store`.
        if rest.is_empty() || rest.contains('/') || rest.contains("..") {
            return None;
        }
        Some(rest.to_string())
    }
}

/// Strip directory components and anything outside a conservative character
/// set from a client-supplied filename.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.' || c == '_') {
        "upload.bin".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl StorageClient for FsStorage {
    async fn store(&self, body: Bytes, suggested_name: &str) -> anyhow::Result<String> {
        let file_name = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(suggested_name));
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create upload dir {}", self.root.display()))?;
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        Ok(format!(
            "{}/{}",
            self.public_base.trim_end_matches('/'),
            file_name
        ))
    }

    async fn delete(&self, public_path: &str) -> anyhow::Result<()> {
        let Some(file_name) = self.file_name_from_public(public_path) else {
            anyhow::bail!("not a managed upload path: {public_path}");
        };
        let path = self.root.join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove upload {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("stockroom-storage-{}", Uuid::new_v4()))
    }

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).jpg"), "my_photo__1_.jpg");
        assert_eq!(sanitize_file_name(""), "upload.bin");
        assert_eq!(sanitize_file_name("..."), "upload.bin");
    }

    #[tokio::test]
    async fn store_generates_unique_names() {
        let root = temp_root();
        let storage = FsStorage::new(&root, "/uploads");

        let a = storage
            .store(Bytes::from_static(b"one"), "photo.png")
            .await
            .unwrap();
        let b = storage
            .store(Bytes::from_static(b"two"), "photo.png")
            .await
            .unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with("/uploads/"));
        assert!(a.ends_with("_photo.png"));

        let on_disk = root.join(a.strip_prefix("/uploads/").unwrap());
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"one");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_scoped() {
        let root = temp_root();
        let storage = FsStorage::new(&root, "/uploads");

        let path = storage
            .store(Bytes::from_static(b"bytes"), "img.jpg")
            .await
            .unwrap();
        storage.delete(&path).await.unwrap();
        // Second delete of an already-removed blob is not an error.
        storage.delete(&path).await.unwrap();

        // Paths outside the managed namespace are rejected.
        assert!(storage.delete("/etc/passwd").await.is_err());
        assert!(storage.delete("/uploads/a/../b").await.is_err());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}

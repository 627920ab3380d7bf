//! Filesystem storage for rendered dossiers.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

const ARTIFACT_EXTENSION: &str = "pdf";

#[derive(Debug, Error)]
pub enum ArtifactStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory of immutable dossier files.
///
/// Files are named `{customer_id}-{unix_millis}.pdf` and are never overwritten.
/// Writes land in a hidden `.{uuid}.tmp` sibling first, are synced to disk and
/// then hard-linked under the final name, so a reader never observes a partial
/// file. A crash mid-write leaves only the hidden temporary file behind.
#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durably write a dossier and return its file name.
    ///
    /// When a file for the same millisecond already exists the timestamp is bumped
    /// until a free name is found, keeping names unique and ordered. Claiming a
    /// name is a single `link` call, so concurrent writers never share one.
    pub async fn store_pdf(
        &self,
        customer_id: Uuid,
        generated_at: OffsetDateTime,
        bytes: &[u8],
    ) -> Result<String, ArtifactStorageError> {
        fs::create_dir_all(&self.root).await?;

        let temp_path = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(err) = write_synced(&temp_path, bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        let published = self.publish(&temp_path, customer_id, generated_at).await;
        let _ = fs::remove_file(&temp_path).await;
        published
    }

    async fn publish(
        &self,
        temp_path: &Path,
        customer_id: Uuid,
        generated_at: OffsetDateTime,
    ) -> Result<String, ArtifactStorageError> {
        let mut millis = unix_millis(generated_at);
        loop {
            let candidate = format!("{customer_id}-{millis}.{ARTIFACT_EXTENSION}");
            match fs::hard_link(temp_path, self.root.join(&candidate)).await {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => millis += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Attempt to read a stored dossier into memory.
    pub async fn read(&self, file_name: &str) -> Result<Bytes, ArtifactStorageError> {
        let absolute = self.resolve(file_name)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a stored dossier. Missing files are treated as success.
    pub async fn delete(&self, file_name: &str) -> Result<(), ArtifactStorageError> {
        let absolute = self.resolve(file_name)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ArtifactStorageError::Io(err)),
        }
    }

    /// Resolve a bare file name inside the storage root.
    fn resolve(&self, file_name: &str) -> Result<PathBuf, ArtifactStorageError> {
        let path = Path::new(file_name);
        let mut components = path.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(ArtifactStorageError::InvalidPath),
        }
        if file_name.starts_with('.') {
            return Err(ArtifactStorageError::InvalidPath);
        }
        Ok(self.root.join(path))
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

fn unix_millis(at: OffsetDateTime) -> i128 {
    at.unix_timestamp_nanos() / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn storage() -> (TempDir, ArtifactStorage) {
        let dir = TempDir::new().expect("temp dir");
        let storage = ArtifactStorage::new(dir.path().join("pdfs")).expect("storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn store_names_file_after_customer_and_millis() {
        let (_dir, storage) = storage();
        let id = Uuid::new_v4();
        let at = datetime!(2024-05-01 12:00:00.123 UTC);

        let name = storage.store_pdf(id, at, b"%PDF-1.3").await.expect("stored");

        assert_eq!(name, format!("{id}-{}.pdf", 1_714_564_800_123_i64));
        assert_eq!(
            storage.read(&name).await.expect("readable").as_ref(),
            b"%PDF-1.3"
        );
    }

    #[tokio::test]
    async fn same_millisecond_never_overwrites() {
        let (_dir, storage) = storage();
        let id = Uuid::new_v4();
        let at = datetime!(2024-05-01 12:00:00.123 UTC);

        let first = storage.store_pdf(id, at, b"first").await.expect("first");
        let second = storage.store_pdf(id, at, b"second").await.expect("second");

        assert_ne!(first, second);
        assert_eq!(storage.read(&first).await.expect("first").as_ref(), b"first");
        assert_eq!(
            storage.read(&second).await.expect("second").as_ref(),
            b"second"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stores_in_one_millisecond_keep_every_file() {
        let (_dir, storage) = storage();
        let storage = std::sync::Arc::new(storage);
        let id = Uuid::new_v4();
        let at = datetime!(2024-05-01 12:00:00.123 UTC);

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let storage = storage.clone();
                tokio::spawn(async move {
                    let body = format!("copy-{n}");
                    let name = storage
                        .store_pdf(id, at, body.as_bytes())
                        .await
                        .expect("stored");
                    (name, body)
                })
            })
            .collect();

        let mut names = Vec::new();
        for writer in writers {
            let (name, body) = writer.await.expect("writer joins");
            assert_eq!(
                storage.read(&name).await.expect("readable").as_ref(),
                body.as_bytes()
            );
            names.push(name);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);

        let on_disk = std::fs::read_dir(storage.root()).expect("listing").count();
        assert_eq!(on_disk, 8);
    }

    #[tokio::test]
    async fn no_temporary_files_remain_after_store() {
        let (_dir, storage) = storage();
        storage
            .store_pdf(Uuid::new_v4(), OffsetDateTime::now_utc(), b"data")
            .await
            .expect("stored");

        let names: Vec<String> = std::fs::read_dir(storage.root())
            .expect("listing")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with('.'));
    }

    #[tokio::test]
    async fn store_recreates_missing_root() {
        let (_dir, storage) = storage();
        std::fs::remove_dir_all(storage.root()).expect("remove root");

        storage
            .store_pdf(Uuid::new_v4(), OffsetDateTime::now_utc(), b"data")
            .await
            .expect("stored after root removal");
        assert!(storage.root().is_dir());
    }

    #[tokio::test]
    async fn resolve_rejects_traversal_and_hidden_names() {
        let (_dir, storage) = storage();
        for name in ["../etc/passwd", "nested/file.pdf", ".secret.pdf.tmp", "/abs.pdf", ""] {
            assert!(
                matches!(
                    storage.read(name).await,
                    Err(ArtifactStorageError::InvalidPath)
                ),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn delete_missing_file_is_ok() {
        let (_dir, storage) = storage();
        storage.delete("missing.pdf").await.expect("idempotent delete");
    }
}

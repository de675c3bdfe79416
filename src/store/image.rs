use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

/// Default upper bound for a single image, 1 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 1 << 20;

const MAX_IMAGE_TYPE_LEN: usize = 10;

/// Stores uploaded laptop images under a root directory.
///
/// Images become visible only through [`UploadSession::finalize`], which
/// writes to a temporary file in the root and renames it into place.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
    max_size: usize,
}

/// Metadata of a finalized image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredImage {
    /// Generated image id.
    pub id: String,
    /// Laptop the image belongs to.
    pub laptop_id: String,
    /// Declared file extension, including the leading dot.
    pub image_type: String,
    /// Number of bytes written.
    pub size: u64,
    /// Final location on disk.
    pub path: PathBuf,
}

impl ImageStore {
    /// Creates a store writing under `root`, accepting images up to `max_size` bytes.
    pub fn new(root: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            root: root.into(),
            max_size,
        }
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Largest accepted image, in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Opens an upload session for `laptop_id`.
    ///
    /// `image_type` must be a file extension such as `.jpg`; anything else
    /// could steer the final file name outside the root.
    pub fn begin(&self, laptop_id: &str, image_type: &str) -> Result<UploadSession> {
        validate_image_type(image_type)?;

        Ok(UploadSession {
            laptop_id: laptop_id.to_string(),
            image_type: image_type.to_string(),
            buffer: Vec::new(),
            root: self.root.clone(),
            max_size: self.max_size,
        })
    }
}

fn validate_image_type(image_type: &str) -> Result<()> {
    let Some(extension) = image_type.strip_prefix('.') else {
        return Err(Error::InvalidArgument(format!(
            "image type '{image_type}' must start with '.'"
        )));
    };

    if extension.is_empty()
        || extension.len() > MAX_IMAGE_TYPE_LEN
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(Error::InvalidArgument(format!(
            "image type '{image_type}' is not a valid file extension"
        )));
    }

    Ok(())
}

/// Bytes of one in-flight upload.
///
/// Owned by the receiving call alone. Dropping the session without calling
/// [`UploadSession::finalize`] discards everything received so far.
#[derive(Debug)]
pub struct UploadSession {
    laptop_id: String,
    image_type: String,
    buffer: Vec<u8>,
    root: PathBuf,
    max_size: usize,
}

impl UploadSession {
    /// Appends a chunk, rejecting it if the image would exceed the size limit.
    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let size = self.buffer.len().saturating_add(chunk.len());
        if size > self.max_size {
            return Err(Error::InvalidArgument(format!(
                "image is too large: {size} > {}",
                self.max_size
            )));
        }

        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Bytes received so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true when no bytes were received.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Laptop this upload belongs to.
    pub fn laptop_id(&self) -> &str {
        &self.laptop_id
    }

    /// Writes the image under a fresh id on a blocking thread.
    pub async fn finalize(self) -> Result<StoredImage> {
        tokio::task::spawn_blocking(move || self.persist())
            .await
            .map_err(|e| Error::Internal(format!("image write task failed: {e}")))?
    }

    fn persist(self) -> Result<StoredImage> {
        let id = Uuid::new_v4().to_string();
        let path = self.root.join(format!("{id}{}", self.image_type));

        std::fs::create_dir_all(&self.root)?;

        let mut file = NamedTempFile::new_in(&self.root)?;
        file.write_all(&self.buffer)?;
        file.as_file().sync_all()?;
        file.persist_noclobber(&path)
            .map_err(|e| Error::Internal(format!("cannot save image file: {}", e.error)))?;

        debug!(id = %id, path = %path.display(), size = self.buffer.len(), "image persisted");

        Ok(StoredImage {
            id,
            laptop_id: self.laptop_id,
            image_type: self.image_type,
            size: self.buffer.len() as u64,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn finalized_upload_is_written_under_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), DEFAULT_MAX_IMAGE_BYTES);

        let mut session = store.begin("laptop-1", ".jpg").unwrap();
        session.append(b"hello ").unwrap();
        session.append(b"world").unwrap();
        assert_eq!(session.len(), 11);

        let stored = session.finalize().await.unwrap();

        assert_eq!(stored.size, 11);
        assert_eq!(stored.path, dir.path().join(format!("{}.jpg", stored.id)));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello world");
        assert_eq!(entries(dir.path()), 1);
    }

    #[tokio::test]
    async fn dropped_session_leaves_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), DEFAULT_MAX_IMAGE_BYTES);

        let mut session = store.begin("laptop-1", ".png").unwrap();
        session.append(&[0u8; 4096]).unwrap();
        drop(session);

        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let store = ImageStore::new("unused", 8);
        let mut session = store.begin("laptop-1", ".jpg").unwrap();

        session.append(b"12345678").unwrap();
        let err = session.append(b"9").unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(session.len(), 8);
    }

    #[test]
    fn image_type_must_be_plain_extension() {
        let store = ImageStore::new("unused", DEFAULT_MAX_IMAGE_BYTES);

        for bad in ["", "jpg", ".", "./../x", "/etc/passwd", ".a/b", ".verylongextension"] {
            assert!(
                matches!(store.begin("laptop-1", bad), Err(Error::InvalidArgument(_))),
                "image type {bad:?} should be rejected"
            );
        }
        assert!(store.begin("laptop-1", ".jpeg").is_ok());
    }

    #[tokio::test]
    async fn finalize_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("img");
        let store = ImageStore::new(&root, DEFAULT_MAX_IMAGE_BYTES);

        let stored = store.begin("laptop-1", ".jpg").unwrap().finalize().await.unwrap();

        assert_eq!(stored.size, 0);
        assert!(stored.path.starts_with(&root));
        assert!(stored.path.exists());
    }
}

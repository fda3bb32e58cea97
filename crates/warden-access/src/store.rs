use crate::capability::ImageStore;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageStoreError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("invalid image name: {0:?}")]
    InvalidName(String),
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reference images stored as files in one directory (e.g. `/sdcard/faces`).
#[derive(Debug, Clone)]
pub struct DirImageStore {
    root: PathBuf,
}

impl DirImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageStore for DirImageStore {
    fn read_enrollment_image(&self, name: &str) -> Result<Vec<u8>, ImageStoreError> {
        // Plain file names only; no escaping the store directory.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ImageStoreError::InvalidName(name.to_string()));
        }
        let path = self.root.join(name);
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ImageStoreError::NotFound(path.display().to_string()),
            _ => ImageStoreError::Io {
                name: name.to_string(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_file_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user1.jpg"), b"jpeg").unwrap();
        let store = DirImageStore::new(dir.path());
        assert_eq!(store.read_enrollment_image("user1.jpg").unwrap(), b"jpeg");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(dir.path());
        assert!(matches!(
            store.read_enrollment_image("user1.jpg"),
            Err(ImageStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let store = DirImageStore::new("/tmp");
        for name in ["../etc/passwd", "faces/user1.jpg", "..", ""] {
            assert!(
                matches!(store.read_enrollment_image(name), Err(ImageStoreError::InvalidName(_))),
                "{name:?} accepted"
            );
        }
    }
}

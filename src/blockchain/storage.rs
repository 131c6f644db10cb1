use log::debug;
use thiserror::Error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Corrupt chain file: {0}")]
    Corrupt(String),
}

/// Whole-chain snapshot kept in a single JSON file
///
/// Every save rewrites the complete list of blocks. The new contents go to a
/// sibling temporary file first and are renamed over the old snapshot.
#[derive(Debug, Clone)]
pub struct ChainStore {
    path: PathBuf,
}

impl ChainStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ChainStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the full chain, overwriting any previous snapshot
    pub async fn save<'a, I>(&self, blocks: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let blocks: Vec<&Block> = blocks.into_iter().collect();
        let bytes = serde_json::to_vec_pretty(&blocks)?;

        let staging = self.staging_path();
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        debug!("Saved {} blocks to {}", blocks.len(), self.path.display());
        Ok(())
    }

    /// Reads back a previously saved chain
    ///
    /// Fails with `NotFound` when no snapshot exists and `Corrupt` when the
    /// file is not a non-empty list of blocks.
    pub fn load(&self) -> Result<Vec<Block>, StorageError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!(
                    "No chain file at {}",
                    self.path.display()
                )))
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        let blocks: Vec<Block> =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        if blocks.is_empty() {
            return Err(StorageError::Corrupt("chain file holds no blocks".to_string()));
        }

        Ok(blocks)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

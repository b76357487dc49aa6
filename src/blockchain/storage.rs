use std::path::Path;

use log::warn;
use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Durable copy of the chain
///
/// Blocks live in the `blocks` tree keyed by their big-endian index, so sled's
/// key order is chain order. Values are bincode encoded `Block`s, whose field
/// order and integer widths match the hashing stream.
pub struct ChainStorage {
    /// The database instance
    db: Db,

    /// Tree for blocks
    blocks: Tree,

    /// Tree for metadata
    metadata: Tree,
}

impl std::fmt::Debug for ChainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStorage").finish()
    }
}

const DIFFICULTY_KEY: &str = "difficulty";

impl ChainStorage {
    /// Opens (or creates) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;

        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self { db, blocks, metadata })
    }

    /// Saves a block under its index
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.blocks.insert(block.index.to_be_bytes(), value)?;
        Ok(())
    }

    /// Removes a block that was saved but never committed
    pub fn remove_block(&self, index: u64) -> Result<(), StorageError> {
        self.blocks.remove(index.to_be_bytes())?;
        Ok(())
    }

    /// Gets all blocks in index order
    ///
    /// Undecodable entries are skipped with a warning; the resulting gap is
    /// then reported by chain validation.
    pub fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();
        let mut deserialization_errors = Vec::new();

        for result in self.blocks.iter() {
            let (key, value) = result?;
            match bincode::deserialize::<Block>(&value) {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    deserialization_errors.push(format!("Failed to deserialize block {:?}: {}", key.as_ref(), e));
                }
            }
        }

        if !deserialization_errors.is_empty() {
            if blocks.is_empty() {
                return Err(StorageError::DeserializationError(
                    deserialization_errors.join(", "),
                ));
            }
            warn!("Some blocks could not be deserialized: {}", deserialization_errors.join(", "));
        }

        Ok(blocks)
    }

    /// Records the difficulty the stored blocks were mined at
    pub fn save_difficulty(&self, difficulty: usize) -> Result<(), StorageError> {
        self.metadata.insert(DIFFICULTY_KEY, (difficulty as u64).to_be_bytes().to_vec())?;
        Ok(())
    }

    pub fn load_difficulty(&self) -> Result<Option<usize>, StorageError> {
        match self.metadata.get(DIFFICULTY_KEY)? {
            Some(value) => {
                let bytes: [u8; 8] = value.as_ref().try_into().map_err(|_| {
                    StorageError::DeserializationError("difficulty is not 8 bytes".to_string())
                })?;
                Ok(Some(u64::from_be_bytes(bytes) as usize))
            }
            None => Ok(None),
        }
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

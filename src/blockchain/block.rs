use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::hash::{ContentHasher, HASH_HEX_LEN};
use super::transaction::Transaction;

/// Fixed creation time of the genesis block (seconds since epoch)
pub const GENESIS_TIMESTAMP: i64 = 1_700_000_000;

/// `previous_hash` sentinel carried by the genesis block
pub fn genesis_previous_hash() -> String {
    "0".repeat(HASH_HEX_LEN)
}

/// Represents a block in the blockchain
///
/// Fields are declared in hashing order so that a bincode round trip through
/// storage reproduces the exact bytes the hash was computed over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Time the block was sealed (seconds since epoch)
    pub timestamp: i64,

    /// Transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work
    pub nonce: u64,

    /// Hash of the current block
    pub hash: String,
}

impl Block {
    /// Creates a block and computes its hash
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `timestamp` - The sealing time
    /// * `transactions` - The transactions to include
    /// * `previous_hash` - The hash of the previous block
    /// * `nonce` - The proof of work
    pub fn new(index: u64, timestamp: i64, transactions: Vec<Transaction>, previous_hash: String, nonce: u64) -> Self {
        let hash = Self::hash_prefix(index, timestamp, &transactions, &previous_hash)
            .put_nonce(nonce)
            .finish();

        Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            hash,
        }
    }

    /// The first block of every chain. Exempt from the proof predicate
    pub fn genesis() -> Self {
        Block::new(0, GENESIS_TIMESTAMP, Vec::new(), genesis_previous_hash(), 0)
    }

    /// Recomputes the hash from the block's own fields
    pub fn calculate_hash(&self) -> String {
        Self::hash_prefix(self.index, self.timestamp, &self.transactions, &self.previous_hash)
            .put_nonce(self.nonce)
            .finish()
    }

    /// Digest state covering every field except the nonce.
    ///
    /// The miner clones this once per attempt instead of rehashing the
    /// transactions every time.
    pub(crate) fn hash_prefix(
        index: u64,
        timestamp: i64,
        transactions: &[Transaction],
        previous_hash: &str,
    ) -> NoncePending {
        let mut hasher = ContentHasher::new();
        hasher.put_u64(index).put_i64(timestamp).put_len(transactions.len());
        for transaction in transactions {
            transaction.write_fields(&mut hasher);
            hasher.put_str(&transaction.hash);
        }
        hasher.put_str(previous_hash);
        NoncePending(hasher)
    }
}

/// Block digest waiting for its final field
#[derive(Clone)]
pub(crate) struct NoncePending(ContentHasher);

impl NoncePending {
    pub(crate) fn put_nonce(mut self, nonce: u64) -> ContentHasher {
        self.0.put_u64(nonce);
        self.0
    }
}

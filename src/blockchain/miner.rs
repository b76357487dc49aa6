use log::debug;
use thiserror::Error;

use super::block::Block;
use super::hash::meets_difficulty;
use super::transaction::Transaction;

/// Errors that can occur during mining
#[derive(Debug, Error, PartialEq)]
pub enum MiningError {
    #[error("Mining timed out after {attempts} attempts at difficulty {difficulty}")]
    Timeout { attempts: u64, difficulty: usize },
}

/// Everything needed to seal the next block
#[derive(Debug, Clone)]
pub struct MiningJob {
    /// Index the new block will take
    pub index: u64,

    /// Hash of the tip the block extends
    pub previous_hash: String,

    /// Leading zero hex digits required
    pub difficulty: usize,

    /// Sealing time, pinned for the whole search
    pub timestamp: i64,

    /// Batch drained from the pool
    pub transactions: Vec<Transaction>,
}

/// Bounded proof of work search
#[derive(Debug, Clone)]
pub struct Miner {
    max_attempts: u64,
}

impl Miner {
    pub fn new(max_attempts: u64) -> Self {
        Miner { max_attempts }
    }

    /// Performs proof of work to find a valid hash
    ///
    /// Tries nonces 0, 1, 2, ... against the job's fixed fields. The job is
    /// only borrowed, so on timeout the caller still holds the batch untouched.
    ///
    /// # Returns
    ///
    /// The sealed block, or `MiningError::Timeout` once `max_attempts` nonces fail
    pub fn mine(&self, job: &MiningJob) -> Result<Block, MiningError> {
        let prefix = Block::hash_prefix(job.index, job.timestamp, &job.transactions, &job.previous_hash);

        for nonce in 0..self.max_attempts {
            let hash = prefix.clone().put_nonce(nonce).finish();

            if meets_difficulty(&hash, job.difficulty) {
                debug!(
                    "Found nonce {} for block {} after {} attempts",
                    nonce,
                    job.index,
                    nonce + 1
                );

                return Ok(Block {
                    index: job.index,
                    timestamp: job.timestamp,
                    transactions: job.transactions.clone(),
                    previous_hash: job.previous_hash.clone(),
                    nonce,
                    hash,
                });
            }
        }

        Err(MiningError::Timeout {
            attempts: self.max_attempts,
            difficulty: job.difficulty,
        })
    }
}

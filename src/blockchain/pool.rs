use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use super::chain::Chain;
use super::transaction::Transaction;

/// Errors that can occur during pool operations
#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("Duplicate transaction id: {0}")]
    DuplicateId(String),
}

/// Transactions submitted but not yet sealed in a block, oldest first
#[derive(Debug, Default)]
pub struct TransactionPool {
    pending: VecDeque<Transaction>,
    ids: HashSet<String>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transaction to the back of the queue
    ///
    /// # Arguments
    ///
    /// * `transaction` - The transaction to add
    /// * `chain` - The chain whose mined ids must not be reused
    ///
    /// # Returns
    ///
    /// `DuplicateId` if the id is already pending or mined
    pub fn submit(&mut self, transaction: Transaction, chain: &Chain) -> Result<(), PoolError> {
        if self.ids.contains(&transaction.id) || chain.contains_transaction(&transaction.id) {
            return Err(PoolError::DuplicateId(transaction.id));
        }

        self.ids.insert(transaction.id.clone());
        self.pending.push_back(transaction);
        Ok(())
    }

    /// Removes and returns up to `max_count` of the oldest transactions
    pub fn drain(&mut self, max_count: usize) -> Vec<Transaction> {
        let count = max_count.min(self.pending.len());
        let batch: Vec<Transaction> = self.pending.drain(..count).collect();
        for transaction in &batch {
            self.ids.remove(&transaction.id);
        }
        batch
    }

    /// Puts a drained batch back at the front, keeping its relative order
    pub fn restore(&mut self, batch: Vec<Transaction>) {
        for transaction in batch.into_iter().rev() {
            self.ids.insert(transaction.id.clone());
            self.pending.push_front(transaction);
        }
    }

    /// Removes one pending transaction by id
    pub fn remove(&mut self, id: &str) -> Option<Transaction> {
        if !self.ids.remove(id) {
            return None;
        }
        let position = self.pending.iter().position(|tx| tx.id == id)?;
        self.pending.remove(position)
    }

    pub fn peek_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending transactions in FIFO order
    pub fn pending(&self) -> Vec<Transaction> {
        self.pending.iter().cloned().collect()
    }
}

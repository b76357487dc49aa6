use std::path::Path;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::Block;
use super::catalog::CatalogError;
use super::chain::{Chain, ChainError, ValidationFailure};
use super::miner::{MiningError, MiningJob};
use super::pool::{PoolError, TransactionPool};
use super::storage::{ChainStorage, StorageError};
use super::transaction::Transaction;
use super::wallet::WalletError;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Duplicate transaction id: {0}")]
    DuplicateId(String),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Stock update failed: {0}")]
    StockUpdateFailed(CatalogError),

    #[error("Balance update failed: {0}")]
    BalanceUpdateFailed(WalletError),

    #[error("Ledger is not trusted: {0}")]
    ChainUntrusted(ValidationFailure),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<PoolError> for LedgerError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::DuplicateId(id) => LedgerError::DuplicateId(id),
        }
    }
}

/// Read-only view of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChainSnapshot {
    /// Blocks from genesis to tip
    pub chain: Vec<Block>,

    /// Current mining difficulty
    pub difficulty: usize,

    /// Transactions not yet sealed, oldest first
    pub pending_transactions: Vec<Transaction>,
}

/// Chain and pool, owned together so they change under one lock
#[derive(Debug)]
pub struct Ledger {
    chain: Chain,
    pool: TransactionPool,

    /// Batch drained for the mining job in progress
    in_flight: Vec<Transaction>,

    storage: Option<ChainStorage>,

    /// Set once validation has failed; the chain is no longer trusted
    fault: Option<ValidationFailure>,
}

impl Ledger {
    /// Creates an in-memory ledger holding only the genesis block
    pub fn new(difficulty: usize) -> Self {
        Ledger {
            chain: Chain::genesis(difficulty),
            pool: TransactionPool::new(),
            in_flight: Vec::new(),
            storage: None,
            fault: None,
        }
    }

    /// Creates a ledger backed by a sled database at `storage_path`
    ///
    /// An empty store is seeded with genesis. A stored chain is validated on
    /// load; a corrupt one is kept but flagged untrusted rather than failing.
    pub fn with_storage<P: AsRef<Path>>(storage_path: P, difficulty: usize) -> Result<Self, LedgerError> {
        let storage = ChainStorage::open(storage_path)?;
        let blocks = storage.load_blocks()?;

        let chain = if blocks.is_empty() {
            info!("No existing chain found in storage, creating genesis block");
            let chain = Chain::genesis(difficulty);
            storage.save_block(chain.tip())?;
            storage.save_difficulty(difficulty)?;
            storage.flush()?;
            chain
        } else {
            let stored = storage.load_difficulty()?.unwrap_or(difficulty);
            if stored != difficulty {
                warn!(
                    "Stored chain was mined at difficulty {}, ignoring configured {}",
                    stored, difficulty
                );
            }
            info!("Loaded {} blocks from storage", blocks.len());
            Chain::restore(blocks, stored)
        };

        let fault = chain.validate().err();
        if let Some(failure) = &fault {
            error!("Stored chain failed validation: {}", failure);
        }

        Ok(Ledger {
            chain,
            pool: TransactionPool::new(),
            in_flight: Vec::new(),
            storage: Some(storage),
            fault,
        })
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn difficulty(&self) -> usize {
        self.chain.difficulty()
    }

    /// The validation failure that made this ledger untrusted, if any
    pub fn fault(&self) -> Option<ValidationFailure> {
        self.fault
    }

    pub fn mark_untrusted(&mut self, failure: ValidationFailure) {
        self.fault = Some(failure);
    }

    /// Adds a transaction to the pending pool
    pub fn submit(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        if self.in_flight.iter().any(|tx| tx.id == transaction.id) {
            return Err(LedgerError::DuplicateId(transaction.id));
        }
        self.pool.submit(transaction, &self.chain)?;
        Ok(())
    }

    /// Drains the oldest pending transactions into a job against the current tip
    ///
    /// # Arguments
    ///
    /// * `max_count` - Most transactions to take
    /// * `timestamp` - Sealing time, fixed for the whole search
    pub fn begin_mining(&mut self, max_count: usize, timestamp: i64) -> MiningJob {
        let transactions = self.pool.drain(max_count);
        self.in_flight = transactions.clone();

        MiningJob {
            index: self.chain.len() as u64,
            previous_hash: self.chain.tip_hash().to_string(),
            difficulty: self.chain.difficulty(),
            timestamp,
            transactions,
        }
    }

    /// Returns a job's batch to the front of the pool
    ///
    /// `withdraw` names a transaction that is dropped instead of restored,
    /// whether it was in the batch or still waiting in the pool.
    pub fn abort_mining(&mut self, job: MiningJob, withdraw: Option<&str>) {
        self.in_flight.clear();

        let batch = job
            .transactions
            .into_iter()
            .filter(|tx| Some(tx.id.as_str()) != withdraw)
            .collect();
        self.pool.restore(batch);

        if let Some(id) = withdraw {
            self.pool.remove(id);
        }
    }

    /// Seals a mined block into the chain
    ///
    /// The block is checked against the current tip, persisted, handed to
    /// `settle` for side effects, then appended. Any failure leaves chain and
    /// storage as they were; the caller still owns the job and aborts it.
    pub fn commit<F>(&mut self, block: Block, settle: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&Block) -> Result<(), LedgerError>,
    {
        self.chain.check_candidate(&block)?;

        if let Some(storage) = &self.storage {
            storage.save_block(&block)?;
        }

        if let Err(err) = settle(&block) {
            self.unsave(block.index);
            return Err(err);
        }

        let index = block.index;
        if let Err(err) = self.chain.append(block) {
            self.unsave(index);
            return Err(err.into());
        }
        self.in_flight.clear();

        if let Some(storage) = &self.storage {
            if let Err(err) = storage.flush() {
                warn!("Failed to flush block {} to disk: {}", index, err);
            }
        }

        Ok(())
    }

    fn unsave(&self, index: u64) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.remove_block(index) {
                error!("Failed to remove uncommitted block {}: {}", index, err);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len() + self.pool.peek_count()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        let mut pending = self.in_flight.clone();
        pending.extend(self.pool.pending());
        pending
    }

    /// All mined transactions in chain order
    pub fn mined_transactions(&self) -> Vec<Transaction> {
        self.chain.transactions()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.chain.blocks().to_vec(),
            difficulty: self.chain.difficulty(),
            pending_transactions: self.pending_transactions(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationFailure> {
        self.chain.validate()
    }

    #[cfg(test)]
    pub(crate) fn replace_chain(&mut self, chain: Chain) {
        self.chain = chain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::GENESIS_TIMESTAMP;
    use crate::blockchain::chain::FaultKind;
    use crate::blockchain::miner::Miner;
    use crate::blockchain::transaction::Address;

    fn tx(id: &str) -> Transaction {
        Transaction::with_id(
            id.to_string(),
            "product".to_string(),
            Address::from("buyer"),
            Address::from("seller"),
            2.0,
            GENESIS_TIMESTAMP + 1,
        )
    }

    fn pending_ids(ledger: &Ledger) -> Vec<String> {
        ledger.pending_transactions().into_iter().map(|tx| tx.id).collect()
    }

    #[test]
    fn test_mine_and_commit() {
        let mut ledger = Ledger::new(1);
        ledger.submit(tx("t1")).unwrap();

        let job = ledger.begin_mining(10, GENESIS_TIMESTAMP + 50);
        assert_eq!(ledger.pending_count(), 1);

        let block = Miner::new(1_000_000).mine(&job).unwrap();
        ledger.commit(block, |_| Ok(())).unwrap();

        assert_eq!(ledger.chain().len(), 2);
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.mined_transactions().len(), 1);
        assert_eq!(ledger.validate(), Ok(()));
    }

    #[test]
    fn test_submit_rejects_mined_and_in_flight_ids() {
        let mut ledger = Ledger::new(1);
        ledger.submit(tx("t1")).unwrap();
        let job = ledger.begin_mining(10, GENESIS_TIMESTAMP + 50);

        assert!(matches!(ledger.submit(tx("t1")), Err(LedgerError::DuplicateId(_))));

        let block = Miner::new(1_000_000).mine(&job).unwrap();
        ledger.commit(block, |_| Ok(())).unwrap();

        assert!(matches!(ledger.submit(tx("t1")), Err(LedgerError::DuplicateId(_))));
    }

    #[test]
    fn test_failed_append_changes_nothing() {
        let mut ledger = Ledger::new(1);
        ledger.submit(tx("t1")).unwrap();
        ledger.submit(tx("t2")).unwrap();
        let size_before = ledger.pending_count();

        let job = ledger.begin_mining(10, GENESIS_TIMESTAMP + 50);
        let mut block = Miner::new(1_000_000).mine(&job).unwrap();
        block.nonce += 1;

        let mut settled = false;
        let result = ledger.commit(block, |_| {
            settled = true;
            Ok(())
        });

        assert!(matches!(result, Err(LedgerError::Chain(ChainError::InvalidProof { .. }))));
        assert!(!settled);

        ledger.abort_mining(job, None);
        assert_eq!(ledger.pending_count(), size_before);
        assert_eq!(pending_ids(&ledger), vec!["t1", "t2"]);
        assert_eq!(ledger.chain().len(), 1);
    }

    #[test]
    fn test_failed_settle_is_not_appended() {
        let mut ledger = Ledger::new(1);
        ledger.submit(tx("t1")).unwrap();

        let job = ledger.begin_mining(10, GENESIS_TIMESTAMP + 50);
        let block = Miner::new(1_000_000).mine(&job).unwrap();

        let result = ledger.commit(block, |_| Err(LedgerError::InvalidQuantity));

        assert!(matches!(result, Err(LedgerError::InvalidQuantity)));
        assert_eq!(ledger.chain().len(), 1);
    }

    #[test]
    fn test_abort_withdraws_named_transaction() {
        let mut ledger = Ledger::new(1);
        for id in ["t1", "t2", "t3"] {
            ledger.submit(tx(id)).unwrap();
        }

        let job = ledger.begin_mining(2, GENESIS_TIMESTAMP + 50);
        ledger.abort_mining(job, Some("t2"));
        assert_eq!(pending_ids(&ledger), vec!["t1", "t3"]);

        let job = ledger.begin_mining(1, GENESIS_TIMESTAMP + 50);
        ledger.abort_mining(job, Some("t3"));
        assert_eq!(pending_ids(&ledger), vec!["t1"]);
    }

    #[test]
    fn test_snapshot_is_stable_between_writes() {
        let mut ledger = Ledger::new(1);
        ledger.submit(tx("t1")).unwrap();

        assert_eq!(ledger.snapshot(), ledger.snapshot());
        assert_eq!(ledger.snapshot().pending_transactions.len(), 1);
    }

    #[test]
    fn test_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tip = {
            let mut ledger = Ledger::with_storage(dir.path(), 1).unwrap();
            ledger.submit(tx("t1")).unwrap();
            let job = ledger.begin_mining(10, GENESIS_TIMESTAMP + 50);
            let block = Miner::new(1_000_000).mine(&job).unwrap();
            ledger.commit(block, |_| Ok(())).unwrap();
            ledger.chain().tip_hash().to_string()
        };

        let reloaded = Ledger::with_storage(dir.path(), 3).unwrap();

        assert_eq!(reloaded.chain().len(), 2);
        assert_eq!(reloaded.chain().tip_hash(), tip);
        assert_eq!(reloaded.difficulty(), 1);
        assert_eq!(reloaded.fault(), None);
        assert!(reloaded.chain().contains_transaction("t1"));
    }

    #[test]
    fn test_corrupt_storage_loads_untrusted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut ledger = Ledger::with_storage(dir.path(), 1).unwrap();
            ledger.submit(tx("t1")).unwrap();
            let job = ledger.begin_mining(10, GENESIS_TIMESTAMP + 50);
            let mut block = Miner::new(1_000_000).mine(&job).unwrap();
            ledger.commit(block.clone(), |_| Ok(())).unwrap();

            block.transactions[0].amount = 1_000.0;
            ledger.storage.as_ref().unwrap().save_block(&block).unwrap();
            ledger.storage.as_ref().unwrap().flush().unwrap();
        }

        let reloaded = Ledger::with_storage(dir.path(), 1).unwrap();

        assert_eq!(
            reloaded.fault(),
            Some(ValidationFailure {
                index: 1,
                kind: FaultKind::TransactionHashMismatch
            })
        );
    }
}

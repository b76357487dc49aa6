use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use parking_lot::{FairMutex, RwLock};

use super::catalog::{Catalog, Product};
use super::chain::ValidationFailure;
use super::ledger::{ChainSnapshot, Ledger, LedgerError};
use super::miner::Miner;
use super::transaction::{Address, Transaction};
use super::wallet::BalanceSource;
use crate::config::LedgerConfig;

/// Outcome of a purchase that made it into the chain
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub transaction_hash: String,
    pub block_index: u64,
    pub product_name: String,
    pub quantity: u32,
    pub amount: f64,
}

/// Entry point for purchases and chain reads
///
/// Purchases are serialized through a fair mutex, so they drain, mine, append
/// and settle one at a time in arrival order. The ledger itself sits behind a
/// read-write lock that is only write-held for submit, drain and commit; the
/// nonce search runs without it, leaving reads free to proceed.
#[derive(Clone)]
pub struct LedgerService {
    ledger: Arc<RwLock<Ledger>>,
    writer: Arc<FairMutex<()>>,
    catalog: Arc<dyn Catalog>,
    wallet: Arc<dyn BalanceSource>,
    miner: Miner,
    max_block_transactions: usize,
    seller_address: Address,
}

impl LedgerService {
    pub fn new(
        ledger: Ledger,
        catalog: Arc<dyn Catalog>,
        wallet: Arc<dyn BalanceSource>,
        config: &LedgerConfig,
    ) -> Self {
        LedgerService {
            ledger: Arc::new(RwLock::new(ledger)),
            writer: Arc::new(FairMutex::new(())),
            catalog,
            wallet,
            miner: Miner::new(config.max_mining_attempts),
            max_block_transactions: config.max_block_transactions,
            seller_address: Address(config.seller_address.clone()),
        }
    }

    /// Buys `quantity` units of a product and records the sale on the chain
    ///
    /// Either the transaction is mined, appended and the stock decremented,
    /// or none of it happens and the pool is left as it was found.
    pub fn purchase(&self, product_id: &str, buyer_address: Address, quantity: u32) -> Result<PurchaseReceipt, LedgerError> {
        let _turn = self.writer.lock();

        if let Some(failure) = self.ledger.read().fault() {
            return Err(LedgerError::ChainUntrusted(failure));
        }

        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }

        let product = self
            .catalog
            .get_product(product_id)
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()))?;

        if quantity > product.stock {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                available: product.stock,
            });
        }

        let amount = product.price * quantity as f64;
        let balance = self.wallet.get_balance(&buyer_address);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        let transaction = Transaction::new(
            product.id.clone(),
            buyer_address,
            self.seller_address.clone(),
            amount,
        );
        self.ledger.write().submit(transaction.clone())?;

        // Older pending transactions go first; keep sealing blocks until ours is in one.
        // Purchases run one at a time and each leaves the pool as it found it, so
        // the pool holds only this purchase's transaction here and a single
        // block seals it. Several rounds happen only when transactions were
        // submitted to the ledger directly; blocks sealed for them stay on the
        // chain even if a later round fails.
        loop {
            let job = self
                .ledger
                .write()
                .begin_mining(self.max_block_transactions, Utc::now().timestamp());
            let carries_purchase = job.transactions.iter().any(|tx| tx.id == transaction.id);

            let block = match self.miner.mine(&job) {
                Ok(block) => block,
                Err(err) => {
                    warn!("Mining block {} failed: {}", job.index, err);
                    self.ledger.write().abort_mining(job, Some(transaction.id.as_str()));
                    return Err(err.into());
                }
            };
            let block_index = block.index;

            let mut ledger = self.ledger.write();
            let committed = ledger.commit(block, |_| {
                if !carries_purchase {
                    return Ok(());
                }
                self.settle_purchase(&transaction, &product.id, quantity)
            });

            if let Err(err) = committed {
                warn!("Block {} was not committed: {}", block_index, err);
                ledger.abort_mining(job, Some(transaction.id.as_str()));
                return Err(err);
            }

            info!(
                "Mined block {} with {} transactions",
                block_index,
                job.transactions.len()
            );

            if carries_purchase {
                return Ok(PurchaseReceipt {
                    transaction_id: transaction.id,
                    transaction_hash: transaction.hash,
                    block_index,
                    product_name: product.name,
                    quantity,
                    amount,
                });
            }
        }
    }

    /// Spends the buyer's balance and takes the units out of stock.
    /// On failure neither change remains.
    fn settle_purchase(&self, transaction: &Transaction, product_id: &str, quantity: u32) -> Result<(), LedgerError> {
        self.wallet
            .spend(&transaction.buyer_address, transaction.amount)
            .map_err(LedgerError::BalanceUpdateFailed)?;

        if let Err(err) = self.catalog.decrement_stock(product_id, quantity) {
            if let Err(refund_err) = self.wallet.refund(&transaction.buyer_address, transaction.amount) {
                error!(
                    "Failed to refund {} to {}: {}",
                    transaction.amount, transaction.buyer_address, refund_err
                );
            }
            return Err(LedgerError::StockUpdateFailed(err));
        }

        Ok(())
    }

    pub fn list_products(&self) -> Vec<Product> {
        self.catalog.list_products()
    }

    pub fn list_chain(&self) -> ChainSnapshot {
        self.ledger.read().snapshot()
    }

    pub fn list_mined_transactions(&self) -> Vec<Transaction> {
        self.ledger.read().mined_transactions()
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.read().pending_count()
    }

    pub fn chain_length(&self) -> usize {
        self.ledger.read().chain().len()
    }

    /// Re-validates the whole chain, flagging the ledger untrusted on failure
    pub fn audit(&self) -> Result<(), ValidationFailure> {
        let result = self.ledger.read().validate();

        if let Err(failure) = result {
            error!("Chain audit failed: {}", failure);
            self.ledger.write().mark_untrusted(failure);
        }

        result
    }

    #[cfg(test)]
    pub(crate) fn ledger(&self) -> &Arc<RwLock<Ledger>> {
        &self.ledger
    }
}

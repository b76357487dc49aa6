use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use super::block::{genesis_previous_hash, Block};
use super::hash::meets_difficulty;
use super::transaction::Transaction;

/// Errors that can occur when appending a block
#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("Invalid link at block {index}: {reason}")]
    InvalidLink { index: u64, reason: String },

    #[error("Invalid proof at block {index}: {reason}")]
    InvalidProof { index: u64, reason: String },

    #[error("Block {0} carries no transactions")]
    EmptyBlock(u64),

    #[error("Duplicate transaction id: {0}")]
    DuplicateId(String),
}

/// What broke at the first bad block found by [`Chain::validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    BadGenesis,
    IndexMismatch,
    BrokenLink,
    HashMismatch,
    InsufficientWork,
    TransactionHashMismatch,
    DuplicateTransaction,
    EmptyBlock,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FaultKind::BadGenesis => "malformed genesis block",
            FaultKind::IndexMismatch => "index does not match position",
            FaultKind::BrokenLink => "previous hash does not match predecessor",
            FaultKind::HashMismatch => "stored hash does not match contents",
            FaultKind::InsufficientWork => "hash does not meet difficulty",
            FaultKind::TransactionHashMismatch => "transaction hash does not match contents",
            FaultKind::DuplicateTransaction => "transaction id already mined",
            FaultKind::EmptyBlock => "block carries no transactions",
        };
        f.write_str(text)
    }
}

/// First invariant violation found in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Chain invalid at block {index}: {kind}")]
pub struct ValidationFailure {
    pub index: u64,
    pub kind: FaultKind,
}

/// Ordered, validated sequence of blocks from genesis to tip
#[derive(Debug, Clone)]
pub struct Chain {
    /// The chain of blocks
    blocks: Vec<Block>,

    /// Mining difficulty (number of leading zero hex digits required in hash)
    difficulty: usize,

    /// Every transaction id sealed so far
    mined_ids: HashSet<String>,
}

impl Chain {
    /// Creates a chain holding only the genesis block
    pub fn genesis(difficulty: usize) -> Self {
        Chain {
            blocks: vec![Block::genesis()],
            difficulty,
            mined_ids: HashSet::new(),
        }
    }

    /// Rebuilds a chain from stored blocks without checking them.
    ///
    /// Callers are expected to run [`Chain::validate`] afterwards. An empty
    /// list yields a fresh genesis chain.
    pub fn restore(blocks: Vec<Block>, difficulty: usize) -> Self {
        if blocks.is_empty() {
            return Self::genesis(difficulty);
        }

        let mined_ids = blocks
            .iter()
            .flat_map(|block| block.transactions.iter().map(|tx| tx.id.clone()))
            .collect();

        Chain {
            blocks,
            difficulty,
            mined_ids,
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false for a chain built by `genesis` or `restore`
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn tip(&self) -> &Block {
        // never empty: constructors always seed genesis
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tip_hash(&self) -> &str {
        &self.tip().hash
    }

    pub fn contains_transaction(&self, id: &str) -> bool {
        self.mined_ids.contains(id)
    }

    /// All mined transactions, flattened in chain order
    pub fn transactions(&self) -> Vec<Transaction> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter().cloned())
            .collect()
    }

    /// Checks whether `block` could be appended to the current tip
    pub fn check_candidate(&self, block: &Block) -> Result<(), ChainError> {
        let expected_index = self.blocks.len() as u64;
        if block.index != expected_index {
            return Err(ChainError::InvalidLink {
                index: block.index,
                reason: format!("expected index {}", expected_index),
            });
        }

        if block.previous_hash != self.tip_hash() {
            return Err(ChainError::InvalidLink {
                index: block.index,
                reason: format!("previous hash does not match tip {}", self.tip_hash()),
            });
        }

        if block.transactions.is_empty() {
            return Err(ChainError::EmptyBlock(block.index));
        }

        if let Some(tx) = block.transactions.iter().find(|tx| !tx.has_valid_hash()) {
            return Err(ChainError::InvalidProof {
                index: block.index,
                reason: format!("transaction {} hash does not match contents", tx.id),
            });
        }

        if block.hash != block.calculate_hash() {
            return Err(ChainError::InvalidProof {
                index: block.index,
                reason: "hash does not match contents".to_string(),
            });
        }

        if !meets_difficulty(&block.hash, self.difficulty) {
            return Err(ChainError::InvalidProof {
                index: block.index,
                reason: format!("hash does not meet difficulty {}", self.difficulty),
            });
        }

        let mut seen = HashSet::new();
        for tx in &block.transactions {
            if self.mined_ids.contains(&tx.id) || !seen.insert(tx.id.as_str()) {
                return Err(ChainError::DuplicateId(tx.id.clone()));
            }
        }

        Ok(())
    }

    /// Appends a block after checking link, proof and transaction ids.
    /// The chain is unchanged when an error is returned.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        self.check_candidate(&block)?;

        self.mined_ids
            .extend(block.transactions.iter().map(|tx| tx.id.clone()));
        self.blocks.push(block);
        Ok(())
    }

    /// Re-verifies every link and proof from genesis to tip
    ///
    /// # Returns
    ///
    /// The first block that breaks an invariant, if any
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        let fail = |index: usize, kind: FaultKind| ValidationFailure {
            index: index as u64,
            kind,
        };

        if self.is_empty() {
            return Err(fail(0, FaultKind::BadGenesis));
        }

        let genesis = &self.blocks[0];
        if genesis.index != 0
            || genesis.previous_hash != genesis_previous_hash()
            || !genesis.transactions.is_empty()
        {
            return Err(fail(0, FaultKind::BadGenesis));
        }
        if genesis.hash != genesis.calculate_hash() {
            return Err(fail(0, FaultKind::HashMismatch));
        }

        let mut seen: HashSet<&str> = HashSet::new();

        for (i, pair) in self.blocks.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let i = i + 1;

            if block.index != i as u64 {
                return Err(fail(i, FaultKind::IndexMismatch));
            }
            if block.previous_hash != previous.hash {
                return Err(fail(i, FaultKind::BrokenLink));
            }
            if block.transactions.is_empty() {
                return Err(fail(i, FaultKind::EmptyBlock));
            }
            if block.transactions.iter().any(|tx| !tx.has_valid_hash()) {
                return Err(fail(i, FaultKind::TransactionHashMismatch));
            }
            if block.hash != block.calculate_hash() {
                return Err(fail(i, FaultKind::HashMismatch));
            }
            if !meets_difficulty(&block.hash, self.difficulty) {
                return Err(fail(i, FaultKind::InsufficientWork));
            }
            for tx in &block.transactions {
                if !seen.insert(tx.id.as_str()) {
                    return Err(fail(i, FaultKind::DuplicateTransaction));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::GENESIS_TIMESTAMP;
    use crate::blockchain::miner::{Miner, MiningJob};
    use crate::blockchain::transaction::Address;
    use proptest::prelude::*;

    const DIFFICULTY: usize = 1;

    fn tx(id: &str, amount: f64) -> Transaction {
        Transaction::with_id(
            id.to_string(),
            "product-1".to_string(),
            Address::from("buyer"),
            Address::from("seller"),
            amount,
            GENESIS_TIMESTAMP + 5,
        )
    }

    fn mine_next(chain: &Chain, transactions: Vec<Transaction>) -> Block {
        let job = MiningJob {
            index: chain.len() as u64,
            previous_hash: chain.tip_hash().to_string(),
            difficulty: chain.difficulty(),
            timestamp: GENESIS_TIMESTAMP + 100 * chain.len() as i64,
            transactions,
        };
        Miner::new(1_000_000).mine(&job).unwrap()
    }

    fn chain_of(blocks: usize) -> Chain {
        let mut chain = Chain::genesis(DIFFICULTY);
        for i in 0..blocks {
            let batch = vec![tx(&format!("a{}", i), 1.0), tx(&format!("b{}", i), 2.5)];
            let block = mine_next(&chain, batch);
            chain.append(block).unwrap();
        }
        chain
    }

    #[test]
    fn test_new_chain() {
        let chain = Chain::genesis(DIFFICULTY);

        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.blocks()[0].index, 0);
        assert_eq!(chain.tip_hash(), Block::genesis().hash);
        assert_eq!(chain.validate(), Ok(()));
    }

    #[test]
    fn test_append_mined_block() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let block = mine_next(&chain, vec![tx("t1", 2.0)]);
        let hash = block.hash.clone();

        chain.append(block).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.tip_hash(), hash);
        assert!(chain.contains_transaction("t1"));
        assert_eq!(chain.validate(), Ok(()));
    }

    #[test]
    fn test_append_rejects_wrong_index() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let mut block = mine_next(&chain, vec![tx("t1", 2.0)]);
        block.index = 5;

        let result = chain.append(block);

        assert!(matches!(result, Err(ChainError::InvalidLink { index: 5, .. })));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_append_rejects_stale_tip() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let stale = mine_next(&chain, vec![tx("t1", 2.0)]);
        let fresh = mine_next(&chain, vec![tx("t2", 2.0)]);
        chain.append(fresh).unwrap();

        let mut stale = stale;
        stale.index = 2;
        stale.hash = stale.calculate_hash();

        assert!(matches!(chain.append(stale), Err(ChainError::InvalidLink { .. })));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_append_rejects_block_failing_difficulty() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let previous_hash = chain.tip_hash().to_string();

        // find a nonce whose hash does NOT start with '0'
        let block = (0..)
            .map(|nonce| Block::new(1, GENESIS_TIMESTAMP + 1, vec![tx("t1", 1.0)], previous_hash.clone(), nonce))
            .find(|block| !block.hash.starts_with('0'))
            .unwrap();

        let result = chain.append(block);

        assert!(matches!(result, Err(ChainError::InvalidProof { index: 1, .. })));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_append_rejects_forged_hash() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let mut block = mine_next(&chain, vec![tx("t1", 2.0)]);
        block.transactions[0] = tx("t1", 200.0);

        assert!(matches!(chain.append(block), Err(ChainError::InvalidProof { .. })));
    }

    #[test]
    fn test_append_rejects_empty_block() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let block = mine_next(&chain, Vec::new());

        assert_eq!(chain.append(block), Err(ChainError::EmptyBlock(1)));
    }

    #[test]
    fn test_append_rejects_already_mined_id() {
        let mut chain = Chain::genesis(DIFFICULTY);
        let block = mine_next(&chain, vec![tx("t1", 2.0)]);
        chain.append(block).unwrap();

        let replay = mine_next(&chain, vec![tx("t1", 2.0)]);

        assert_eq!(chain.append(replay), Err(ChainError::DuplicateId("t1".to_string())));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_transactions_are_flattened_in_chain_order() {
        let chain = chain_of(2);
        let ids: Vec<String> = chain.transactions().into_iter().map(|tx| tx.id).collect();

        assert_eq!(ids, vec!["a0", "b0", "a1", "b1"]);
    }

    #[test]
    fn test_validate_reports_first_bad_block() {
        let chain = chain_of(3);
        let mut blocks = chain.blocks().to_vec();
        blocks[2].nonce += 1;
        blocks[3].previous_hash = "f".repeat(64);

        let tampered = Chain::restore(blocks, DIFFICULTY);

        assert_eq!(
            tampered.validate(),
            Err(ValidationFailure {
                index: 2,
                kind: FaultKind::HashMismatch
            })
        );
    }

    #[test]
    fn test_validate_detects_bad_genesis() {
        let mut blocks = chain_of(1).blocks().to_vec();
        blocks[0].previous_hash = "1".repeat(64);

        let failure = Chain::restore(blocks, DIFFICULTY).validate().unwrap_err();

        assert_eq!(failure.index, 0);
        assert_eq!(failure.kind, FaultKind::BadGenesis);
    }

    #[test]
    fn test_restore_empty_gives_genesis() {
        let chain = Chain::restore(Vec::new(), 2);
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.difficulty(), 2);
    }

    #[derive(Debug, Clone)]
    enum Field {
        TransactionId,
        TransactionAmount,
        TransactionBuyer,
        PreviousHash,
        Nonce,
    }

    fn arb_field() -> impl Strategy<Value = Field> {
        prop_oneof![
            Just(Field::TransactionId),
            Just(Field::TransactionAmount),
            Just(Field::TransactionBuyer),
            Just(Field::PreviousHash),
            Just(Field::Nonce),
        ]
    }

    // flips one low bit so ASCII text stays valid UTF-8
    fn flip_text(text: &mut String, position: usize, bit: u8) {
        let mut bytes = std::mem::take(text).into_bytes();
        let at = position % bytes.len();
        bytes[at] ^= 1 << (bit % 7);
        *text = String::from_utf8(bytes).unwrap();
    }

    proptest! {
        #[test]
        fn proptest_valid_chain_validates(blocks in 0usize..5) {
            prop_assert_eq!(chain_of(blocks).validate(), Ok(()));
        }

        #[test]
        fn proptest_single_bit_flip_is_detected(
            target in 1usize..4,
            field in arb_field(),
            position in any::<usize>(),
            bit in any::<u8>(),
        ) {
            let chain = chain_of(3);
            let mut blocks = chain.blocks().to_vec();
            let block = &mut blocks[target];

            match field {
                Field::TransactionId => flip_text(&mut block.transactions[position % 2].id, position, bit),
                Field::TransactionBuyer => flip_text(&mut block.transactions[position % 2].buyer_address.0, position, bit),
                Field::TransactionAmount => {
                    let tx = &mut block.transactions[position % 2];
                    tx.amount = f64::from_bits(tx.amount.to_bits() ^ (1u64 << (bit % 64)));
                }
                Field::PreviousHash => flip_text(&mut block.previous_hash, position, bit),
                Field::Nonce => block.nonce ^= 1u64 << (bit % 64),
            }

            let failure = Chain::restore(blocks, DIFFICULTY).validate();

            prop_assert!(failure.is_err());
            prop_assert!(failure.unwrap_err().index <= target as u64);
        }
    }
}

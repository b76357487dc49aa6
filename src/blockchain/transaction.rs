use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use std::fmt;

use super::hash::ContentHasher;

/// Opaque wallet label. Never assumed to be derived from a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

/// A purchase recorded on the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Catalog entry that was bought
    pub product_id: String,

    /// Buyer's wallet address
    #[schema(value_type = String)]
    pub buyer_address: Address,

    /// Store's wallet address
    #[schema(value_type = String)]
    pub seller_address: Address,

    /// Total paid (price * quantity)
    pub amount: f64,

    /// Creation time in seconds since epoch
    pub timestamp: i64,

    /// Content hash, fixed at construction
    pub hash: String,
}

impl Transaction {
    /// Creates a new transaction with a fresh id and the current time
    ///
    /// # Arguments
    ///
    /// * `product_id` - The catalog entry being bought
    /// * `buyer_address` - Who pays
    /// * `seller_address` - Who gets paid
    /// * `amount` - The total price
    ///
    /// # Returns
    ///
    /// A new Transaction instance with its hash computed
    pub fn new(product_id: String, buyer_address: Address, seller_address: Address, amount: f64) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            product_id,
            buyer_address,
            seller_address,
            amount,
            Utc::now().timestamp(),
        )
    }

    /// Creates a transaction from explicit fields
    pub fn with_id(
        id: String,
        product_id: String,
        buyer_address: Address,
        seller_address: Address,
        amount: f64,
        timestamp: i64,
    ) -> Self {
        let mut transaction = Transaction {
            id,
            product_id,
            buyer_address,
            seller_address,
            amount,
            timestamp,
            hash: String::new(),
        };
        transaction.hash = transaction.calculate_hash();
        transaction
    }

    /// Calculates the hash of the transaction fields, ignoring the stored hash
    pub fn calculate_hash(&self) -> String {
        let mut hasher = ContentHasher::new();
        self.write_fields(&mut hasher);
        hasher.finish()
    }

    /// Whether the stored hash still matches the fields
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Writes the hashed fields, in order, into a block or transaction digest
    pub(crate) fn write_fields(&self, hasher: &mut ContentHasher) {
        hasher
            .put_str(&self.id)
            .put_str(&self.product_id)
            .put_str(&self.buyer_address.0)
            .put_str(&self.seller_address.0)
            .put_f64(self.amount)
            .put_i64(self.timestamp);
    }
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request for the purchase endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseRequest {
    /// The product to buy
    pub product_id: String,

    /// The buyer's wallet address
    pub buyer_address: String,

    /// Units to buy
    pub quantity: u32,
}

/// Response for the purchase endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseResponse {
    /// Whether the purchase was mined
    pub success: bool,

    /// Human readable outcome
    pub message: String,

    /// Id of the mined transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Hash of the mined transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl PurchaseResponse {
    pub fn failed(message: String) -> Self {
        PurchaseResponse {
            success: false,
            message,
            transaction_id: None,
            transaction_hash: None,
        }
    }
}

/// Response for the validate endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether every block passed validation
    pub is_valid: bool,

    /// Number of blocks checked
    pub length: usize,

    /// First failing block, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_index: Option<u64>,

    /// What failed at `invalid_index`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Request for the fund wallet endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FundWalletRequest {
    /// The address to fund
    pub address: String,

    /// The amount to add
    pub amount: f64,
}

/// Balance of one wallet
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

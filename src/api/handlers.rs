use actix_web::{web, HttpResponse, HttpResponseBuilder, Responder};
use log::{error, info};

use super::schema::{BalanceResponse, FundWalletRequest, PurchaseRequest, PurchaseResponse, ValidationResponse};
use crate::blockchain::{
    Address, BalanceSource, ChainSnapshot, InMemoryWallet, LedgerError, LedgerService, Product, Transaction,
};

/// Data structure for the ledger state
pub type LedgerData = web::Data<LedgerService>;

/// Data structure for the simulated wallets
pub type WalletData = web::Data<InMemoryWallet>;

/// List products
///
/// Returns the store's catalog with current stock
#[utoipa::path(
    get,
    path = "/api/products",
    responses(
        (status = 200, description = "Products retrieved successfully", body = Vec<Product>)
    )
)]
pub async fn get_products(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.list_products())
}

/// Purchase a product
///
/// Records the purchase in a newly mined block and decrements stock
#[utoipa::path(
    post,
    path = "/api/purchase",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Purchase mined successfully", body = PurchaseResponse),
        (status = 400, description = "Invalid quantity, insufficient stock or balance", body = PurchaseResponse),
        (status = 404, description = "Product not found", body = PurchaseResponse),
        (status = 409, description = "Duplicate transaction, stock or balance changed", body = PurchaseResponse),
        (status = 503, description = "Mining timed out or chain untrusted", body = PurchaseResponse),
        (status = 500, description = "Internal server error", body = PurchaseResponse)
    )
)]
pub async fn purchase_product(
    ledger: LedgerData,
    purchase_req: web::Json<PurchaseRequest>,
) -> impl Responder {
    let purchase_req = purchase_req.into_inner();
    let service = ledger.clone().into_inner();

    // mining is CPU bound, keep it off the async workers
    let result = web::block(move || {
        service.purchase(
            &purchase_req.product_id,
            Address(purchase_req.buyer_address),
            purchase_req.quantity,
        )
    })
    .await;

    match result {
        Ok(Ok(receipt)) => {
            info!(
                "Purchase {} for {} sealed in block {}, {} still pending",
                receipt.transaction_id,
                receipt.amount,
                receipt.block_index,
                ledger.pending_count()
            );
            HttpResponse::Ok().json(PurchaseResponse {
                success: true,
                message: format!("Successfully purchased {} x{}", receipt.product_name, receipt.quantity),
                transaction_id: Some(receipt.transaction_id),
                transaction_hash: Some(receipt.transaction_hash),
            })
        }
        Ok(Err(err)) => status_for(&err).json(PurchaseResponse::failed(err.to_string())),
        Err(err) => {
            error!("Purchase worker failed: {}", err);
            HttpResponse::InternalServerError().json(PurchaseResponse::failed(
                "Purchase could not be processed".to_string(),
            ))
        }
    }
}

fn status_for(err: &LedgerError) -> HttpResponseBuilder {
    match err {
        LedgerError::ProductNotFound(_) => HttpResponse::NotFound(),
        LedgerError::InsufficientStock { .. }
        | LedgerError::InsufficientBalance { .. }
        | LedgerError::InvalidQuantity => HttpResponse::BadRequest(),
        LedgerError::DuplicateId(_)
        | LedgerError::StockUpdateFailed(_)
        | LedgerError::BalanceUpdateFailed(_) => HttpResponse::Conflict(),
        LedgerError::Mining(_) | LedgerError::ChainUntrusted(_) => HttpResponse::ServiceUnavailable(),
        LedgerError::Chain(_) | LedgerError::Storage(_) => HttpResponse::InternalServerError(),
    }
}

/// Get the blockchain
///
/// Returns every block, the difficulty and the pending transactions
#[utoipa::path(
    get,
    path = "/api/blockchain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainSnapshot)
    )
)]
pub async fn get_blockchain(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.list_chain())
}

/// Get mined transactions
///
/// Returns every mined transaction in chain order
#[utoipa::path(
    get,
    path = "/api/transactions",
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_transactions(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.list_mined_transactions())
}

/// Check if the blockchain is valid
///
/// Validates the entire chain; a failure marks the ledger untrusted
#[utoipa::path(
    get,
    path = "/api/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    let length = ledger.chain_length();

    let response = match ledger.audit() {
        Ok(()) => ValidationResponse {
            is_valid: true,
            length,
            invalid_index: None,
            reason: None,
        },
        Err(failure) => ValidationResponse {
            is_valid: false,
            length,
            invalid_index: Some(failure.index),
            reason: Some(failure.kind.to_string()),
        },
    };

    HttpResponse::Ok().json(response)
}

/// Get wallet balance
///
/// Returns the balance purchases are checked against
#[utoipa::path(
    get,
    path = "/api/wallet/{address}",
    params(
        ("address" = String, Path, description = "Wallet address")
    ),
    responses(
        (status = 200, description = "Wallet balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_wallet_balance(wallet: WalletData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = wallet.get_balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// Fund a wallet
///
/// Adds funds to a wallet for testing
#[utoipa::path(
    post,
    path = "/api/wallet/fund",
    request_body = FundWalletRequest,
    responses(
        (status = 200, description = "Wallet funded successfully", body = BalanceResponse),
        (status = 400, description = "Invalid amount")
    )
)]
pub async fn fund_wallet(wallet: WalletData, fund_req: web::Json<FundWalletRequest>) -> impl Responder {
    let address = Address(fund_req.address.clone());

    match wallet.fund(&address, fund_req.amount) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse {
            address: address.0,
            balance,
        }),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to fund wallet: {}", err)
        })),
    }
}

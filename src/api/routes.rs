use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/products", web::get().to(handlers::get_products))
            .route("/purchase", web::post().to(handlers::purchase_product))
            .route("/blockchain", web::get().to(handlers::get_blockchain))
            .route("/transactions", web::get().to(handlers::get_transactions))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/wallet/fund", web::post().to(handlers::fund_wallet))
            .route("/wallet/{address}", web::get().to(handlers::get_wallet_balance)),
    );
}

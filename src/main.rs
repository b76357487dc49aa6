use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

mod api;
mod blockchain;
mod config;

use blockchain::{catalog, InMemoryCatalog, InMemoryWallet, Ledger, LedgerService};
use config::LedgerConfig;

// Open the persisted ledger, falling back to memory if the store is unusable
fn initialize_ledger(config: &LedgerConfig) -> Ledger {
    let data_dir = match &config.data_dir {
        Some(dir) => dir,
        None => {
            info!("No data directory configured, keeping the chain in memory");
            return Ledger::new(config.difficulty);
        }
    };

    if let Err(err) = std::fs::create_dir_all(data_dir) {
        warn!("Failed to create data directory: {}", err);
    }

    match Ledger::with_storage(data_dir, config.difficulty) {
        Ok(ledger) => {
            info!("Loaded ledger from storage at {}", data_dir.display());
            if let Some(failure) = ledger.fault() {
                warn!("Ledger is untrusted, purchases will be refused: {}", failure);
            }
            ledger
        }
        Err(err) => {
            warn!("Failed to load ledger from storage: {}", err);
            warn!("Creating in-memory ledger instead");
            Ledger::new(config.difficulty)
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_products,
        api::handlers::purchase_product,
        api::handlers::get_blockchain,
        api::handlers::get_transactions,
        api::handlers::validate_chain,
        api::handlers::get_wallet_balance,
        api::handlers::fund_wallet
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Product,
            blockchain::ChainSnapshot,
            api::schema::PurchaseRequest,
            api::schema::PurchaseResponse,
            api::schema::ValidationResponse,
            api::schema::FundWalletRequest,
            api::schema::BalanceResponse
        )
    ),
    tags(
        (name = "ledger", description = "Purchase ledger API endpoints")
    ),
    info(
        title = "Purchase Ledger API",
        version = "1.0.0",
        description = "A proof-of-work ledger for store purchases",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    info!(
        "Mining at difficulty {} with at most {} attempts per block",
        config.difficulty, config.max_mining_attempts
    );

    let ledger = initialize_ledger(&config);
    info!(
        "Ledger holds {} blocks at difficulty {}",
        ledger.chain().len(),
        ledger.difficulty()
    );

    let catalog = InMemoryCatalog::with_products(catalog::seed_products());
    let wallet = InMemoryWallet::new(config.default_balance);
    let service = LedgerService::new(
        ledger,
        Arc::new(catalog),
        Arc::new(wallet.clone()),
        &config,
    );
    let ledger = web::Data::new(service);
    let wallet = web::Data::new(wallet);

    info!(
        "Starting HTTP server at http://{}:{}",
        config.bind_address, config.port
    );

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            .app_data(wallet.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi),
            )
    })
    .bind((config.bind_address.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.bind_address, config.port))?
    .run()
    .await
    .context("HTTP server failed")
}

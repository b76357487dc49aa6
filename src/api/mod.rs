// API module
//
// HTTP surface of the ledger: catalog, purchases and chain reads

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;

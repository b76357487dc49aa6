use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use std::sync::Arc;

/// Errors that can occur during catalog operations
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: u32,
    },
}

/// A product offered by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: u32,
    pub image_url: String,
}

/// Product lookup and stock keeping, owned outside the ledger
pub trait Catalog: Send + Sync {
    fn get_product(&self, id: &str) -> Option<Product>;

    /// Removes `quantity` units, failing without change if fewer are left
    fn decrement_stock(&self, id: &str, quantity: u32) -> Result<(), CatalogError>;

    fn list_products(&self) -> Vec<Product>;
}

/// Catalog kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<DashMap<String, Product>>,
    /// Insertion order, for stable listings
    order: Arc<parking_lot::RwLock<Vec<String>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.add_product(product);
        }
        catalog
    }

    /// Adds or replaces a product
    pub fn add_product(&self, product: Product) {
        if self.products.insert(product.id.clone(), product.clone()).is_none() {
            self.order.write().push(product.id);
        }
    }
}

impl Catalog for InMemoryCatalog {
    fn get_product(&self, id: &str) -> Option<Product> {
        self.products.get(id).map(|entry| entry.value().clone())
    }

    fn decrement_stock(&self, id: &str, quantity: u32) -> Result<(), CatalogError> {
        let mut entry = self
            .products
            .get_mut(id)
            .ok_or_else(|| CatalogError::ProductNotFound(id.to_string()))?;

        if entry.stock < quantity {
            return Err(CatalogError::InsufficientStock {
                product_id: id.to_string(),
                requested: quantity,
                available: entry.stock,
            });
        }

        entry.stock -= quantity;
        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.order
            .read()
            .iter()
            .filter_map(|id| self.get_product(id))
            .collect()
    }
}

fn product(name: &str, description: &str, price: f64, stock: u32, image_url: &str) -> Product {
    Product {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price,
        stock,
        image_url: image_url.to_string(),
    }
}

/// The storefront's starting inventory
pub fn seed_products() -> Vec<Product> {
    vec![
        product(
            "Blockchain Developer Course",
            "Complete guide to blockchain development with Rust and Solana",
            0.5,
            100,
            "https://images.unsplash.com/photo-1639762681485-074b7f938ba0?w=400",
        ),
        product(
            "NFT Art Collection",
            "Exclusive digital art collection on the blockchain",
            1.2,
            50,
            "https://images.unsplash.com/photo-1620641788421-7a1c342ea42e?w=400",
        ),
        product(
            "Smart Contract Template",
            "Production-ready smart contract templates for e-commerce",
            0.8,
            75,
            "https://images.unsplash.com/photo-1551288049-bebda4e38f71?w=400",
        ),
        product(
            "Web3 Starter Kit",
            "Complete Web3 development toolkit with React integration",
            1.5,
            30,
            "https://images.unsplash.com/photo-1633356122544-f134324a6cee?w=400",
        ),
        product(
            "Crypto Wallet Security Guide",
            "Best practices for securing cryptocurrency wallets",
            0.3,
            200,
            "https://images.unsplash.com/photo-1563986768609-322da13575f3?w=400",
        ),
        product(
            "DeFi Protocol Analysis",
            "In-depth analysis of popular DeFi protocols and strategies",
            2.0,
            25,
            "https://images.unsplash.com/photo-1621761191319-c6fb62004040?w=400",
        ),
    ]
}

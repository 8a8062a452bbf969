//! Persistence seams: product stock/pricing data and sale records.
//!
//! The engine only sees the [`ProductRepository`] and [`SaleRecorder`] traits.
//! [`InMemoryProductStore`] backs tests and the demo binary, with a JSON file
//! catalog ([`ProductCatalogFile`]) for seeding across restarts.

use crate::error::EngineError;
use crate::types::{Product, ProductId, SaleRecord};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Source of truth for start/min price, stock and auctionability flags.
pub trait ProductRepository: Send + Sync {
    fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, EngineError>;

    /// Applies `delta` to stock (floored at zero) and sets the auctionable flag.
    fn update_stock_and_flags(
        &self,
        id: ProductId,
        delta: i64,
        auctionable: bool,
    ) -> Result<(), EngineError>;

    /// Filters `ids` down to lots eligible for the queue on `today`,
    /// preserving input order.
    fn find_eligible_for_queue(
        &self,
        ids: &[ProductId],
        today: NaiveDate,
    ) -> Result<Vec<ProductId>, EngineError>;
}

/// Persists one sale record per winning bid.
pub trait SaleRecorder: Send + Sync {
    fn insert(&self, sale: SaleRecord) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
struct StoreInner {
    products: HashMap<ProductId, Product>,
    sales: Vec<SaleRecord>,
}

/// Mutex-held product map plus sale log. Implements both persistence traits;
/// a stock decrement and its sale record commit under the same lock, which
/// stands in for the single transaction a database-backed store would use.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            store.upsert_product(product);
        }
        store
    }

    pub fn upsert_product(&self, product: Product) {
        self.inner
            .lock()
            .expect("lock")
            .products
            .insert(product.id, product);
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.inner.lock().expect("lock").products.get(&id).cloned()
    }

    pub fn products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .inner
            .lock()
            .expect("lock")
            .products
            .values()
            .cloned()
            .collect();
        products.sort_by_key(|p| p.id.0);
        products
    }

    pub fn sales(&self) -> Vec<SaleRecord> {
        self.inner.lock().expect("lock").sales.clone()
    }
}

impl ProductRepository for InMemoryProductStore {
    fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, EngineError> {
        Ok(self.inner.lock().expect("lock").products.get(&id).cloned())
    }

    fn update_stock_and_flags(
        &self,
        id: ProductId,
        delta: i64,
        auctionable: bool,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("lock");
        let product = inner
            .products
            .get_mut(&id)
            .ok_or(EngineError::ProductNotFound(id))?;
        let stock = (product.stock as i64 + delta).max(0);
        product.stock = stock as u32;
        product.auctionable = auctionable;
        Ok(())
    }

    fn find_eligible_for_queue(
        &self,
        ids: &[ProductId],
        today: NaiveDate,
    ) -> Result<Vec<ProductId>, EngineError> {
        let inner = self.inner.lock().expect("lock");
        Ok(ids
            .iter()
            .filter(|id| {
                inner
                    .products
                    .get(id)
                    .map(|p| p.is_eligible(today))
                    .unwrap_or(false)
            })
            .copied()
            .collect())
    }
}

impl SaleRecorder for InMemoryProductStore {
    fn insert(&self, sale: SaleRecord) -> Result<(), EngineError> {
        self.inner.lock().expect("lock").sales.push(sale);
        Ok(())
    }
}

/// JSON product catalog on disk: one file, the full product list. Save after
/// edits; load on startup.
#[derive(Clone, Debug)]
pub struct ProductCatalogFile {
    path: std::path::PathBuf,
}

impl ProductCatalogFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Save the catalog. Overwrites the existing file.
    pub fn save(&self, products: &[Product]) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(products)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// Load the catalog. Returns `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<Vec<Product>>, EngineError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::Storage(e.to_string())),
        };
        let products: Vec<Product> =
            serde_json::from_str(&data).map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(Some(products))
    }
}

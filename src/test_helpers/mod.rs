// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::cache::{ProductCache, SqliteKvStore};
use crate::catalog::{Product, ProductId};
use crate::config::Config;
use crate::store::traits::StoreError;
use crate::store::{BackendKind, ProductStore};

/// In-memory product store with switchable failure modes.
pub struct MockStore {
    products: Mutex<Vec<Product>>,
    online: AtomicBool,
    accept_writes: AtomicBool,
    fail_fetch: AtomicBool,
    fetches: AtomicUsize,
    stock_writes: Mutex<Vec<(ProductId, u32)>>,
}

impl MockStore {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: Mutex::new(products),
            online: AtomicBool::new(true),
            accept_writes: AtomicBool::new(true),
            fail_fetch: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            stock_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_accept_writes(&self, accept: bool) {
        self.accept_writes.store(accept, Ordering::SeqCst);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_products(&self, products: Vec<Product>) {
        *self.products.lock().unwrap() = products;
    }

    pub fn stock_of(&self, id: &ProductId) -> Option<u32> {
        self.products.lock().unwrap().iter().find(|p| &p.id == id).map(|p| p.stock)
    }

    /// Every attempted stock write, accepted or not, in call order
    pub fn stock_writes(&self) -> Vec<(ProductId, u32)> {
        self.stock_writes.lock().unwrap().clone()
    }

    pub fn clear_stock_writes(&self) {
        self.stock_writes.lock().unwrap().clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn writable(&self) -> bool {
        self.online.load(Ordering::SeqCst) && self.accept_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductStore for MockStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sheets
    }

    async fn probe(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self) -> Result<Vec<Product>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) || self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("mock store unavailable".to_string()));
        }
        Ok(self.products.lock().unwrap().clone())
    }

    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> bool {
        self.stock_writes.lock().unwrap().push((id.clone(), new_stock));
        if !self.writable() {
            return false;
        }
        match self.products.lock().unwrap().iter_mut().find(|p| &p.id == id) {
            Some(product) => {
                product.stock = new_stock;
                true
            }
            None => false,
        }
    }

    async fn save_product(&self, product: &Product) -> bool {
        if !self.writable() {
            return false;
        }
        let mut products = self.products.lock().unwrap();
        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => products.push(product.clone()),
        }
        true
    }

    async fn delete_product(&self, id: &ProductId) -> bool {
        if !self.writable() {
            return false;
        }
        self.products.lock().unwrap().retain(|p| &p.id != id);
        true
    }

    async fn bulk_replace(&self, products: &[Product]) -> bool {
        if !self.writable() {
            return false;
        }
        *self.products.lock().unwrap() = products.to_vec();
        true
    }
}

/// Cache over a SQLite file in a fresh temp directory
pub async fn setup_test_cache() -> (ProductCache, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = SqliteKvStore::new(&temp_dir.path().join("cache.db"))
        .await
        .expect("Failed to open test cache");
    (ProductCache::new(Arc::new(store)), temp_dir)
}

pub fn sample_products() -> Vec<Product> {
    let mut tape = Product::new("1", "Cinta Aislante Negra", "Cintas", 10);
    tape.price = 1.5;
    tape.description = "Cinta Aislante Negra.".to_string();

    let mut pipe = Product::new("2", "Tubo PVC 20mm", "PVC", 4);
    pipe.price = 3.25;

    let mut cable = Product::new("3", "Cable unipolar 2.5mm", "Cables", 40);
    cable.price = 0.8;
    cable.sku = Some("CAB-25".to_string());

    vec![tape, pipe, cable]
}

/// Create a test configuration with temporary paths
pub fn create_test_config(dir: &TempDir) -> Config {
    Config {
        backend: BackendKind::Local,
        cache_db_path: dir.path().join("cache.db"),
        products_dir: dir.path().join("productos"),
        local_api_bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        sync_interval_secs: 60,
        log_level: "error".to_string(),
        ..Config::default()
    }
}

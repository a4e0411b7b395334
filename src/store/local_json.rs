// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::{CategoryRegistry, Product, ProductId};
use crate::store::traits::{ensure_unique_ids, BackendKind, ProductStore, StoreError};
use crate::utils::{validate_path_within_base, validate_relative_path};

/// Read-only product source: one JSON array per category under a directory.
pub struct LocalJsonStore {
    base_dir: PathBuf,
    categories: CategoryRegistry,
}

impl LocalJsonStore {
    pub fn new(base_dir: impl Into<PathBuf>, categories: CategoryRegistry) -> Self {
        Self {
            base_dir: base_dir.into(),
            categories,
        }
    }

    /// File for a category, if it declares one
    fn category_file(&self, file: &str) -> Result<PathBuf, StoreError> {
        let relative = validate_relative_path(file).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(self.base_dir.join(relative))
    }

    async fn read_category(&self, key: &str, path: &Path) -> Result<Vec<Product>, StoreError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(category = %key, path = %path.display(), "Category file missing, skipping");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        validate_path_within_base(path, &self.base_dir).map_err(|e| StoreError::Malformed(e.to_string()))?;

        let mut products: Vec<Product> = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Malformed(format!("{}: {}", path.display(), e)))?;

        for product in &mut products {
            product.category = key.to_string();
        }
        Ok(products)
    }
}

#[async_trait]
impl ProductStore for LocalJsonStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn probe(&self) -> bool {
        tokio::fs::metadata(&self.base_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn fetch_all(&self) -> Result<Vec<Product>, StoreError> {
        let metadata = tokio::fs::metadata(&self.base_dir).await?;
        if !metadata.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("{} is not a directory", self.base_dir.display()),
            )));
        }

        let mut products = Vec::new();
        for category in self.categories.iter() {
            let Some(file) = category.file.as_deref() else {
                continue;
            };
            let path = self.category_file(file)?;
            products.extend(self.read_category(&category.key, &path).await?);
        }

        ensure_unique_ids(&products)?;
        info!(count = products.len(), dir = %self.base_dir.display(), "Loaded products from local files");
        Ok(products)
    }

    async fn update_stock(&self, id: &ProductId, _new_stock: u32) -> bool {
        warn!(product_id = %id, error = %StoreError::ReadOnly, "Local files cannot take stock writes");
        false
    }

    async fn save_product(&self, product: &Product) -> bool {
        warn!(product_id = %product.id, error = %StoreError::ReadOnly, "Local files cannot take product writes");
        false
    }

    async fn delete_product(&self, id: &ProductId) -> bool {
        warn!(product_id = %id, error = %StoreError::ReadOnly, "Local files cannot take deletes");
        false
    }

    async fn bulk_replace(&self, _products: &[Product]) -> bool {
        warn!(error = %StoreError::ReadOnly, "Local files cannot be replaced");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_all_stamps_category() {
        let temp_dir = TempDir::new().unwrap();
        write_file(
            temp_dir.path(),
            "cintas.json",
            r#"[{"id":1000,"name":"Cinta Aislante Negra","category":"otra","price":1.5,"stock":149}]"#,
        );
        write_file(temp_dir.path(), "pvc.json", r#"[{"id":2000,"name":"Tubo PVC","stock":"7"}]"#);

        let store = LocalJsonStore::new(temp_dir.path(), CategoryRegistry::builtin());
        let products = store.fetch_all().await.unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].category, "Cintas");
        assert_eq!(products[1].category, "PVC");
        assert_eq!(products[1].stock, 7);
        assert!(store.probe().await);
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalJsonStore::new(temp_dir.path().join("nope"), CategoryRegistry::builtin());

        assert!(matches!(store.fetch_all().await, Err(StoreError::Io(_))));
        assert!(!store.probe().await);
    }

    #[tokio::test]
    async fn test_malformed_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        write_file(temp_dir.path(), "cables.json", "{ not an array");

        let store = LocalJsonStore::new(temp_dir.path(), CategoryRegistry::builtin());
        assert!(matches!(store.fetch_all().await, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_duplicate_ids_across_files() {
        let temp_dir = TempDir::new().unwrap();
        write_file(temp_dir.path(), "cintas.json", r#"[{"id":1,"name":"A"}]"#);
        write_file(temp_dir.path(), "pvc.json", r#"[{"id":"1","name":"B"}]"#);

        let store = LocalJsonStore::new(temp_dir.path(), CategoryRegistry::builtin());
        assert!(matches!(store.fetch_all().await, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_traversal_in_category_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut category = Category::fallback("Cintas");
        category.file = Some("../cintas.json".to_string());

        let store = LocalJsonStore::new(temp_dir.path(), CategoryRegistry::new(vec![category]));
        assert!(matches!(store.fetch_all().await, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalJsonStore::new(temp_dir.path(), CategoryRegistry::builtin());

        assert!(store.is_read_only());
        assert!(!store.update_stock(&ProductId::from("1"), 3).await);
        assert!(!store.save_product(&Product::new("1", "A", "PVC", 1)).await);
        assert!(!store.delete_product(&ProductId::from("1")).await);
        assert!(!store.bulk_replace(&[]).await);
    }
}

// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::{Product, ProductId};
use crate::config::FirestoreConfig;
use crate::store::traits::{ensure_unique_ids, BackendKind, ProductStore, StoreError};
use crate::utils::validate_endpoint_url;

/// Firestore refuses commits with more writes than this
pub const MAX_COMMIT_WRITES: usize = 500;

const PAGE_SIZE: u32 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,

    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,

    #[serde(default)]
    fields: Map<String, Value>,
}

/// Products stored as documents of one Firestore collection, via REST v1.
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: Client,
    /// `{endpoint}/v1/projects/{project}/databases/(default)/documents`
    documents_url: String,
    /// Resource path prefix used in document names
    database_path: String,
    collection: String,
    api_key: Option<String>,
    auth_token: Option<String>,
    probe_timeout: Duration,
}

impl FirestoreStore {
    pub fn new(config: &FirestoreConfig, request_timeout: Duration, probe_timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = validate_endpoint_url(&config.endpoint)?;
        let database_path = format!("projects/{}/databases/(default)/documents", config.project_id);
        let documents_url = format!("{}/v1/{}", endpoint.as_str().trim_end_matches('/'), database_path);

        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("StockMaster/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            documents_url,
            database_path,
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            auth_token: config.auth_token.clone(),
            probe_timeout,
        })
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(ref token) = self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.documents_url, self.collection)
    }

    fn document_name(&self, id: &ProductId) -> String {
        format!("{}/{}/{}", self.database_path, self.collection, id)
    }

    async fn list_page(&self, page_token: Option<&str>, page_size: u32) -> Result<ListResponse, StoreError> {
        let mut request = self
            .client
            .get(self.collection_url())
            .query(&[("pageSize", page_size.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn probe_request(&self) -> Result<(), StoreError> {
        let request = self
            .client
            .get(self.collection_url())
            .query(&[("pageSize", "1")])
            .timeout(self.probe_timeout);
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status()));
        }
        Ok(())
    }

    /// Apply writes atomically through `documents:commit`
    async fn commit(&self, writes: Vec<Value>) -> Result<(), StoreError> {
        if writes.len() > MAX_COMMIT_WRITES {
            return Err(StoreError::Rejected(format!(
                "{} writes exceed the commit limit of {}",
                writes.len(),
                MAX_COMMIT_WRITES
            )));
        }
        if writes.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .post(format!("{}:commit", self.documents_url))
            .json(&json!({ "writes": writes }));
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status = %status, body = %text, "Firestore commit refused");
            return Err(StoreError::Status(status));
        }
        Ok(())
    }

    async fn commit_logged(&self, operation: &str, writes: Vec<Value>) -> bool {
        match self.commit(writes).await {
            Ok(()) => true,
            Err(e) => {
                warn!(operation = %operation, error = %e, "Firestore write failed");
                false
            }
        }
    }

    fn upsert_write(&self, product: &Product) -> Result<Value, StoreError> {
        validate_document_id(&product.id)?;
        Ok(json!({
            "update": {
                "name": self.document_name(&product.id),
                "fields": encode_fields(product),
            },
            "updateTransforms": [server_timestamp()],
        }))
    }

    fn delete_write(&self, id: &ProductId) -> Result<Value, StoreError> {
        validate_document_id(id)?;
        Ok(json!({ "delete": self.document_name(id) }))
    }
}

fn server_timestamp() -> Value {
    json!({ "fieldPath": "updatedAt", "setToServerValue": "REQUEST_TIME" })
}

/// Reject ids Firestore cannot use as document ids
fn validate_document_id(id: &ProductId) -> Result<(), StoreError> {
    let raw = id.as_str();
    let reserved = raw.starts_with("__") && raw.ends_with("__");
    if raw.is_empty() || raw == "." || raw == ".." || raw.contains('/') || raw.len() > 1500 || reserved {
        return Err(StoreError::Rejected(format!("invalid document id: {:?}", raw)));
    }
    Ok(())
}

fn encode_fields(product: &Product) -> Value {
    let mut fields = json!({
        "id": { "stringValue": product.id.as_str() },
        "name": { "stringValue": product.name },
        "category": { "stringValue": product.category },
        "description": { "stringValue": product.description },
        "price": { "doubleValue": product.price },
        "stock": { "integerValue": product.stock.to_string() },
    });
    if let (Some(sku), Some(map)) = (&product.sku, fields.as_object_mut()) {
        map.insert("sku".to_string(), json!({ "stringValue": sku }));
    }
    fields
}

/// Unwrap Firestore's typed values into plain JSON
fn decode_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = map.get("stringValue") {
        return s.clone();
    }
    if let Some(i) = map.get("integerValue") {
        // int64 travels as a string
        return match i {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        };
    }
    if let Some(d) = map.get("doubleValue") {
        return d.clone();
    }
    if let Some(b) = map.get("booleanValue") {
        return b.clone();
    }
    if let Some(t) = map.get("timestampValue") {
        return t.clone();
    }
    Value::Null
}

fn decode_document(doc: Document) -> Result<Product, StoreError> {
    let doc_id = doc.name.rsplit('/').next().unwrap_or_default().to_string();

    let mut plain: Map<String, Value> = doc
        .fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect();

    // The document id is the identity; a stored id field is only a mirror
    plain.insert("id".to_string(), Value::String(doc_id.clone()));
    plain.remove("updatedAt");

    serde_json::from_value(Value::Object(plain))
        .map_err(|e| StoreError::Malformed(format!("document {}: {}", doc_id, e)))
}

#[async_trait]
impl ProductStore for FirestoreStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Firestore
    }

    async fn probe(&self) -> bool {
        match self.probe_request().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Firestore probe failed");
                false
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Product>, StoreError> {
        let mut products = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(page_token.as_deref(), PAGE_SIZE).await?;
            for doc in page.documents {
                products.push(decode_document(doc)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ensure_unique_ids(&products)?;
        info!(count = products.len(), collection = %self.collection, "Fetched products from Firestore");
        Ok(products)
    }

    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> bool {
        if let Err(e) = validate_document_id(id) {
            warn!(product_id = %id, error = %e, "Refusing stock update");
            return false;
        }

        let write = json!({
            "update": {
                "name": self.document_name(id),
                "fields": { "stock": { "integerValue": new_stock.to_string() } },
            },
            "updateMask": { "fieldPaths": ["stock"] },
            "currentDocument": { "exists": true },
            "updateTransforms": [server_timestamp()],
        });
        self.commit_logged("updateStock", vec![write]).await
    }

    async fn save_product(&self, product: &Product) -> bool {
        match self.upsert_write(product) {
            Ok(write) => self.commit_logged("saveProduct", vec![write]).await,
            Err(e) => {
                warn!(product_id = %product.id, error = %e, "Refusing product save");
                false
            }
        }
    }

    async fn delete_product(&self, id: &ProductId) -> bool {
        match self.delete_write(id) {
            Ok(write) => self.commit_logged("deleteProduct", vec![write]).await,
            Err(e) => {
                warn!(product_id = %id, error = %e, "Refusing product delete");
                false
            }
        }
    }

    async fn bulk_replace(&self, products: &[Product]) -> bool {
        let existing = match self.fetch_all().await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "Cannot list collection before replace");
                return false;
            }
        };

        let keep: HashSet<&ProductId> = products.iter().map(|p| &p.id).collect();
        let mut writes = Vec::with_capacity(existing.len() + products.len());

        for stale in existing.iter().filter(|p| !keep.contains(&p.id)) {
            match self.delete_write(&stale.id) {
                Ok(write) => writes.push(write),
                Err(e) => {
                    warn!(product_id = %stale.id, error = %e, "Cannot delete stale document");
                    return false;
                }
            }
        }
        for product in products {
            match self.upsert_write(product) {
                Ok(write) => writes.push(write),
                Err(e) => {
                    warn!(product_id = %product.id, error = %e, "Cannot write product");
                    return false;
                }
            }
        }

        info!(writes = writes.len(), "Replacing Firestore collection");
        self.commit_logged("replaceProducts", writes).await
    }
}

// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::now_millis;
use crate::catalog::{Product, ProductId};
use crate::store::traits::{ensure_unique_ids, BackendKind, ProductStore, StoreError};
use crate::utils::validate_endpoint_url;

/// Apps Script reply envelope
#[derive(Debug, Deserialize)]
struct ScriptResponse {
    status: String,

    #[serde(default)]
    message: String,

    #[serde(default)]
    products: Option<Vec<Product>>,

    #[serde(default)]
    count: Option<usize>,
}

impl ScriptResponse {
    fn is_success(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "success")
    }
}

/// Products kept in a Google Sheet behind an Apps Script web app.
#[derive(Debug, Clone)]
pub struct SheetsStore {
    client: Client,
    script_url: Url,
    probe_timeout: Duration,
}

impl SheetsStore {
    pub fn new(script_url: &str, request_timeout: Duration, probe_timeout: Duration) -> anyhow::Result<Self> {
        let script_url = validate_endpoint_url(script_url)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("StockMaster/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            script_url,
            probe_timeout,
        })
    }

    /// GET with the action and a cache-busting timestamp
    fn build_get(&self, action: &str) -> RequestBuilder {
        self.client
            .get(self.script_url.clone())
            .query(&[("action", action.to_string()), ("_", now_millis().to_string())])
    }

    fn build_post(&self, form: &[(&str, String)]) -> RequestBuilder {
        self.client.post(self.script_url.clone()).form(form)
    }

    async fn read_response(response: Response) -> Result<ScriptResponse, StoreError> {
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn post_action(&self, form: &[(&str, String)]) -> Result<ScriptResponse, StoreError> {
        let response = self.build_post(form).send().await?;
        let reply = Self::read_response(response).await?;
        if !reply.is_success() {
            return Err(StoreError::Rejected(reply.message));
        }
        Ok(reply)
    }

    async fn probe_request(&self) -> Result<ScriptResponse, StoreError> {
        let response = self.build_get("test").timeout(self.probe_timeout).send().await?;
        Self::read_response(response).await
    }

    /// Run a write and collapse the outcome to acknowledged or not
    async fn write(&self, form: &[(&str, String)]) -> bool {
        let action = form.first().map(|(_, v)| v.as_str()).unwrap_or_default();
        match self.post_action(form).await {
            Ok(reply) => {
                debug!(action = %action, message = %reply.message, "Sheets write acknowledged");
                true
            }
            Err(e) => {
                warn!(action = %action, error = %e, "Sheets write failed");
                false
            }
        }
    }
}

#[async_trait]
impl ProductStore for SheetsStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sheets
    }

    async fn probe(&self) -> bool {
        match self.probe_request().await {
            Ok(reply) if reply.is_success() => true,
            Ok(reply) => {
                warn!(status = %reply.status, message = %reply.message, "Sheets probe rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "Sheets probe failed");
                false
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Product>, StoreError> {
        let response = self.build_get("getProducts").send().await?;
        let reply = Self::read_response(response).await?;

        if !reply.is_success() {
            return Err(StoreError::Rejected(reply.message));
        }

        let products = reply
            .products
            .ok_or_else(|| StoreError::Malformed("response has no products".to_string()))?;

        if let Some(count) = reply.count {
            if count != products.len() {
                return Err(StoreError::Malformed(format!(
                    "declared {} products but received {}",
                    count,
                    products.len()
                )));
            }
        }

        ensure_unique_ids(&products)?;
        info!(count = products.len(), "Fetched products from Sheets");
        Ok(products)
    }

    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> bool {
        self.write(&[
            ("action", "updateStock".to_string()),
            ("id", id.to_string()),
            ("stock", new_stock.to_string()),
        ])
        .await
    }

    async fn save_product(&self, product: &Product) -> bool {
        let payload = match serde_json::to_string(product) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(product_id = %product.id, error = %e, "Failed to encode product");
                return false;
            }
        };
        self.write(&[("action", "saveProduct".to_string()), ("product", payload)]).await
    }

    async fn delete_product(&self, id: &ProductId) -> bool {
        self.write(&[("action", "deleteProduct".to_string()), ("id", id.to_string())])
            .await
    }

    async fn bulk_replace(&self, products: &[Product]) -> bool {
        let payload = match serde_json::to_string(products) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode product list");
                return false;
            }
        };
        self.write(&[("action", "replaceProducts".to_string()), ("products", payload)])
            .await
    }
}

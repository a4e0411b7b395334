// SPDX-License-Identifier: GPL-3.0-only
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::handlers::{
    AdjustStockRequest, ApiHandlers, ApiJson, ApiQuery, ApiResponse, ApiResult, ProductQuery, SetStockRequest,
    StatusResponse,
};
use crate::api::websocket::ws_handler;
use crate::catalog::{CatalogExport, Category, CategoryRegistry, Product};
use crate::sync::{StockUpdate, SyncCoordinator, SyncReport};
use crate::view::{FilterState, ViewModel};

type AppState = State<Arc<ApiHandlers>>;

pub struct HttpServer {
    handlers: ApiHandlers,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(coordinator: Arc<SyncCoordinator>, categories: CategoryRegistry, addr: SocketAddr) -> Self {
        Self {
            handlers: ApiHandlers::new(coordinator, categories),
            addr,
        }
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        let app = router(Arc::new(self.handlers));

        info!(addr = %listener.local_addr()?, "Starting HTTP server");
        axum::serve(listener, app).await?;

        Ok(())
    }
}

pub fn router(handlers: Arc<ApiHandlers>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/products", get(list_products_handler).post(save_product_handler))
        .route("/api/products/:id", get(get_product_handler).delete(delete_product_handler))
        .route("/api/products/:id/adjust", post(adjust_stock_handler))
        .route("/api/products/:id/stock", put(set_stock_handler))
        .route("/api/filter", get(get_filter_handler).put(put_filter_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/categories", get(categories_handler))
        .route("/api/export", get(export_handler))
        .route("/api/import", post(import_handler))
        .route("/ws", get(ws_handler))
        .with_state(handlers)
}

async fn health_handler() -> Json<ApiResponse<&'static str>> {
    ApiHandlers::health().await
}

async fn status_handler(State(handlers): AppState) -> Json<ApiResponse<StatusResponse>> {
    handlers.status().await
}

async fn list_products_handler(
    State(handlers): AppState,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Json<ApiResponse<ViewModel>> {
    handlers.list_products(Query(query)).await
}

async fn get_product_handler(State(handlers): AppState, id: Path<String>) -> ApiResult<Product> {
    handlers.get_product(id).await
}

async fn save_product_handler(State(handlers): AppState, ApiJson(product): ApiJson<Product>) -> ApiResult<Product> {
    handlers.save_product(Json(product)).await
}

async fn delete_product_handler(State(handlers): AppState, id: Path<String>) -> ApiResult<()> {
    handlers.delete_product(id).await
}

async fn adjust_stock_handler(
    State(handlers): AppState,
    id: Path<String>,
    ApiJson(request): ApiJson<AdjustStockRequest>,
) -> ApiResult<StockUpdate> {
    handlers.adjust_stock(id, Json(request)).await
}

async fn set_stock_handler(
    State(handlers): AppState,
    id: Path<String>,
    ApiJson(request): ApiJson<SetStockRequest>,
) -> ApiResult<StockUpdate> {
    handlers.set_stock(id, Json(request)).await
}

async fn get_filter_handler(State(handlers): AppState) -> Json<ApiResponse<FilterState>> {
    handlers.get_filter().await
}

async fn put_filter_handler(
    State(handlers): AppState,
    ApiJson(filter): ApiJson<FilterState>,
) -> ApiResult<FilterState> {
    Ok(handlers.put_filter(Json(filter)).await)
}

async fn sync_handler(State(handlers): AppState) -> Json<ApiResponse<SyncReport>> {
    handlers.sync().await
}

async fn categories_handler(State(handlers): AppState) -> Json<ApiResponse<Vec<Category>>> {
    handlers.categories().await
}

async fn export_handler(State(handlers): AppState) -> Json<ApiResponse<CatalogExport>> {
    handlers.export().await
}

async fn import_handler(State(handlers): AppState, body: Bytes) -> ApiResult<usize> {
    handlers.import(&body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProductCache;
    use crate::cache::SqliteKvStore;
    use crate::store::{build_store, ProductStore};
    use crate::test_helpers::{create_test_config, sample_products, setup_test_cache, MockStore};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn spawn_server(remote: Arc<dyn ProductStore>, cache: ProductCache) -> String {
        let coordinator = Arc::new(SyncCoordinator::new(remote, None, cache, Duration::from_secs(3600)));
        coordinator.start().await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(coordinator, CategoryRegistry::builtin(), addr);
        tokio::spawn(server.serve_on(listener));

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_product_routes_over_http() {
        let (cache, _dir) = setup_test_cache().await;
        let base = spawn_server(Arc::new(MockStore::new(sample_products())), cache).await;
        let client = reqwest::Client::new();

        let health: Value = client.get(format!("{}/api/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["data"], "ok");

        let list: Value = client
            .get(format!("{}/api/products?stock=low", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list["data"]["products"].as_array().unwrap().len(), 1);
        assert_eq!(list["data"]["products"][0]["id"], "2");

        let adjusted = client
            .post(format!("{}/api/products/2/adjust", base))
            .json(&json!({"delta": 3}))
            .send()
            .await
            .unwrap();
        assert_eq!(adjusted.status(), reqwest::StatusCode::OK);
        let adjusted: Value = adjusted.json().await.unwrap();
        assert_eq!(adjusted["data"]["stock"], 7);
        assert_eq!(adjusted["data"]["synced"], true);

        let missing = client.get(format!("{}/api/products/999", base)).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
        let missing: Value = missing.json().await.unwrap();
        assert_eq!(missing["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_bad_request_envelope() {
        let (cache, _dir) = setup_test_cache().await;
        let remote = Arc::new(MockStore::new(sample_products()));
        let base = spawn_server(remote.clone(), cache).await;
        let client = reqwest::Client::new();

        let requests = vec![
            client
                .put(format!("{}/api/products/1/stock", base))
                .json(&json!({"stock": -1})),
            client
                .post(format!("{}/api/products", base))
                .json(&json!({"id": 9, "name": "Tornillo", "category": "PVC", "stock": -2})),
            client
                .post(format!("{}/api/products/1/adjust", base))
                .header("content-type", "application/json")
                .body("{ not json"),
            client
                .put(format!("{}/api/filter", base))
                .body(r#"{"search":"x"}"#),
            client.get(format!("{}/api/products?stock=plenty", base)),
        ];

        for request in requests {
            let response = request.send().await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["success"], false);
            assert!(body["data"].is_null());
            assert!(body["error"].is_string());
        }

        assert_eq!(remote.stock_of(&crate::catalog::ProductId::from("1")), Some(10));
        assert!(remote.stock_writes().is_empty());
    }

    #[tokio::test]
    async fn test_filter_persists_between_requests() {
        let (cache, _dir) = setup_test_cache().await;
        let base = spawn_server(Arc::new(MockStore::new(sample_products())), cache).await;
        let client = reqwest::Client::new();

        let response = client
            .put(format!("{}/api/filter", base))
            .json(&json!({"search": "cable"}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let list: Value = client.get(format!("{}/api/products", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(list["data"]["products"].as_array().unwrap().len(), 1);
        assert_eq!(list["data"]["filter"]["search"], "cable");
    }

    #[tokio::test]
    async fn test_rejected_remote_write_is_bad_gateway() {
        let (cache, _dir) = setup_test_cache().await;
        let remote = Arc::new(MockStore::new(sample_products()));
        let base = spawn_server(remote.clone(), cache).await;
        remote.set_accept_writes(false);

        let response = reqwest::Client::new()
            .delete(format!("{}/api/products/1", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_local_backend_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        std::fs::create_dir_all(&config.products_dir).unwrap();
        std::fs::write(
            config.products_dir.join("cables.json"),
            r#"[{"id":7,"name":"Cable 4mm","stock":12}]"#,
        )
        .unwrap();

        let categories = config.category_registry();
        let remote = build_store(&config, &categories).unwrap();
        let kv = SqliteKvStore::new(&config.cache_db_path).await.unwrap();
        let base = spawn_server(remote, ProductCache::new(Arc::new(kv))).await;
        let client = reqwest::Client::new();

        let status: Value = client.get(format!("{}/api/status", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(status["data"]["backend"], "local");
        assert_eq!(status["data"]["readOnly"], true);
        assert_eq!(status["data"]["productCount"], 1);

        let export: Value = client.get(format!("{}/api/export", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(export["data"]["totalProducts"], 1);
        assert_eq!(export["data"]["products"][0]["category"], "Cables");
    }
}

// SPDX-License-Identifier: GPL-3.0-only
use axum::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::catalog::{CatalogExport, Category, CategoryRegistry, Product, ProductId};
use crate::error::SyncError;
use crate::store::BackendKind;
use crate::sync::{SessionSnapshot, StockUpdate, SyncCoordinator, SyncEvent, SyncReport};
use crate::view::{FilterState, StockBand, ViewModel};

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetStockRequest {
    pub stock: u32,
}

/// Query overrides for the product list. Absent fields use the saved filter.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub stock: Option<StockBand>,
}

impl ProductQuery {
    fn is_empty(&self) -> bool {
        self.search.is_none() && self.category.is_none() && self.stock.is_none()
    }

    fn apply_to(self, mut filter: FilterState) -> FilterState {
        if let Some(search) = self.search {
            filter.search = search;
        }
        if let Some(category) = self.category {
            filter.category = category;
        }
        if let Some(stock) = self.stock {
            filter.stock_band = stock;
        }
        filter
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub backend: BackendKind,
    pub read_only: bool,
    #[serde(flatten)]
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Domain error rendered as an `ApiResponse` with a matching status code
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            SyncError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::RemoteWriteRejected(_) | SyncError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            SyncError::CacheCorrupt(_) | SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(ApiResponse::error(self.0.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// `Json` body extractor whose rejection is an `InvalidInput` envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection: JsonRejection| invalid_request(rejection.body_text(), rejection.status()))
    }
}

/// `Query` extractor whose rejection is an `InvalidInput` envelope
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection: QueryRejection| invalid_request(rejection.body_text(), rejection.status()))
    }
}

fn invalid_request(message: String, original: StatusCode) -> ApiError {
    warn!(status = %original, error = %message, "Rejected malformed request");
    ApiError(SyncError::InvalidInput(message))
}

pub struct ApiHandlers {
    coordinator: Arc<SyncCoordinator>,
    categories: CategoryRegistry,
}

impl ApiHandlers {
    pub fn new(coordinator: Arc<SyncCoordinator>, categories: CategoryRegistry) -> Self {
        Self {
            coordinator,
            categories,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.coordinator.subscribe()
    }
}

impl ApiHandlers {
    pub async fn health() -> Json<ApiResponse<&'static str>> {
        Json(ApiResponse::success("ok"))
    }

    pub async fn status(&self) -> Json<ApiResponse<StatusResponse>> {
        Json(ApiResponse::success(StatusResponse {
            backend: self.coordinator.backend(),
            read_only: self.coordinator.is_read_only(),
            session: self.coordinator.snapshot().await,
        }))
    }

    pub async fn list_products(&self, Query(query): Query<ProductQuery>) -> Json<ApiResponse<ViewModel>> {
        let filter = if query.is_empty() {
            None
        } else {
            Some(query.apply_to(self.coordinator.filter_state().await))
        };
        Json(ApiResponse::success(self.coordinator.view(filter).await))
    }

    pub async fn get_product(&self, Path(id): Path<String>) -> ApiResult<Product> {
        let product = self.coordinator.product(&ProductId::new(id)).await?;
        Ok(Json(ApiResponse::success(product)))
    }

    pub async fn save_product(&self, Json(product): Json<Product>) -> ApiResult<Product> {
        info!(product_id = %product.id, "Save product request received");
        let saved = self.coordinator.save_product(product).await?;
        Ok(Json(ApiResponse::success(saved)))
    }

    pub async fn delete_product(&self, Path(id): Path<String>) -> ApiResult<()> {
        let id = ProductId::new(id);
        info!(product_id = %id, "Delete product request received");
        self.coordinator.delete_product(&id).await?;
        Ok(Json(ApiResponse::success(())))
    }

    pub async fn adjust_stock(
        &self,
        Path(id): Path<String>,
        Json(request): Json<AdjustStockRequest>,
    ) -> ApiResult<StockUpdate> {
        let update = self
            .coordinator
            .adjust_stock(&ProductId::new(id), request.delta)
            .await?;
        Ok(Json(ApiResponse::success(update)))
    }

    pub async fn set_stock(&self, Path(id): Path<String>, Json(request): Json<SetStockRequest>) -> ApiResult<StockUpdate> {
        let update = self.coordinator.set_stock(&ProductId::new(id), request.stock).await?;
        Ok(Json(ApiResponse::success(update)))
    }

    pub async fn get_filter(&self) -> Json<ApiResponse<FilterState>> {
        Json(ApiResponse::success(self.coordinator.filter_state().await))
    }

    pub async fn put_filter(&self, Json(filter): Json<FilterState>) -> Json<ApiResponse<FilterState>> {
        self.coordinator.set_filter_state(filter.clone()).await;
        Json(ApiResponse::success(filter))
    }

    pub async fn sync(&self) -> Json<ApiResponse<SyncReport>> {
        info!("Manual sync requested");
        Json(ApiResponse::success(self.coordinator.sync_now().await))
    }

    /// Known categories, followed by a generic entry for every unknown
    /// key the current catalog uses
    pub async fn categories(&self) -> Json<ApiResponse<Vec<Category>>> {
        let mut categories: Vec<Category> = self.categories.iter().cloned().collect();
        for product in self.coordinator.products().await {
            if product.category.is_empty() || categories.iter().any(|c| c.key == product.category) {
                continue;
            }
            categories.push(self.categories.display(&product.category));
        }
        Json(ApiResponse::success(categories))
    }

    pub async fn export(&self) -> Json<ApiResponse<CatalogExport>> {
        Json(ApiResponse::success(self.coordinator.export().await))
    }

    pub async fn import(&self, body: &[u8]) -> ApiResult<usize> {
        let count = self.coordinator.import(body).await.inspect_err(|e| {
            warn!(error = %e, "Import rejected");
        })?;
        Ok(Json(ApiResponse::success(count)))
    }
}

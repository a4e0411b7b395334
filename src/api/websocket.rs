// SPDX-License-Identifier: GPL-3.0-only
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::handlers::{AdjustStockRequest, ApiHandlers, ApiResponse, ApiResult, ProductQuery};
use crate::view::StockBand;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WsCommand {
    ListProducts {
        search: Option<String>,
        category: Option<String>,
        stock: Option<StockBand>,
    },
    AdjustStock {
        id: String,
        delta: i64,
    },
    Sync,
    Status,
}

impl WsCommand {
    fn name(&self) -> &'static str {
        match self {
            WsCommand::ListProducts { .. } => "ListProducts",
            WsCommand::AdjustStock { .. } => "AdjustStock",
            WsCommand::Sync => "Sync",
            WsCommand::Status => "Status",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WsResponse {
    #[serde(rename = "type")]
    kind: String,
    command: Option<String>,
    success: bool,
    data: Option<serde_json::Value>,
    error: Option<String>,
}

impl WsResponse {
    fn from_api<T: Serialize>(command: &str, response: ApiResponse<T>) -> Self {
        Self {
            kind: "Response".to_string(),
            command: Some(command.to_string()),
            success: response.success,
            data: response.data.and_then(|v| serde_json::to_value(v).ok()),
            error: response.error,
        }
    }

    fn from_result<T: Serialize>(command: &str, result: ApiResult<T>) -> Self {
        match result {
            Ok(Json(response)) => Self::from_api(command, response),
            Err(e) => Self::failure(Some(command), e.0.to_string()),
        }
    }

    fn failure(command: Option<&str>, message: String) -> Self {
        Self {
            kind: "Response".to_string(),
            command: command.map(str::to_string),
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub async fn ws_handler(State(handlers): State<Arc<ApiHandlers>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, handlers))
}

async fn handle_socket(socket: WebSocket, handlers: Arc<ApiHandlers>) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "WebSocket client connected");

    let (sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut send_task = tokio::spawn(async move {
        let mut sender = sender;
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sender.send(msg).await {
                error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    let mut events = handlers.subscribe();
    let event_tx = tx.clone();
    let mut event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if event_tx.send(Message::Text(text)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %session_id, skipped, "WebSocket client lagging behind events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = handle_message(text, &handlers, &tx).await {
                        error!(session_id = %session_id, error = %e, "Failed to handle WebSocket message");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            event_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            event_task.abort();
        }
        _ = (&mut event_task) => {
            send_task.abort();
            recv_task.abort();
        }
    };

    info!(session_id = %session_id, "WebSocket client disconnected");
}

async fn handle_message(text: String, handlers: &ApiHandlers, tx: &mpsc::UnboundedSender<Message>) -> anyhow::Result<()> {
    let command: WsCommand = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            let response = WsResponse::failure(None, format!("Invalid message format: {}", e));
            tx.send(Message::Text(serde_json::to_string(&response)?))?;
            return Ok(());
        }
    };

    let name = command.name();
    debug!(command = name, "WebSocket command received");

    let response = match command {
        WsCommand::ListProducts {
            search,
            category,
            stock,
        } => {
            let query = ProductQuery {
                search,
                category,
                stock,
            };
            let Json(response) = handlers.list_products(Query(query)).await;
            WsResponse::from_api(name, response)
        }
        WsCommand::AdjustStock { id, delta } => {
            let result = handlers.adjust_stock(Path(id), Json(AdjustStockRequest { delta })).await;
            WsResponse::from_result(name, result)
        }
        WsCommand::Sync => {
            let Json(response) = handlers.sync().await;
            WsResponse::from_api(name, response)
        }
        WsCommand::Status => {
            let Json(response) = handlers.status().await;
            WsResponse::from_api(name, response)
        }
    };

    tx.send(Message::Text(serde_json::to_string(&response)?))?;
    Ok(())
}

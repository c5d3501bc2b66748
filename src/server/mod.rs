//! Synchronous HTTP surface over the same fetcher the queue consumer uses.
//!
//! `POST /quote` validates the body, runs one fetch, and answers with the
//! quotes or a structured failure. Status codes: 422 for invalid input, 400
//! for a failed fetch, 500 if the fetch task itself dies.

use crate::fetch::QuoteFetcher;
use crate::model::{QuoteRequestBody, QuoteResult};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

pub type SharedFetcher = Arc<dyn QuoteFetcher>;

/// Build the router.
pub fn router(fetcher: SharedFetcher) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/quote", post(quote))
        .with_state(fetcher)
}

/// Serve until `shutdown` is notified, then drain in-flight requests.
pub async fn serve(
    addr: SocketAddr,
    fetcher: SharedFetcher,
    shutdown: Arc<Notify>,
) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(fetcher))
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;
    info!("HTTP API stopped");
    Ok(())
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Porter quote service is running",
        "status": "ok",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn quote(
    State(fetcher): State<SharedFetcher>,
    body: Result<Json<QuoteRequestBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return invalid("Invalid request body", Some(rejection.body_text()));
        }
    };
    let request = match body.validate() {
        Ok(request) => request,
        Err(e) => return invalid("Validation failed", Some(e.to_string())),
    };

    info!(city = %request.city, service = %request.service_type, "quote requested over HTTP");

    // Run the fetch on its own task so a panic surfaces as a JoinError.
    let task = {
        let request = request.clone();
        tokio::spawn(async move { fetcher.fetch_quote(&request).await })
    };
    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            error!("quote task failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Internal server error",
                    "timestamp": timestamp(),
                })),
            )
                .into_response();
        }
    };

    match result {
        QuoteResult::Success { quotes } => Json(json!({
            "success": true,
            "pickup_address": request.pickup_address,
            "drop_address": request.drop_address,
            "city": request.city.as_str(),
            "service_type": request.service_type.as_str(),
            "user_name": request.name,
            "user_phone": request.phone.as_str(),
            "quotes": quotes,
            "timestamp": timestamp(),
        }))
        .into_response(),
        QuoteResult::Failure(failure) => {
            warn!("quote fetch failed: {failure}");
            let mut body = json!({
                "success": false,
                "error": failure.reason,
                "timestamp": timestamp(),
            });
            if let Some(details) = failure.details {
                body["details"] = Value::String(details);
            }
            if let Some(suggestion) = failure.suggestion {
                body["suggestion"] = Value::String(suggestion);
            }
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}

fn invalid(error: &str, details: Option<String>) -> Response {
    let mut body = json!({
        "success": false,
        "error": error,
        "timestamp": timestamp(),
    });
    if let Some(details) = details {
        body["details"] = Value::String(details);
    }
    (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
}

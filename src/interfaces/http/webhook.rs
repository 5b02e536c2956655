//! Inbound provider callbacks.
//!
//! Mobile-money operators POST JSON to `/payments/mobile-money/callback/{provider}`
//! and gateways POST their webhooks to `/payments/callback/{provider}`.
//! PayPal and Stripe also redirect the payer to `GET /payments/callback/{provider}`;
//! that request comes from the payer's browser, so it only triggers a status
//! poll and its query `status` is ignored.

use crate::application::engine::ReconciliationEngine;
use crate::domain::provider::ProviderId;
use crate::domain::transaction::TransactionStatus;
use crate::error::PaymentError;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub transaction_id: String,
    pub status: TransactionStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// Maps engine errors onto HTTP answers providers understand.
pub struct WebhookError(PaymentError);

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            PaymentError::TransactionNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            PaymentError::UnsupportedProvider(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_PROVIDER"),
            PaymentError::InvalidCallback { .. } | PaymentError::ValidationError(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_CALLBACK")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "Callback processing failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(engine: ReconciliationEngine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/payments/callback/:provider",
            get(checkout_return).post(body_callback),
        )
        .route(
            "/payments/mobile-money/callback/:provider",
            get(query_callback).post(body_callback),
        )
        .with_state(engine)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn body_callback(
    State(engine): State<ReconciliationEngine>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<CallbackAck>, WebhookError> {
    let provider: ProviderId = provider.parse()?;
    let mut payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body).map_err(|e| PaymentError::InvalidCallback {
            provider: provider.to_string(),
            reason: format!("malformed JSON body: {e}"),
        })?
    };
    // Some operators only echo our reference in the callback URL query.
    if let Value::Object(fields) = &mut payload {
        for (key, value) in query {
            fields.entry(key).or_insert(Value::String(value));
        }
    }
    acknowledge(&engine, provider, &payload).await
}

async fn query_callback(
    State(engine): State<ReconciliationEngine>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<CallbackAck>, WebhookError> {
    let provider: ProviderId = provider.parse()?;
    acknowledge(&engine, provider, &query_payload(query)).await
}

async fn checkout_return(
    State(engine): State<ReconciliationEngine>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<CallbackAck>, WebhookError> {
    let provider: ProviderId = provider.parse()?;
    let tx = engine
        .confirm_checkout_return(provider, &query_payload(query))
        .await?;
    Ok(Json(CallbackAck {
        transaction_id: tx.transaction_id,
        status: tx.status,
    }))
}

fn query_payload(query: HashMap<String, String>) -> Value {
    Value::Object(
        query
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    )
}

async fn acknowledge(
    engine: &ReconciliationEngine,
    provider: ProviderId,
    payload: &Value,
) -> Result<Json<CallbackAck>, WebhookError> {
    let tx = engine.handle_callback(provider, payload).await?;
    Ok(Json(CallbackAck {
        transaction_id: tx.transaction_id,
        status: tx.status,
    }))
}

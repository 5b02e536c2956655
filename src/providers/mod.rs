//! Provider adapters.
//!
//! Each adapter translates the `PaymentProvider` capability set into one
//! provider's HTTP dialect. All network access goes through the injected
//! `HttpTransport`, so adapters can be exercised with scripted responses.

pub mod mobile_money;
pub mod paypal;
pub mod registry;
pub mod stripe;

use crate::config::ProviderConfig;
use crate::domain::http::{HttpRequest, HttpResponse};
use crate::domain::ports::HttpTransport;
use crate::domain::provider::{ProviderError, ProviderId, ProviderStatus};
use crate::domain::transaction::PaymentTransaction;
use rust_decimal::Decimal;
use serde_json::Value;

pub use mobile_money::{FloozAdapter, MoovAdapter, MtnAdapter, OrangeAdapter, WaveAdapter};
pub use paypal::PaypalAdapter;
pub use registry::{ProviderRegistry, RegisteredProvider};
pub use stripe::StripeAdapter;

/// Builds `{base_url}{path}`, failing when the provider has no endpoint.
pub(crate) fn endpoint(
    config: &ProviderConfig,
    provider: ProviderId,
    path: &str,
) -> Result<String, ProviderError> {
    let base = config.base_url.trim_end_matches('/');
    if base.is_empty() {
        return Err(ProviderError::NotConfigured(provider));
    }
    Ok(format!("{base}{path}"))
}

/// Sends `request` and classifies non-2xx answers.
///
/// 4xx is a synchronous decline; 5xx and transport failures mean the
/// provider could not be reached in a useful way.
pub(crate) async fn send_checked(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> Result<HttpResponse, ProviderError> {
    let response = transport.send(request).await?;
    if response.is_success() {
        return Ok(response);
    }
    let message = error_message(&response.body);
    if (400..500).contains(&response.status) {
        Err(ProviderError::Rejected {
            status: response.status,
            message,
        })
    } else {
        Err(ProviderError::Unreachable(format!(
            "HTTP {}: {message}",
            response.status
        )))
    }
}

fn error_message(body: &Value) -> String {
    ["message", "error_description", "error", "detail"]
        .iter()
        .find_map(|key| match body.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(inner)) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .or_else(|| body.as_str().map(str::to_string))
        .unwrap_or_else(|| "no details".to_string())
}

/// Client-credentials token exchange shared by the OAuth providers.
pub(crate) async fn fetch_access_token(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> Result<String, ProviderError> {
    let response = send_checked(transport, request).await?;
    response
        .str_field("access_token")
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Protocol("token response without access_token".to_string()))
}

/// Maps a provider's native status word. Anything unrecognised stays pending.
pub(crate) fn map_status(native: Option<&str>, success: &[&str], failure: &[&str]) -> ProviderStatus {
    match native {
        Some(s) if success.contains(&s) => ProviderStatus::Completed,
        Some(s) if failure.contains(&s) => ProviderStatus::Failed,
        _ => ProviderStatus::Pending,
    }
}

pub(crate) fn amount_string(amount: Decimal) -> String {
    amount.normalize().to_string()
}

pub(crate) fn provider_reference(tx: &PaymentTransaction) -> Result<&str, ProviderError> {
    tx.provider_reference
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            ProviderError::Protocol(format!(
                "transaction {} has no provider reference",
                tx.transaction_id
            ))
        })
}

//! Translation of provider webhook bodies into one canonical event.

use crate::domain::provider::{ProviderId, ProviderStatus};
use crate::error::{PaymentError, Result};
use serde_json::{Map, Value};

/// A provider notification reduced to what the engine acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub transaction_id: String,
    pub outcome: ProviderStatus,
    pub reason: Option<String>,
}

/// How one provider shapes its callback body.
struct CallbackShape {
    /// Fields carrying our transaction id, in lookup order.
    id_fields: &'static [&'static str],
    status_field: &'static str,
    success: &'static [&'static str],
    /// `None` means every non-success status is a failure.
    failure: Option<&'static [&'static str]>,
    /// Status value written into synthesized failure callbacks.
    failure_token: &'static str,
}

fn shape_for(provider: ProviderId) -> CallbackShape {
    match provider {
        ProviderId::Mtn => CallbackShape {
            id_fields: &["externalId"],
            status_field: "status",
            success: &["SUCCESSFUL"],
            failure: Some(&["FAILED", "REJECTED"]),
            failure_token: "FAILED",
        },
        ProviderId::Moov => CallbackShape {
            id_fields: &["reference"],
            status_field: "status",
            success: &["SUCCESS"],
            failure: Some(&["FAILED"]),
            failure_token: "FAILED",
        },
        ProviderId::Flooz => CallbackShape {
            id_fields: &["orderId"],
            status_field: "status",
            success: &["00"],
            failure: None,
            failure_token: "01",
        },
        ProviderId::Orange => CallbackShape {
            id_fields: &["reference"],
            status_field: "status",
            success: &["SUCCESSFUL"],
            failure: None,
            failure_token: "FAILED",
        },
        ProviderId::Wave => CallbackShape {
            id_fields: &["externalReference"],
            status_field: "status",
            success: &["SUCCESSFUL"],
            failure: None,
            failure_token: "FAILED",
        },
        ProviderId::Paypal => CallbackShape {
            id_fields: &["transaction_id", "orderID"],
            status_field: "status",
            success: &["success", "COMPLETED"],
            failure: None,
            failure_token: "cancel",
        },
        ProviderId::Stripe => CallbackShape {
            id_fields: &["transaction_id"],
            status_field: "status",
            success: &["success"],
            failure: None,
            failure_token: "cancel",
        },
    }
}

/// Reads a field as text, accepting numeric codes as well as strings.
fn text_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts `{transaction_id, outcome}` from a provider's native payload.
///
/// A payload without a status field resolves to `Pending`, which the engine
/// treats as "nothing to apply yet".
pub fn normalize_callback(provider: ProviderId, payload: &Value) -> Result<CallbackEvent> {
    let invalid = |reason: &str| PaymentError::InvalidCallback {
        provider: provider.to_string(),
        reason: reason.to_string(),
    };
    let object = payload
        .as_object()
        .ok_or_else(|| invalid("payload is not a JSON object"))?;
    let shape = shape_for(provider);

    let transaction_id = shape
        .id_fields
        .iter()
        .find_map(|field| text_field(object, field))
        .ok_or_else(|| invalid("missing transaction reference"))?;

    let outcome = match text_field(object, shape.status_field) {
        None => ProviderStatus::Pending,
        Some(status) if shape.success.contains(&status.as_str()) => ProviderStatus::Completed,
        Some(status) => match shape.failure {
            Some(failures) if failures.contains(&status.as_str()) => ProviderStatus::Failed,
            Some(_) => ProviderStatus::Pending,
            None => ProviderStatus::Failed,
        },
    };

    Ok(CallbackEvent {
        transaction_id,
        outcome,
        reason: text_field(object, "reason"),
    })
}

/// Builds the payload `provider` would have sent for a status learned by
/// polling, so polled outcomes go through the same callback path.
pub fn synthesize_callback(
    provider: ProviderId,
    transaction_id: &str,
    outcome: ProviderStatus,
) -> Value {
    let shape = shape_for(provider);
    let mut payload = Map::new();
    payload.insert(
        shape.id_fields[0].to_string(),
        Value::String(transaction_id.to_string()),
    );
    match outcome {
        ProviderStatus::Completed => {
            payload.insert(
                shape.status_field.to_string(),
                Value::String(shape.success[0].to_string()),
            );
        }
        ProviderStatus::Failed => {
            payload.insert(
                shape.status_field.to_string(),
                Value::String(shape.failure_token.to_string()),
            );
            payload.insert(
                "reason".to_string(),
                Value::String("Payment reported as failed by provider status check".to_string()),
            );
        }
        ProviderStatus::Pending => {}
    }
    payload.insert("synthesized".to_string(), Value::Bool(true));
    Value::Object(payload)
}

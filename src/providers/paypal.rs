//! PayPal Orders v2.
//!
//! The payer approves the order on PayPal's site and is sent back to our
//! callback URL with `transaction_id` and `status` in the query string.

use super::{endpoint, fetch_access_token, map_status, provider_reference, send_checked};
use crate::config::ProviderConfig;
use crate::domain::http::HttpRequest;
use crate::domain::ports::{PaymentProvider, SharedHttpTransport};
use crate::domain::provider::{InitiateRequest, Initiation, ProviderError, ProviderId, ProviderStatus};
use crate::domain::transaction::PaymentTransaction;
use async_trait::async_trait;
use serde_json::{Value, json};

pub struct PaypalAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

impl PaypalAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let url = endpoint(&self.config, ProviderId::Paypal, "/v1/oauth2/token")?;
        let request = HttpRequest::post(url)
            .basic_auth(&self.config.api_key, &self.config.api_secret)
            .form(vec![(
                "grant_type".to_string(),
                "client_credentials".to_string(),
            )]);
        fetch_access_token(self.transport.as_ref(), request).await
    }

    fn return_url(&self, transaction_id: &str, status: &str) -> String {
        format!(
            "{}?transaction_id={transaction_id}&status={status}",
            self.config.callback_url
        )
    }
}

fn approve_link(order: &Value) -> Option<String> {
    order
        .get("links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("approve"))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl PaymentProvider for PaypalAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Paypal
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let url = endpoint(&self.config, ProviderId::Paypal, "/v2/checkout/orders")?;
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.transaction_id,
                "description": request.description,
                "amount": {
                    "currency_code": request.currency,
                    "value": format!("{:.2}", request.amount),
                },
            }],
            "application_context": {
                "return_url": self.return_url(&request.transaction_id, "success"),
                "cancel_url": self.return_url(&request.transaction_id, "cancel"),
            },
        });
        let http = HttpRequest::post(url).bearer(&token).json(body);
        let response = send_checked(self.transport.as_ref(), http).await?;

        let order_id = response
            .str_field("id")
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Protocol("order response without id".to_string()))?;
        Ok(Initiation {
            provider_reference: Some(order_id),
            accepted_pending: true,
            redirect_url: approve_link(&response.body),
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let order_id = provider_reference(tx)?;
        let url = endpoint(
            &self.config,
            ProviderId::Paypal,
            &format!("/v2/checkout/orders/{order_id}"),
        )?;
        let token = self.access_token().await?;
        let http = HttpRequest::get(url).bearer(&token);
        let response = send_checked(self.transport.as_ref(), http).await?;
        Ok(map_status(response.str_field("status"), &["COMPLETED"], &["VOIDED"]))
    }

    async fn cancel(&self, tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        let order_id = provider_reference(tx)?;
        let url = endpoint(
            &self.config,
            ProviderId::Paypal,
            &format!("/v2/checkout/orders/{order_id}/cancel"),
        )?;
        let token = self.access_token().await?;
        let http = HttpRequest::post(url).bearer(&token);
        send_checked(self.transport.as_ref(), http).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::http::{HttpResponse, RequestBody};
    use crate::domain::transaction::NewTransaction;
    use crate::providers::testing::ScriptedTransport;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn adapter(transport: Arc<ScriptedTransport>) -> PaypalAdapter {
        PaypalAdapter::new(
            ProviderConfig {
                base_url: "https://paypal.example".to_string(),
                api_key: "client".to_string(),
                api_secret: "secret".to_string(),
                callback_url: "https://pay.example.org/payments/callback/paypal".to_string(),
                ..Default::default()
            },
            transport,
        )
    }

    fn token() -> Result<HttpResponse, crate::domain::http::TransportError> {
        Ok(HttpResponse::new(200, json!({"access_token": "pp-token"})))
    }

    fn order(reference: Option<&str>) -> PaymentTransaction {
        let mut tx = PaymentTransaction::pending(NewTransaction {
            user_id: 2,
            project_id: 9,
            amount: dec!(10.00),
            currency: "USD".to_string(),
            provider: ProviderId::Paypal,
            phone_number: None,
        });
        tx.provider_reference = reference.map(str::to_string);
        tx
    }

    #[tokio::test]
    async fn test_initiate_creates_order_and_returns_approval_link() {
        let transport = Arc::new(ScriptedTransport::with(vec![
            token(),
            Ok(HttpResponse::new(
                201,
                json!({
                    "id": "ORDER-1",
                    "links": [
                        {"rel": "self", "href": "https://paypal.example/v2/checkout/orders/ORDER-1"},
                        {"rel": "approve", "href": "https://paypal.example/checkoutnow?token=ORDER-1"}
                    ]
                }),
            )),
        ]));
        let request = InitiateRequest {
            transaction_id: "MM-1".to_string(),
            phone_number: None,
            amount: dec!(8.333),
            currency: "USD".to_string(),
            description: "Contribution".to_string(),
            project_id: 9,
        };

        let initiation = adapter(transport.clone()).initiate(&request).await.unwrap();
        assert_eq!(initiation.provider_reference.as_deref(), Some("ORDER-1"));
        assert_eq!(
            initiation.redirect_url.as_deref(),
            Some("https://paypal.example/checkoutnow?token=ORDER-1")
        );

        let sent = transport.sent();
        assert_eq!(
            sent[0].body,
            RequestBody::Form(vec![("grant_type".to_string(), "client_credentials".to_string())])
        );
        match &sent[1].body {
            RequestBody::Json(body) => {
                assert_eq!(body["purchase_units"][0]["amount"]["value"], "8.33");
                assert_eq!(
                    body["application_context"]["cancel_url"],
                    "https://pay.example.org/payments/callback/paypal?transaction_id=MM-1&status=cancel"
                );
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_uses_order_reference() {
        let transport = Arc::new(ScriptedTransport::with(vec![
            token(),
            Ok(HttpResponse::new(200, json!({"status": "VOIDED"}))),
        ]));
        let status = adapter(transport.clone())
            .check_status(&order(Some("ORDER-2")))
            .await
            .unwrap();
        assert_eq!(status, ProviderStatus::Failed);
        assert_eq!(
            transport.sent()[1].url,
            "https://paypal.example/v2/checkout/orders/ORDER-2"
        );
    }

    #[tokio::test]
    async fn test_status_without_reference_is_protocol_error() {
        let transport = Arc::new(ScriptedTransport::default());
        let result = adapter(transport.clone()).check_status(&order(None)).await;
        assert!(matches!(result, Err(ProviderError::Protocol(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_voids_order() {
        let transport = Arc::new(ScriptedTransport::with(vec![
            token(),
            Ok(HttpResponse::new(204, Value::Null)),
        ]));
        assert!(adapter(transport.clone()).cancel(&order(Some("ORDER-3"))).await.unwrap());
        assert_eq!(
            transport.sent()[1].url,
            "https://paypal.example/v2/checkout/orders/ORDER-3/cancel"
        );
    }
}

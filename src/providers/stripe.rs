//! Stripe Checkout sessions (form-encoded API).

use super::{endpoint, provider_reference, send_checked};
use crate::config::ProviderConfig;
use crate::domain::http::HttpRequest;
use crate::domain::ports::{PaymentProvider, SharedHttpTransport};
use crate::domain::provider::{InitiateRequest, Initiation, ProviderError, ProviderId, ProviderStatus};
use crate::domain::transaction::PaymentTransaction;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub struct StripeAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

/// Currencies Stripe charges in whole units.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Stripe amounts are integers in the currency's minor unit.
fn minor_units(amount: Decimal, currency: &str) -> Result<i64, ProviderError> {
    let zero_decimal = ZERO_DECIMAL_CURRENCIES
        .iter()
        .any(|code| code.eq_ignore_ascii_case(currency));
    let factor = if zero_decimal {
        Decimal::ONE
    } else {
        Decimal::ONE_HUNDRED
    };
    (amount * factor)
        .round()
        .to_i64()
        .ok_or_else(|| ProviderError::Protocol(format!("amount {amount} out of range")))
}

impl StripeAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }

    fn session_form(&self, request: &InitiateRequest) -> Result<Vec<(String, String)>, ProviderError> {
        let return_url = |status: &str| {
            format!(
                "{}?transaction_id={}&status={status}",
                self.config.callback_url, request.transaction_id
            )
        };
        let fields = [
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("client_reference_id", request.transaction_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.to_ascii_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                minor_units(request.amount, &request.currency)?.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                "Project contribution".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                request.description.clone(),
            ),
            ("success_url", return_url("success")),
            ("cancel_url", return_url("cancel")),
        ];
        Ok(fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }
}

#[async_trait]
impl PaymentProvider for StripeAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Stripe
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let url = endpoint(&self.config, ProviderId::Stripe, "/v1/checkout/sessions")?;
        let http = HttpRequest::post(url)
            .bearer(&self.config.api_key)
            .form(self.session_form(request)?);
        let response = send_checked(self.transport.as_ref(), http).await?;

        let session_id = response
            .str_field("id")
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Protocol("session response without id".to_string()))?;
        Ok(Initiation {
            provider_reference: Some(session_id),
            accepted_pending: true,
            redirect_url: response.str_field("url").map(str::to_string),
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let session_id = provider_reference(tx)?;
        let url = endpoint(
            &self.config,
            ProviderId::Stripe,
            &format!("/v1/checkout/sessions/{session_id}"),
        )?;
        let http = HttpRequest::get(url).bearer(&self.config.api_key);
        let response = send_checked(self.transport.as_ref(), http).await?;

        if response.str_field("payment_status") == Some("paid") {
            Ok(ProviderStatus::Completed)
        } else if response.str_field("status") == Some("expired") {
            Ok(ProviderStatus::Failed)
        } else {
            Ok(ProviderStatus::Pending)
        }
    }

    async fn cancel(&self, tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        let session_id = provider_reference(tx)?;
        let url = endpoint(
            &self.config,
            ProviderId::Stripe,
            &format!("/v1/checkout/sessions/{session_id}/expire"),
        )?;
        let http = HttpRequest::post(url).bearer(&self.config.api_key);
        send_checked(self.transport.as_ref(), http).await?;
        Ok(true)
    }
}

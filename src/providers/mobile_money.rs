//! Mobile-money operators: MTN, Moov, Flooz, Orange and Wave.
//!
//! All five are phone-addressed and push their final outcome through a
//! callback. None of them exposes a cancel endpoint, so `cancel` only
//! acknowledges locally.

use super::{amount_string, endpoint, fetch_access_token, map_status, send_checked};
use crate::config::ProviderConfig;
use crate::domain::http::HttpRequest;
use crate::domain::ports::{PaymentProvider, SharedHttpTransport};
use crate::domain::provider::{InitiateRequest, Initiation, ProviderError, ProviderId, ProviderStatus};
use crate::domain::transaction::PaymentTransaction;
use async_trait::async_trait;
use serde_json::{Value, json};

fn payer_phone(request: &InitiateRequest, provider: ProviderId) -> Result<&str, ProviderError> {
    request.phone_number.as_deref().ok_or_else(|| {
        ProviderError::Protocol(format!("{provider} payment requires a payer phone number"))
    })
}

fn payee_note(request: &InitiateRequest) -> String {
    format!("Contribution to project #{}", request.project_id)
}

fn client_credentials() -> Value {
    json!({"grant_type": "client_credentials"})
}

/// MTN Mobile Money collection API.
pub struct MtnAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

impl MtnAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let url = endpoint(&self.config, ProviderId::Mtn, "/collection/token")?;
        let request = HttpRequest::post(url)
            .basic_auth(&self.config.api_key, &self.config.api_secret)
            .json(client_credentials());
        fetch_access_token(self.transport.as_ref(), request).await
    }

    fn target_environment(&self) -> &str {
        self.config
            .target_environment
            .as_deref()
            .unwrap_or("production")
    }
}

#[async_trait]
impl PaymentProvider for MtnAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Mtn
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let phone = payer_phone(request, ProviderId::Mtn)?;
        let url = endpoint(&self.config, ProviderId::Mtn, "/collection/v1/requesttopay")?;
        let token = self.access_token().await?;
        let body = json!({
            "amount": amount_string(request.amount),
            "currency": request.currency,
            "externalId": request.transaction_id,
            "payer": {"partyIdType": "MSISDN", "partyId": phone},
            "payerMessage": request.description,
            "payeeNote": payee_note(request),
        });
        let http = HttpRequest::post(url)
            .bearer(&token)
            .header("X-Reference-Id", request.transaction_id.clone())
            .header("X-Callback-Url", self.config.callback_url.clone())
            .header("X-Target-Environment", self.target_environment())
            .json(body);
        let response = send_checked(self.transport.as_ref(), http).await?;

        Ok(Initiation {
            provider_reference: Some(request.transaction_id.clone()),
            accepted_pending: response.status == 202,
            redirect_url: None,
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let url = endpoint(
            &self.config,
            ProviderId::Mtn,
            &format!("/collection/v1/requesttopay/{}", tx.transaction_id),
        )?;
        let token = self.access_token().await?;
        let http = HttpRequest::get(url)
            .bearer(&token)
            .header("X-Target-Environment", self.target_environment());
        let response = send_checked(self.transport.as_ref(), http).await?;
        Ok(map_status(response.str_field("status"), &["SUCCESSFUL"], &["FAILED"]))
    }

    async fn cancel(&self, _tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Status endpoint shared by the Moov and Flooz merchant APIs.
fn merchant_status_url(
    config: &ProviderConfig,
    provider: ProviderId,
    tx: &PaymentTransaction,
) -> Result<String, ProviderError> {
    endpoint(
        config,
        provider,
        &format!("/api/v1/transactions/{}/status", tx.transaction_id),
    )
}

/// Moov Money merchant API.
pub struct MoovAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

impl MoovAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl PaymentProvider for MoovAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Moov
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let phone = payer_phone(request, ProviderId::Moov)?;
        let url = endpoint(&self.config, ProviderId::Moov, "/api/v1/payments")?;
        let body = json!({
            "phoneNumber": phone,
            "amount": amount_string(request.amount),
            "currency": request.currency,
            "reference": request.transaction_id,
            "description": request.description,
            "callbackUrl": format!("{}?reference={}", self.config.callback_url, request.transaction_id),
        });
        let http = HttpRequest::post(url).bearer(&self.config.api_key).json(body);
        let response = send_checked(self.transport.as_ref(), http).await?;

        let provider_reference = response
            .str_field("providerReference")
            .or_else(|| {
                response
                    .body
                    .pointer("/data/providerReference")
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .or_else(|| Some(request.transaction_id.clone()));
        Ok(Initiation {
            provider_reference,
            accepted_pending: true,
            redirect_url: None,
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let url = merchant_status_url(&self.config, ProviderId::Moov, tx)?;
        let http = HttpRequest::get(url).bearer(&self.config.api_key);
        let response = send_checked(self.transport.as_ref(), http).await?;
        Ok(map_status(response.str_field("status"), &["SUCCESS"], &["FAILED"]))
    }

    async fn cancel(&self, _tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Flooz merchant API.
pub struct FloozAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

impl FloozAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }

    fn authenticate(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("X-API-Key", self.config.api_key.clone())
            .header("X-API-Secret", self.config.api_secret.clone())
    }
}

#[async_trait]
impl PaymentProvider for FloozAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Flooz
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let phone = payer_phone(request, ProviderId::Flooz)?;
        let url = endpoint(&self.config, ProviderId::Flooz, "/api/merchant/payments")?;
        let body = json!({
            "msisdn": phone,
            "amount": amount_string(request.amount),
            "currency": request.currency,
            "orderId": request.transaction_id,
            "description": request.description,
            "callbackUrl": format!("{}?orderId={}", self.config.callback_url, request.transaction_id),
        });
        let http = self.authenticate(HttpRequest::post(url)).json(body);
        let response = send_checked(self.transport.as_ref(), http).await?;

        Ok(Initiation {
            provider_reference: response
                .str_field("sessionId")
                .map(str::to_string)
                .or_else(|| Some(request.transaction_id.clone())),
            accepted_pending: true,
            redirect_url: None,
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let url = merchant_status_url(&self.config, ProviderId::Flooz, tx)?;
        let http = self.authenticate(HttpRequest::get(url));
        let response = send_checked(self.transport.as_ref(), http).await?;
        Ok(map_status(response.str_field("status"), &["SUCCESS"], &["FAILED"]))
    }

    async fn cancel(&self, _tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Orange Money payment API.
pub struct OrangeAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

impl OrangeAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let url = endpoint(&self.config, ProviderId::Orange, "/oauth/token")?;
        let request = HttpRequest::post(url)
            .basic_auth(&self.config.api_key, &self.config.api_secret)
            .json(client_credentials());
        fetch_access_token(self.transport.as_ref(), request).await
    }
}

#[async_trait]
impl PaymentProvider for OrangeAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Orange
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let phone = payer_phone(request, ProviderId::Orange)?;
        let url = endpoint(&self.config, ProviderId::Orange, "/payment/v1/payments")?;
        let token = self.access_token().await?;
        let body = json!({
            "amount": amount_string(request.amount),
            "currency": request.currency,
            "reference": request.transaction_id,
            "payerMessage": request.description,
            "payeeNote": payee_note(request),
            "msisdn": phone,
        });
        let http = HttpRequest::post(url).bearer(&token).json(body);
        let response = send_checked(self.transport.as_ref(), http).await?;

        Ok(Initiation {
            provider_reference: Some(request.transaction_id.clone()),
            accepted_pending: response.status == 202,
            redirect_url: None,
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let url = endpoint(
            &self.config,
            ProviderId::Orange,
            &format!("/payment/v1/payments/{}", tx.transaction_id),
        )?;
        let token = self.access_token().await?;
        let http = HttpRequest::get(url).bearer(&token);
        let response = send_checked(self.transport.as_ref(), http).await?;
        Ok(map_status(response.str_field("status"), &["SUCCESSFUL"], &["FAILED"]))
    }

    async fn cancel(&self, _tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Wave checkout sessions.
pub struct WaveAdapter {
    config: ProviderConfig,
    transport: SharedHttpTransport,
}

impl WaveAdapter {
    pub fn new(config: ProviderConfig, transport: SharedHttpTransport) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl PaymentProvider for WaveAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Wave
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        let phone = payer_phone(request, ProviderId::Wave)?;
        let url = endpoint(&self.config, ProviderId::Wave, "/checkout/sessions")?;
        let body = json!({
            "amount": amount_string(request.amount),
            "currency": request.currency,
            "externalReference": request.transaction_id,
            "mobileNumber": phone,
            "description": request.description,
            "callbackUrl": format!("{}?ref={}", self.config.callback_url, request.transaction_id),
        });
        let http = HttpRequest::post(url).bearer(&self.config.api_key).json(body);
        let response = send_checked(self.transport.as_ref(), http).await?;

        Ok(Initiation {
            provider_reference: response
                .str_field("sessionId")
                .map(str::to_string)
                .or_else(|| Some(request.transaction_id.clone())),
            accepted_pending: true,
            redirect_url: response.str_field("paymentUrl").map(str::to_string),
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        let url = endpoint(
            &self.config,
            ProviderId::Wave,
            &format!("/checkout/sessions/{}", tx.transaction_id),
        )?;
        let http = HttpRequest::get(url).bearer(&self.config.api_key);
        let response = send_checked(self.transport.as_ref(), http).await?;
        Ok(map_status(response.str_field("status"), &["SUCCESSFUL"], &["FAILED"]))
    }

    async fn cancel(&self, _tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

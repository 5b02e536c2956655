use crate::error::PaymentError;
use crate::domain::http::TransportError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of payment networks the platform integrates with.
///
/// Declaration order is the registration order used when inferring a
/// mobile-money operator from a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Mtn,
    Moov,
    Flooz,
    Orange,
    Wave,
    Paypal,
    Stripe,
}

impl ProviderId {
    pub const ALL: [ProviderId; 7] = [
        ProviderId::Mtn,
        ProviderId::Moov,
        ProviderId::Flooz,
        ProviderId::Orange,
        ProviderId::Wave,
        ProviderId::Paypal,
        ProviderId::Stripe,
    ];

    pub const MOBILE_MONEY: [ProviderId; 5] = [
        ProviderId::Mtn,
        ProviderId::Moov,
        ProviderId::Flooz,
        ProviderId::Orange,
        ProviderId::Wave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Mtn => "mtn",
            ProviderId::Moov => "moov",
            ProviderId::Flooz => "flooz",
            ProviderId::Orange => "orange",
            ProviderId::Wave => "wave",
            ProviderId::Paypal => "paypal",
            ProviderId::Stripe => "stripe",
        }
    }

    /// Human readable provider name used in user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Mtn => "MTN Mobile Money",
            ProviderId::Moov => "Moov Money",
            ProviderId::Flooz => "Flooz",
            ProviderId::Orange => "Orange Money",
            ProviderId::Wave => "Wave",
            ProviderId::Paypal => "PayPal",
            ProviderId::Stripe => "Stripe",
        }
    }

    pub fn is_mobile_money(&self) -> bool {
        Self::MOBILE_MONEY.contains(self)
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            ProviderId::Paypal => PaymentMethod::Paypal,
            ProviderId::Stripe => PaymentMethod::Stripe,
            _ => PaymentMethod::MobileMoney,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| PaymentError::UnsupportedProvider(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Paypal,
    Stripe,
}

/// Normalized answer of a provider status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Pending,
    Completed,
    Failed,
}

/// Everything an adapter needs to open a payment with its provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    pub transaction_id: String,
    /// Normalized international number, only for mobile money.
    pub phone_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub project_id: u64,
}

/// Provider acknowledgement of an initiated payment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Initiation {
    pub provider_reference: Option<String>,
    pub accepted_pending: bool,
    /// Checkout or approval page the payer must visit, when the provider has one.
    pub redirect_url: Option<String>,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected provider response: {0}")]
    Protocol(String),
    #[error("provider {0} is not configured")]
    NotConfigured(ProviderId),
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        ProviderError::Unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing_is_case_insensitive() {
        assert_eq!("MTN".parse::<ProviderId>().unwrap(), ProviderId::Mtn);
        assert_eq!(" stripe ".parse::<ProviderId>().unwrap(), ProviderId::Stripe);
        assert!(matches!(
            "mpesa".parse::<ProviderId>(),
            Err(PaymentError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_provider_families() {
        assert!(ProviderId::Wave.is_mobile_money());
        assert!(!ProviderId::Paypal.is_mobile_money());
        assert_eq!(ProviderId::Flooz.method(), PaymentMethod::MobileMoney);
        assert_eq!(ProviderId::Stripe.method(), PaymentMethod::Stripe);
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        let json = serde_json::to_string(&ProviderId::Orange).unwrap();
        assert_eq!(json, "\"orange\"");
    }
}

use crate::domain::provider::{PaymentMethod, ProviderId, ProviderStatus};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a payment. Only `Pending` may change; every other state is final.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown transaction status: {other}"
            ))),
        }
    }
}

impl ProviderStatus {
    /// The transaction state a provider answer resolves to, if it is final.
    pub fn terminal_status(&self) -> Option<TransactionStatus> {
        match self {
            ProviderStatus::Pending => None,
            ProviderStatus::Completed => Some(TransactionStatus::Completed),
            ProviderStatus::Failed => Some(TransactionStatus::Failed),
        }
    }
}

/// Attributes supplied by the caller when a payment is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: u64,
    pub project_id: u64,
    pub amount: Decimal,
    pub currency: String,
    pub provider: ProviderId,
    pub phone_number: Option<String>,
}

/// A payment attempt and its audit trail. Records are never deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentTransaction {
    pub transaction_id: String,
    pub user_id: u64,
    pub project_id: u64,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub provider: ProviderId,
    pub phone_number: Option<String>,
    pub provider_reference: Option<String>,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    /// Provider callback body, stored verbatim.
    pub raw_callback: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn pending(new: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: generate_transaction_id(now),
            user_id: new.user_id,
            project_id: new.project_id,
            amount: new.amount,
            currency: new.currency,
            method: new.provider.method(),
            provider: new.provider,
            phone_number: new.phone_number,
            provider_reference: None,
            status: TransactionStatus::Pending,
            error_message: None,
            raw_callback: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `MM-<unix millis>-<8 hex>`: unique, URL-safe and short enough for every
/// provider's reference field.
fn generate_transaction_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("MM-{}-{}", now.timestamp_millis(), &random[..8])
}

/// Ledger record proving a payment was credited to a project.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Contribution {
    pub transaction_id: String,
    pub user_id: u64,
    pub project_id: u64,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Contribution {
    pub fn for_transaction(tx: &PaymentTransaction) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id,
            project_id: tx.project_id,
            amount: tx.amount,
            payment_method: tx.method,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }
}

use super::http::{HttpRequest, HttpResponse, TransportError};
use super::notification::Notification;
use super::project::Project;
use super::provider::{InitiateRequest, Initiation, ProviderError, ProviderId, ProviderStatus};
use super::transaction::{Contribution, PaymentTransaction, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

/// Outcome-changing write applied by `PaymentStore::update_status_if`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    /// Replaces the stored callback body when present.
    pub raw_callback: Option<Value>,
}

/// Result of a conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// The transaction was in the expected state and now carries the update.
    /// `contribution` is set when this transition created it.
    Applied {
        transaction: PaymentTransaction,
        contribution: Option<Contribution>,
    },
    /// Another writer got there first; this is the current record.
    Unchanged(PaymentTransaction),
}

/// The only component allowed to mutate transactions, contributions and
/// project balances.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a new transaction. Fails if the id already exists.
    async fn create_transaction(&self, tx: PaymentTransaction) -> Result<()>;

    async fn find_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>>;

    /// Stores the provider acknowledgement of an initiation.
    ///
    /// The reference is always recorded; the error message only while the
    /// transaction is still pending. The status is never touched.
    async fn record_initiation(
        &self,
        transaction_id: &str,
        provider_reference: Option<String>,
        error_message: Option<String>,
    ) -> Result<PaymentTransaction>;

    /// Atomically applies `update` if the transaction is currently `expected`.
    ///
    /// When the new status is `Completed`, the contribution is created (if
    /// absent) and the project balance incremented inside the same critical
    /// section, so concurrent resolvers credit a payment exactly once.
    async fn update_status_if(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<StatusChange>;

    /// Returns `true` when the contribution was inserted, `false` if one
    /// already existed for the transaction id.
    async fn create_contribution_if_absent(&self, contribution: Contribution) -> Result<bool>;

    async fn find_contribution(&self, transaction_id: &str) -> Result<Option<Contribution>>;

    async fn increment_project_amount(&self, project_id: u64, amount: Decimal) -> Result<()>;

    async fn find_project(&self, project_id: u64) -> Result<Option<Project>>;

    async fn store_project(&self, project: Project) -> Result<()>;

    async fn pending_created_before(&self, cutoff: DateTime<Utc>)
    -> Result<Vec<PaymentTransaction>>;

    /// Transactions with `from <= created_at <= to`.
    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>>;
}

/// Fire-and-forget channel to users.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, notification: Notification) -> Result<()>;
}

/// Outbound HTTP capability used by provider adapters.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Provider-specific translation of the `initiate / check_status / cancel`
/// capability set. Adapters never touch the store.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn initiate(
        &self,
        request: &InitiateRequest,
    ) -> std::result::Result<Initiation, ProviderError>;

    async fn check_status(
        &self,
        tx: &PaymentTransaction,
    ) -> std::result::Result<ProviderStatus, ProviderError>;

    /// Returns whether the provider side was cancelled.
    async fn cancel(&self, tx: &PaymentTransaction) -> std::result::Result<bool, ProviderError>;
}

pub type SharedPaymentStore = Arc<dyn PaymentStore>;
pub type SharedNotificationSink = Arc<dyn NotificationSink>;
pub type SharedHttpTransport = Arc<dyn HttpTransport>;
pub type SharedPaymentProvider = Arc<dyn PaymentProvider>;

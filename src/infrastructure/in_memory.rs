use super::apply_status_update;
use crate::domain::money::Amount;
use crate::domain::notification::Notification;
use crate::domain::ports::{NotificationSink, PaymentStore, StatusChange, StatusUpdate};
use crate::domain::project::Project;
use crate::domain::transaction::{Contribution, PaymentTransaction, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Default)]
struct StoreState {
    transactions: HashMap<String, PaymentTransaction>,
    contributions: HashMap<String, Contribution>,
    projects: HashMap<u64, Project>,
}

impl StoreState {
    fn credit_project(&mut self, project_id: u64, amount: Decimal) -> Result<bool> {
        match self.projects.get_mut(&project_id) {
            Some(project) => {
                project.credit(Amount::new(amount)?);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A thread-safe in-memory payment store.
///
/// Transactions, contributions and projects live behind a single
/// `Arc<RwLock<..>>`, so a conditional status update and the credit that
/// follows it are observed together or not at all.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_transaction(&self, tx: PaymentTransaction) -> Result<()> {
        let mut state = self.state.write().await;
        if state.transactions.contains_key(&tx.transaction_id) {
            return Err(PaymentError::ValidationError(format!(
                "Transaction {} already exists",
                tx.transaction_id
            )));
        }
        state.transactions.insert(tx.transaction_id.clone(), tx);
        Ok(())
    }

    async fn find_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(transaction_id).cloned())
    }

    async fn record_initiation(
        &self,
        transaction_id: &str,
        provider_reference: Option<String>,
        error_message: Option<String>,
    ) -> Result<PaymentTransaction> {
        let mut state = self.state.write().await;
        let tx = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;
        if provider_reference.is_some() {
            tx.provider_reference = provider_reference;
        }
        if error_message.is_some() && tx.status == TransactionStatus::Pending {
            tx.error_message = error_message;
        }
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn update_status_if(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<StatusChange> {
        let mut state = self.state.write().await;
        let tx = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;
        if tx.status != expected {
            return Ok(StatusChange::Unchanged(tx.clone()));
        }
        apply_status_update(tx, update);
        let tx = tx.clone();

        let mut contribution = None;
        if tx.status == TransactionStatus::Completed
            && !state.contributions.contains_key(transaction_id)
        {
            let created = Contribution::for_transaction(&tx);
            state
                .contributions
                .insert(transaction_id.to_string(), created.clone());
            if !state.credit_project(tx.project_id, tx.amount)? {
                warn!(
                    transaction_id,
                    project_id = tx.project_id,
                    "Contribution recorded for unknown project; balance not incremented"
                );
            }
            contribution = Some(created);
        }

        Ok(StatusChange::Applied {
            transaction: tx,
            contribution,
        })
    }

    async fn create_contribution_if_absent(&self, contribution: Contribution) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.contributions.contains_key(&contribution.transaction_id) {
            return Ok(false);
        }
        state
            .contributions
            .insert(contribution.transaction_id.clone(), contribution);
        Ok(true)
    }

    async fn find_contribution(&self, transaction_id: &str) -> Result<Option<Contribution>> {
        let state = self.state.read().await;
        Ok(state.contributions.get(transaction_id).cloned())
    }

    async fn increment_project_amount(&self, project_id: u64, amount: Decimal) -> Result<()> {
        let mut state = self.state.write().await;
        if state.credit_project(project_id, amount)? {
            Ok(())
        } else {
            Err(PaymentError::ValidationError(format!(
                "Unknown project {project_id}"
            )))
        }
    }

    async fn find_project(&self, project_id: u64) -> Result<Option<Project>> {
        let state = self.state.read().await;
        Ok(state.projects.get(&project_id).cloned())
    }

    async fn store_project(&self, project: Project) -> Result<()> {
        let mut state = self.state.write().await;
        state.projects.insert(project.id, project);
        Ok(())
    }

    async fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.created_at < cutoff)
            .cloned()
            .collect();
        pending.sort_by_key(|tx| tx.created_at);
        Ok(pending)
    }

    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>> {
        let state = self.state.read().await;
        let mut matching: Vec<_> = state
            .transactions
            .values()
            .filter(|tx| tx.created_at >= from && tx.created_at <= to)
            .cloned()
            .collect();
        matching.sort_by_key(|tx| tx.created_at);
        Ok(matching)
    }
}

/// Records every notification; used by tests and embedded callers that
/// deliver notifications themselves.
#[derive(Default, Clone)]
pub struct InMemoryNotificationSink {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn emit(&self, notification: Notification) -> Result<()> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::notification::NotificationKind;
    use crate::domain::provider::ProviderId;
    use crate::domain::transaction::NewTransaction;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn mtn_tx(project_id: u64) -> PaymentTransaction {
        PaymentTransaction::pending(NewTransaction {
            user_id: 1,
            project_id,
            amount: dec!(5000),
            currency: "XOF".to_string(),
            provider: ProviderId::Mtn,
            phone_number: Some("22890123456".to_string()),
        })
    }

    fn completed() -> StatusUpdate {
        StatusUpdate {
            status: TransactionStatus::Completed,
            error_message: None,
            raw_callback: Some(json!({"status": "SUCCESSFUL"})),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_transaction() {
        let store = InMemoryPaymentStore::new();
        let tx = mtn_tx(6);
        store.create_transaction(tx.clone()).await.unwrap();

        assert_eq!(store.find_transaction(&tx.transaction_id).await.unwrap(), Some(tx.clone()));
        assert!(store.find_transaction("MM-0-missing").await.unwrap().is_none());
        assert!(store.create_transaction(tx).await.is_err());
    }

    #[tokio::test]
    async fn test_completion_credits_project_once() {
        let store = InMemoryPaymentStore::new();
        store
            .store_project(Project::new(6, "Chemins croisés", 42, dec!(100000)))
            .await
            .unwrap();
        let tx = mtn_tx(6);
        store.create_transaction(tx.clone()).await.unwrap();

        let first = store
            .update_status_if(&tx.transaction_id, TransactionStatus::Pending, completed())
            .await
            .unwrap();
        match first {
            StatusChange::Applied { transaction, contribution } => {
                assert_eq!(transaction.status, TransactionStatus::Completed);
                assert!(transaction.raw_callback.is_some());
                assert_eq!(contribution.unwrap().amount, dec!(5000));
            }
            other => panic!("expected applied change, got {other:?}"),
        }

        let second = store
            .update_status_if(&tx.transaction_id, TransactionStatus::Pending, completed())
            .await
            .unwrap();
        assert!(matches!(second, StatusChange::Unchanged(_)));

        let project = store.find_project(6).await.unwrap().unwrap();
        assert_eq!(project.current_amount, Balance::new(dec!(5000)));
    }

    #[tokio::test]
    async fn test_record_initiation_keeps_status() {
        let store = InMemoryPaymentStore::new();
        let tx = mtn_tx(6);
        store.create_transaction(tx.clone()).await.unwrap();

        let updated = store
            .record_initiation(&tx.transaction_id, None, Some("provider unreachable".into()))
            .await
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::Pending);
        assert_eq!(updated.error_message.as_deref(), Some("provider unreachable"));
    }

    #[tokio::test]
    async fn test_increment_unknown_project_fails() {
        let store = InMemoryPaymentStore::new();
        assert!(store.increment_project_amount(99, dec!(10)).await.is_err());
    }

    #[tokio::test]
    async fn test_contribution_is_created_once() {
        let store = InMemoryPaymentStore::new();
        let contribution = Contribution::for_transaction(&mtn_tx(6));
        assert!(store.create_contribution_if_absent(contribution.clone()).await.unwrap());
        assert!(!store.create_contribution_if_absent(contribution).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_created_before_filters_age_and_status() {
        let store = InMemoryPaymentStore::new();
        let mut old = mtn_tx(6);
        old.created_at = Utc::now() - Duration::hours(48);
        let mut old_done = mtn_tx(6);
        old_done.created_at = Utc::now() - Duration::hours(48);
        old_done.status = TransactionStatus::Failed;
        let fresh = mtn_tx(6);
        for tx in [old.clone(), old_done, fresh] {
            store.create_transaction(tx).await.unwrap();
        }

        let cutoff = Utc::now() - Duration::hours(24);
        let pending = store.pending_created_before(cutoff).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction_id, old.transaction_id);
    }

    #[tokio::test]
    async fn test_notification_sink_records() {
        let sink = InMemoryNotificationSink::new();
        sink.emit(Notification::new(1, NotificationKind::ContributionSuccess, "ok", Some(6)))
            .await
            .unwrap();
        assert_eq!(sink.sent().await.len(), 1);
    }
}

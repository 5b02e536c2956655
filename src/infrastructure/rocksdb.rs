use super::apply_status_update;
use crate::domain::money::Amount;
use crate::domain::ports::{PaymentStore, StatusChange, StatusUpdate};
use crate::domain::project::Project;
use crate::domain::transaction::{Contribution, PaymentTransaction, TransactionStatus};
use crate::error::{PaymentError, Result};
use ::rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Column Family for payment transactions, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for contributions, keyed by the originating transaction id.
pub const CF_CONTRIBUTIONS: &str = "contributions";
/// Column Family for projects, keyed by big-endian project id.
pub const CF_PROJECTS: &str = "projects";

/// A persistent store implementation using RocksDB.
///
/// Read-modify-write operations are serialized by a commit lock and land in a
/// single `WriteBatch`, so a status transition, its contribution and the
/// project increment are persisted atomically.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit: Arc<Mutex<()>>,
}

fn missing_cf(name: &str) -> PaymentError {
    PaymentError::InternalError(Box::new(std::io::Error::other(format!(
        "{name} column family not found"
    ))))
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_TRANSACTIONS, CF_CONTRIBUTIONS, CF_PROJECTS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| missing_cf(name))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan_transactions(
        &self,
        keep: impl Fn(&PaymentTransaction) -> bool,
    ) -> Result<Vec<PaymentTransaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut matching = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: PaymentTransaction = serde_json::from_slice(&value)?;
            if keep(&tx) {
                matching.push(tx);
            }
        }
        matching.sort_by_key(|tx| tx.created_at);
        Ok(matching)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create_transaction(&self, tx: PaymentTransaction) -> Result<()> {
        let _guard = self.commit.lock().await;
        let key = tx.transaction_id.as_bytes();
        if self
            .read::<PaymentTransaction>(CF_TRANSACTIONS, key)?
            .is_some()
        {
            return Err(PaymentError::ValidationError(format!(
                "Transaction {} already exists",
                tx.transaction_id
            )));
        }
        self.write(CF_TRANSACTIONS, key, &tx)
    }

    async fn find_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        self.read(CF_TRANSACTIONS, transaction_id.as_bytes())
    }

    async fn record_initiation(
        &self,
        transaction_id: &str,
        provider_reference: Option<String>,
        error_message: Option<String>,
    ) -> Result<PaymentTransaction> {
        let _guard = self.commit.lock().await;
        let mut tx: PaymentTransaction = self
            .read(CF_TRANSACTIONS, transaction_id.as_bytes())?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;
        if provider_reference.is_some() {
            tx.provider_reference = provider_reference;
        }
        if error_message.is_some() && tx.status == TransactionStatus::Pending {
            tx.error_message = error_message;
        }
        tx.updated_at = Utc::now();
        self.write(CF_TRANSACTIONS, transaction_id.as_bytes(), &tx)?;
        Ok(tx)
    }

    async fn update_status_if(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<StatusChange> {
        let _guard = self.commit.lock().await;
        let key = transaction_id.as_bytes();
        let mut tx: PaymentTransaction = self
            .read(CF_TRANSACTIONS, key)?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;
        if tx.status != expected {
            return Ok(StatusChange::Unchanged(tx));
        }
        apply_status_update(&mut tx, update);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_TRANSACTIONS)?, key, serde_json::to_vec(&tx)?);

        let mut contribution = None;
        if tx.status == TransactionStatus::Completed
            && self.read::<Contribution>(CF_CONTRIBUTIONS, key)?.is_none()
        {
            let created = Contribution::for_transaction(&tx);
            batch.put_cf(self.cf(CF_CONTRIBUTIONS)?, key, serde_json::to_vec(&created)?);

            let project_key = tx.project_id.to_be_bytes();
            match self.read::<Project>(CF_PROJECTS, &project_key)? {
                Some(mut project) => {
                    project.credit(Amount::new(tx.amount)?);
                    batch.put_cf(self.cf(CF_PROJECTS)?, project_key, serde_json::to_vec(&project)?);
                }
                None => warn!(
                    transaction_id,
                    project_id = tx.project_id,
                    "Contribution recorded for unknown project; balance not incremented"
                ),
            }
            contribution = Some(created);
        }

        self.db.write(batch)?;
        Ok(StatusChange::Applied {
            transaction: tx,
            contribution,
        })
    }

    async fn create_contribution_if_absent(&self, contribution: Contribution) -> Result<bool> {
        let _guard = self.commit.lock().await;
        let key = contribution.transaction_id.as_bytes();
        if self.read::<Contribution>(CF_CONTRIBUTIONS, key)?.is_some() {
            return Ok(false);
        }
        self.write(CF_CONTRIBUTIONS, key, &contribution)?;
        Ok(true)
    }

    async fn find_contribution(&self, transaction_id: &str) -> Result<Option<Contribution>> {
        self.read(CF_CONTRIBUTIONS, transaction_id.as_bytes())
    }

    async fn increment_project_amount(&self, project_id: u64, amount: Decimal) -> Result<()> {
        let _guard = self.commit.lock().await;
        let key = project_id.to_be_bytes();
        let mut project: Project = self
            .read(CF_PROJECTS, &key)?
            .ok_or_else(|| PaymentError::ValidationError(format!("Unknown project {project_id}")))?;
        project.credit(Amount::new(amount)?);
        self.write(CF_PROJECTS, &key, &project)
    }

    async fn find_project(&self, project_id: u64) -> Result<Option<Project>> {
        self.read(CF_PROJECTS, &project_id.to_be_bytes())
    }

    async fn store_project(&self, project: Project) -> Result<()> {
        let _guard = self.commit.lock().await;
        self.write(CF_PROJECTS, &project.id.to_be_bytes(), &project)
    }

    async fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>> {
        self.scan_transactions(|tx| {
            tx.status == TransactionStatus::Pending && tx.created_at < cutoff
        })
    }

    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>> {
        self.scan_transactions(|tx| tx.created_at >= from && tx.created_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::provider::ProviderId;
    use crate::domain::transaction::NewTransaction;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn stripe_tx() -> PaymentTransaction {
        PaymentTransaction::pending(NewTransaction {
            user_id: 3,
            project_id: 4,
            amount: dec!(7.62),
            currency: "EUR".to_string(),
            provider: ProviderId::Stripe,
            phone_number: None,
        })
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_TRANSACTIONS).is_some());
        assert!(store.db.cf_handle(CF_CONTRIBUTIONS).is_some());
        assert!(store.db.cf_handle(CF_PROJECTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_completion_is_atomic_and_idempotent() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        store
            .store_project(Project::new(4, "Court métrage", 8, dec!(1000)))
            .await
            .unwrap();
        let tx = stripe_tx();
        store.create_transaction(tx.clone()).await.unwrap();

        let update = StatusUpdate {
            status: TransactionStatus::Completed,
            error_message: None,
            raw_callback: None,
        };
        let first = store
            .update_status_if(&tx.transaction_id, TransactionStatus::Pending, update.clone())
            .await
            .unwrap();
        assert!(matches!(
            first,
            StatusChange::Applied { contribution: Some(_), .. }
        ));
        let second = store
            .update_status_if(&tx.transaction_id, TransactionStatus::Pending, update)
            .await
            .unwrap();
        assert!(matches!(second, StatusChange::Unchanged(_)));

        let project = store.find_project(4).await.unwrap().unwrap();
        assert_eq!(project.current_amount, Balance::new(dec!(7.62)));
        assert!(store.find_contribution(&tx.transaction_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_state() {
        let dir = tempdir().unwrap();
        let tx = stripe_tx();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.create_transaction(tx.clone()).await.unwrap();
            store
                .record_initiation(&tx.transaction_id, Some("cs_1".into()), None)
                .await
                .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let reloaded = store.find_transaction(&tx.transaction_id).await.unwrap().unwrap();
        assert_eq!(reloaded.provider_reference.as_deref(), Some("cs_1"));
        assert_eq!(
            store.transactions_between(tx.created_at, tx.created_at).await.unwrap().len(),
            1
        );
    }
}

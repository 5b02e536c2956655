#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use crowdpay::application::engine::{Payer, PaymentRequest, ReconciliationEngine};
use crowdpay::config::{ProviderConfig, Settings};
use crowdpay::domain::ports::{PaymentProvider, PaymentStore};
use crowdpay::domain::project::Project;
use crowdpay::domain::provider::{
    InitiateRequest, Initiation, ProviderError, ProviderId, ProviderStatus,
};
use crowdpay::domain::transaction::{NewTransaction, PaymentTransaction};
use crowdpay::infrastructure::in_memory::{InMemoryNotificationSink, InMemoryPaymentStore};
use crowdpay::providers::ProviderRegistry;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Provider double whose answers the test controls.
pub struct ScriptedProvider {
    id: ProviderId,
    status: Mutex<ProviderStatus>,
    failing: Mutex<HashSet<String>>,
    pub status_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: ProviderId) -> Arc<Self> {
        Arc::new(Self {
            id,
            status: Mutex::new(ProviderStatus::Pending),
            failing: Mutex::new(HashSet::new()),
            status_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        })
    }

    /// Status returned by every later poll.
    pub fn answer(&self, status: ProviderStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Polls for this transaction fail as if the provider were down.
    pub fn fail_for(&self, transaction_id: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(transaction_id.to_string());
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<Initiation, ProviderError> {
        Ok(Initiation {
            provider_reference: Some(format!("{}-{}", self.id, request.transaction_id)),
            accepted_pending: true,
            redirect_url: (!self.id.is_mobile_money())
                .then(|| format!("https://checkout.test/{}", request.transaction_id)),
        })
    }

    async fn check_status(&self, tx: &PaymentTransaction) -> Result<ProviderStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&tx.transaction_id) {
            return Err(ProviderError::Unreachable("connection refused".to_string()));
        }
        Ok(*self.status.lock().unwrap())
    }

    async fn cancel(&self, _tx: &PaymentTransaction) -> Result<bool, ProviderError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

pub struct Harness {
    pub engine: ReconciliationEngine,
    pub store: InMemoryPaymentStore,
    pub sink: InMemoryNotificationSink,
    pub providers: Vec<Arc<ScriptedProvider>>,
}

impl Harness {
    pub fn provider(&self, id: ProviderId) -> &Arc<ScriptedProvider> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .expect("provider registered in harness")
    }
}

pub const PROJECT_ID: u64 = 6;
pub const PROJECT_OWNER: u64 = 42;

/// Engine over in-memory stores with project 6 (target 100000) and one
/// scripted adapter per provider given.
pub async fn harness(ids: &[ProviderId]) -> Harness {
    let store = InMemoryPaymentStore::new();
    store
        .store_project(Project::new(
            PROJECT_ID,
            "Chemins croisés",
            PROJECT_OWNER,
            dec!(100000),
        ))
        .await
        .unwrap();
    let sink = InMemoryNotificationSink::new();
    let settings = Settings::default();

    let mut registry = ProviderRegistry::new();
    let mut providers = Vec::new();
    for id in ids {
        let provider = ScriptedProvider::new(*id);
        let config = settings
            .providers
            .get(id)
            .cloned()
            .unwrap_or_else(ProviderConfig::default);
        registry.register(provider.clone(), config);
        providers.push(provider);
    }

    let engine = ReconciliationEngine::new(
        Arc::new(store.clone()),
        Arc::new(sink.clone()),
        registry,
        settings.engine,
    );
    Harness {
        engine,
        store,
        sink,
        providers,
    }
}

pub fn mtn_request(amount: Decimal) -> PaymentRequest {
    PaymentRequest {
        provider: ProviderId::Mtn,
        payer: Payer::Phone("+228 90 12 34 56".to_string()),
        amount,
        project_id: PROJECT_ID,
        user_id: 1,
        description: None,
        currency: None,
    }
}

/// A pending MTN transaction created `age_hours` ago, stored directly.
pub async fn seed_pending(store: &InMemoryPaymentStore, age_hours: i64) -> PaymentTransaction {
    let mut tx = PaymentTransaction::pending(NewTransaction {
        user_id: 1,
        project_id: PROJECT_ID,
        amount: dec!(1000),
        currency: "XOF".to_string(),
        provider: ProviderId::Mtn,
        phone_number: Some("22890123456".to_string()),
    });
    tx.created_at = Utc::now() - Duration::hours(age_hours);
    tx.updated_at = tx.created_at;
    store.create_transaction(tx.clone()).await.unwrap();
    tx
}

use crate::application::report::{DateRange, ReportGenerator, TransactionReport};
use crate::config::EngineSettings;
use crate::domain::callback::{normalize_callback, synthesize_callback};
use crate::domain::money::Amount;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::phone;
use crate::domain::ports::{SharedNotificationSink, SharedPaymentStore, StatusChange, StatusUpdate};
use crate::domain::project::ProjectProgress;
use crate::domain::provider::{InitiateRequest, ProviderError, ProviderId, ProviderStatus};
use crate::domain::transaction::{
    Contribution, NewTransaction, PaymentTransaction, TransactionStatus,
};
use crate::error::{PaymentError, Result};
use crate::providers::ProviderRegistry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const CANCELLED_MESSAGE: &str = "cancelled by user or administrator";

/// Who pays: a phone number for mobile money, a hosted checkout otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Payer {
    Phone(String),
    Checkout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub provider: ProviderId,
    pub payer: Payer,
    pub amount: Decimal,
    pub project_id: u64,
    pub user_id: u64,
    pub description: Option<String>,
    /// Requested currency; the configured default when absent.
    pub currency: Option<String>,
}

/// A freshly opened payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiatedPayment {
    pub transaction: PaymentTransaction,
    /// Page the payer must visit to approve the payment, if any.
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionStatusReport {
    pub transaction: PaymentTransaction,
    pub contribution: Option<Contribution>,
    pub project: Option<ProjectProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationOutcome {
    pub transaction: PaymentTransaction,
    pub provider_cancelled: bool,
    /// The transaction was cancelled before this request.
    pub already_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub remained_pending: usize,
    pub cancelled: usize,
    pub errors: usize,
}

/// Owns the payment state machine.
///
/// Every path that resolves a transaction (webhook, status poll, sweep)
/// funnels into `handle_callback`, whose only write is the store's
/// conditional `pending -> terminal` update. Cloning is cheap; all
/// collaborators are shared.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: SharedPaymentStore,
    notifier: SharedNotificationSink,
    registry: Arc<ProviderRegistry>,
    settings: Arc<EngineSettings>,
    reports: ReportGenerator,
}

fn display_amount(amount: Decimal) -> Decimal {
    amount.normalize()
}

impl ReconciliationEngine {
    pub fn new(
        store: SharedPaymentStore,
        notifier: SharedNotificationSink,
        registry: ProviderRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self {
            reports: ReportGenerator::new(store.clone()),
            store,
            notifier,
            registry: Arc::new(registry),
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &SharedPaymentStore {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Opens a payment with `request.provider` and records it as `pending`.
    ///
    /// A provider failure leaves the transaction `pending` with the error
    /// recorded; the sweep resolves it later.
    pub async fn initiate_payment(&self, request: PaymentRequest) -> Result<InitiatedPayment> {
        let provider = request.provider;
        let entry = self
            .registry
            .get(provider)
            .ok_or_else(|| PaymentError::UnsupportedProvider(provider.to_string()))?;
        Amount::new(request.amount)?;

        let phone_number = if provider.is_mobile_money() {
            let raw = match &request.payer {
                Payer::Phone(raw) => raw.as_str(),
                Payer::Checkout => "",
            };
            let normalized = phone::normalize(raw, &self.settings.default_country_code);
            if !phone::is_valid_for_provider(&normalized, provider) {
                return Err(PaymentError::InvalidPayer {
                    provider: provider.to_string(),
                    phone: raw.to_string(),
                });
            }
            Some(normalized)
        } else {
            None
        };

        let requested_currency = request
            .currency
            .unwrap_or_else(|| self.settings.default_currency.clone())
            .to_ascii_uppercase();
        let (amount, currency) = if entry.config.accepts_currency(&requested_currency) {
            (request.amount, requested_currency)
        } else {
            let target = entry
                .config
                .settlement_currency
                .clone()
                .or_else(|| entry.config.supported_currencies.first().cloned())
                .ok_or_else(|| {
                    PaymentError::Config(format!("{provider} has no settlement currency"))
                })?;
            let converted =
                self.settings
                    .rates
                    .convert(request.amount, &requested_currency, &target)?;
            debug!(
                %provider,
                from = %requested_currency,
                to = %target,
                %converted,
                "Converted payment amount"
            );
            (Amount::new(converted)?.value(), target)
        };

        let description = request
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Contribution to project #{}", request.project_id));

        let tx = PaymentTransaction::pending(NewTransaction {
            user_id: request.user_id,
            project_id: request.project_id,
            amount,
            currency: currency.clone(),
            provider,
            phone_number: phone_number.clone(),
        });
        let transaction_id = tx.transaction_id.clone();
        self.store.create_transaction(tx).await?;
        info!(%transaction_id, %provider, %amount, %currency, "Payment transaction created");

        let initiate = InitiateRequest {
            transaction_id: transaction_id.clone(),
            phone_number,
            amount,
            currency,
            description,
            project_id: request.project_id,
        };
        let outcome = match timeout(
            self.settings.provider_timeout(),
            entry.adapter.initiate(&initiate),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unreachable("provider call timed out".to_string())),
        };

        match outcome {
            Ok(initiation) => {
                let transaction = self
                    .store
                    .record_initiation(&transaction_id, initiation.provider_reference, None)
                    .await?;
                if !initiation.accepted_pending {
                    warn!(%transaction_id, %provider, "Provider did not acknowledge the request as pending");
                }
                Ok(InitiatedPayment {
                    transaction,
                    redirect_url: initiation.redirect_url,
                })
            }
            Err(err) => {
                let message = err.to_string();
                warn!(%transaction_id, %provider, error = %message, "Payment initiation failed; transaction left pending");
                self.store
                    .record_initiation(&transaction_id, None, Some(message.clone()))
                    .await?;
                Err(match err {
                    ProviderError::Rejected { .. } => PaymentError::ProviderRejected {
                        provider: provider.to_string(),
                        transaction_id,
                        message,
                    },
                    _ => PaymentError::ProviderUnreachable {
                        provider: provider.to_string(),
                        transaction_id,
                        message,
                    },
                })
            }
        }
    }

    /// Applies a provider notification. Safe to call any number of times.
    pub async fn handle_callback(
        &self,
        provider: ProviderId,
        payload: &Value,
    ) -> Result<PaymentTransaction> {
        let event = normalize_callback(provider, payload)?;
        let transaction_id = event.transaction_id.as_str();

        let Some(tx) = self.store.find_transaction(transaction_id).await? else {
            warn!(transaction_id, %provider, "Callback for unknown transaction");
            return Err(PaymentError::TransactionNotFound(event.transaction_id));
        };
        if tx.provider != provider {
            return Err(PaymentError::InvalidCallback {
                provider: provider.to_string(),
                reason: format!(
                    "transaction {transaction_id} belongs to {}",
                    tx.provider
                ),
            });
        }
        if tx.status.is_terminal() {
            if tx.status == TransactionStatus::Cancelled {
                warn!(transaction_id, %provider, outcome = ?event.outcome, "Callback for cancelled transaction discarded");
            } else {
                debug!(transaction_id, status = %tx.status, "Duplicate callback ignored");
            }
            return Ok(tx);
        }
        let Some(status) = event.outcome.terminal_status() else {
            debug!(transaction_id, "Callback reports payment still pending");
            return Ok(tx);
        };

        let error_message = (status == TransactionStatus::Failed).then(|| {
            event
                .reason
                .clone()
                .unwrap_or_else(|| "Payment failed".to_string())
        });
        let update = StatusUpdate {
            status,
            error_message,
            raw_callback: Some(payload.clone()),
        };
        match self
            .store
            .update_status_if(transaction_id, TransactionStatus::Pending, update)
            .await?
        {
            StatusChange::Applied {
                transaction,
                contribution,
            } => {
                info!(transaction_id, %provider, status = %transaction.status, "Transaction resolved");
                self.notify_resolution(&transaction, contribution.as_ref()).await;
                Ok(transaction)
            }
            StatusChange::Unchanged(current) => {
                debug!(transaction_id, status = %current.status, "Transaction resolved concurrently");
                Ok(current)
            }
        }
    }

    /// Handles a payer returning from a hosted checkout page.
    ///
    /// The return URL is visible to the payer, so its `status` is never
    /// applied. Only the transaction reference is read from it and the
    /// outcome is taken from a provider poll.
    pub async fn confirm_checkout_return(
        &self,
        provider: ProviderId,
        payload: &Value,
    ) -> Result<PaymentTransaction> {
        let event = normalize_callback(provider, payload)?;
        let tx = self
            .store
            .find_transaction(&event.transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(event.transaction_id.clone()))?;
        if tx.provider != provider {
            return Err(PaymentError::InvalidCallback {
                provider: provider.to_string(),
                reason: format!(
                    "transaction {} belongs to {}",
                    tx.transaction_id, tx.provider
                ),
            });
        }
        debug!(transaction_id = %tx.transaction_id, %provider, claimed = ?event.outcome, "Checkout return; polling provider");
        Ok(self.check_status(&tx.transaction_id).await?.transaction)
    }

    /// Returns the current state, polling the provider while still pending.
    pub async fn check_status(&self, transaction_id: &str) -> Result<TransactionStatusReport> {
        let mut tx = self
            .store
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;

        if tx.status == TransactionStatus::Pending {
            tx = self.poll_provider(tx).await?;
        }

        let contribution = if tx.status == TransactionStatus::Completed {
            self.store.find_contribution(transaction_id).await?
        } else {
            None
        };
        let project = self
            .store
            .find_project(tx.project_id)
            .await?
            .map(|project| project.progress());

        Ok(TransactionStatusReport {
            transaction: tx,
            contribution,
            project,
        })
    }

    async fn poll_provider(&self, tx: PaymentTransaction) -> Result<PaymentTransaction> {
        let provider = tx.provider;
        let Some(entry) = self.registry.get(provider) else {
            warn!(transaction_id = %tx.transaction_id, %provider, "No adapter registered; keeping local status");
            return Ok(tx);
        };
        let polled = timeout(self.settings.provider_timeout(), entry.adapter.check_status(&tx)).await;
        match polled {
            Ok(Ok(ProviderStatus::Pending)) => Ok(tx),
            Ok(Ok(outcome)) => {
                let payload = synthesize_callback(provider, &tx.transaction_id, outcome);
                self.handle_callback(provider, &payload).await
            }
            Ok(Err(err)) => {
                warn!(transaction_id = %tx.transaction_id, %provider, error = %err, "Status check failed; keeping local status");
                Ok(tx)
            }
            Err(_) => {
                warn!(transaction_id = %tx.transaction_id, %provider, "Status check timed out; keeping local status");
                Ok(tx)
            }
        }
    }

    /// Cancels a pending transaction locally and, best effort, at the provider.
    pub async fn cancel_transaction(&self, transaction_id: &str) -> Result<CancellationOutcome> {
        let tx = self
            .store
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;
        match tx.status {
            TransactionStatus::Completed => {
                return Err(PaymentError::AlreadyCompleted(transaction_id.to_string()));
            }
            TransactionStatus::Cancelled => {
                return Ok(CancellationOutcome {
                    transaction: tx,
                    provider_cancelled: false,
                    already_cancelled: true,
                });
            }
            TransactionStatus::Failed => {
                return Err(PaymentError::TransactionFinalized {
                    transaction_id: transaction_id.to_string(),
                    status: tx.status,
                });
            }
            TransactionStatus::Pending => {}
        }

        let provider_cancelled = self.cancel_at_provider(&tx).await;
        let update = StatusUpdate {
            status: TransactionStatus::Cancelled,
            error_message: Some(CANCELLED_MESSAGE.to_string()),
            raw_callback: None,
        };
        match self
            .store
            .update_status_if(transaction_id, TransactionStatus::Pending, update)
            .await?
        {
            StatusChange::Applied { transaction, .. } => {
                info!(transaction_id, provider = %transaction.provider, provider_cancelled, "Transaction cancelled");
                self.emit(Notification::new(
                    transaction.user_id,
                    NotificationKind::TransactionCancelled,
                    format!(
                        "Your transaction of {} {} was cancelled.",
                        display_amount(transaction.amount),
                        transaction.currency
                    ),
                    Some(transaction.project_id),
                ))
                .await;
                Ok(CancellationOutcome {
                    transaction,
                    provider_cancelled,
                    already_cancelled: false,
                })
            }
            StatusChange::Unchanged(current) => match current.status {
                TransactionStatus::Completed => {
                    Err(PaymentError::AlreadyCompleted(transaction_id.to_string()))
                }
                TransactionStatus::Cancelled => Ok(CancellationOutcome {
                    transaction: current,
                    provider_cancelled,
                    already_cancelled: true,
                }),
                status => Err(PaymentError::TransactionFinalized {
                    transaction_id: transaction_id.to_string(),
                    status,
                }),
            },
        }
    }

    async fn cancel_at_provider(&self, tx: &PaymentTransaction) -> bool {
        let provider = tx.provider;
        let Some(entry) = self.registry.get(provider) else {
            warn!(transaction_id = %tx.transaction_id, %provider, "No adapter registered; cancelling locally only");
            return false;
        };
        match timeout(self.settings.provider_timeout(), entry.adapter.cancel(tx)).await {
            Ok(Ok(cancelled)) => cancelled,
            Ok(Err(err)) => {
                warn!(transaction_id = %tx.transaction_id, %provider, error = %err, "Provider cancellation failed");
                false
            }
            Err(_) => {
                warn!(transaction_id = %tx.transaction_id, %provider, "Provider cancellation timed out");
                false
            }
        }
    }

    /// Polls every transaction still pending after `older_than`.
    ///
    /// Items run in their own tasks, bounded by the configured concurrency
    /// and per-item timeout. Item failures only increment `errors`.
    pub async fn reconcile_pending(&self, older_than: Duration) -> Result<SweepReport> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| PaymentError::ValidationError(format!("Invalid sweep age: {e}")))?;
        let cutoff: DateTime<Utc> = Utc::now() - older_than;
        let pending = self.store.pending_created_before(cutoff).await?;
        info!(count = pending.len(), %cutoff, "Reconciling pending transactions");

        let semaphore = Arc::new(Semaphore::new(self.settings.sweep_concurrency.max(1)));
        let item_timeout = self.settings.sweep_item_timeout();
        let mut tasks = JoinSet::new();
        for tx in &pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
            let engine = self.clone();
            let transaction_id = tx.transaction_id.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = timeout(item_timeout, engine.check_status(&transaction_id)).await;
                (transaction_id, result)
            });
        }

        let mut report = SweepReport {
            processed: pending.len(),
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(status)))) => match status.transaction.status {
                    TransactionStatus::Completed => report.completed += 1,
                    TransactionStatus::Failed => report.failed += 1,
                    TransactionStatus::Pending => report.remained_pending += 1,
                    TransactionStatus::Cancelled => report.cancelled += 1,
                },
                Ok((transaction_id, Ok(Err(err)))) => {
                    warn!(%transaction_id, error = %err, "Reconciliation failed for transaction");
                    report.errors += 1;
                }
                Ok((transaction_id, Err(_))) => {
                    warn!(%transaction_id, "Reconciliation timed out for transaction");
                    report.errors += 1;
                }
                Err(err) => {
                    error!(error = %err, "Reconciliation task aborted");
                    report.errors += 1;
                }
            }
        }

        info!(?report, "Reconciliation sweep finished");
        Ok(report)
    }

    pub async fn generate_report(
        &self,
        period: DateRange,
        status: Option<TransactionStatus>,
    ) -> Result<TransactionReport> {
        self.reports.generate(period, status).await
    }

    async fn notify_resolution(&self, tx: &PaymentTransaction, contribution: Option<&Contribution>) {
        let amount = display_amount(tx.amount);
        match tx.status {
            TransactionStatus::Completed => {
                if contribution.is_none() {
                    return;
                }
                let project = match self.store.find_project(tx.project_id).await {
                    Ok(project) => project,
                    Err(err) => {
                        warn!(transaction_id = %tx.transaction_id, error = %err, "Project lookup failed");
                        None
                    }
                };
                let title = project
                    .as_ref()
                    .map(|p| p.title.clone())
                    .unwrap_or_else(|| format!("Project #{}", tx.project_id));
                self.emit(Notification::new(
                    tx.user_id,
                    NotificationKind::ContributionSuccess,
                    format!(
                        "Your contribution of {amount} {} to project \"{title}\" was received successfully via {}.",
                        tx.currency,
                        tx.provider.display_name()
                    ),
                    Some(tx.project_id),
                ))
                .await;
                if let Some(project) = project {
                    self.emit(Notification::new(
                        project.owner_id,
                        NotificationKind::NewContribution,
                        format!(
                            "A new contribution of {amount} {} was received for your project \"{title}\".",
                            tx.currency
                        ),
                        Some(tx.project_id),
                    ))
                    .await;
                }
            }
            TransactionStatus::Failed => {
                let reason = tx.error_message.as_deref().unwrap_or("Unknown error");
                self.emit(Notification::new(
                    tx.user_id,
                    NotificationKind::ContributionFailed,
                    format!(
                        "Your {} payment of {amount} {} could not be processed. Reason: {reason}",
                        tx.provider.display_name(),
                        tx.currency
                    ),
                    Some(tx.project_id),
                ))
                .await;
            }
            TransactionStatus::Pending | TransactionStatus::Cancelled => {}
        }
    }

    async fn emit(&self, notification: Notification) {
        let user_id = notification.user_id;
        let kind = notification.kind;
        if let Err(err) = self.notifier.emit(notification).await {
            warn!(user_id, ?kind, error = %err, "Notification delivery failed");
        }
    }
}

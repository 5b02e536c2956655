//! Transaction reporting over a date window.

use crate::domain::ports::SharedPaymentStore;
use crate::domain::provider::ProviderId;
use crate::domain::transaction::{PaymentTransaction, TransactionStatus};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Inclusive `[from, to]` window on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(PaymentError::ValidationError(format!(
                "Report window starts after it ends ({from} > {to})"
            )));
        }
        Ok(Self { from, to })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_transactions: usize,
    /// Raw sum across currencies; see `amount_by_currency` for a clean split.
    pub total_amount: Decimal,
    pub successful_transactions: usize,
    /// Percentage of completed transactions, two decimals.
    pub success_rate: Decimal,
    pub amount_by_currency: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Breakdown {
    pub count: usize,
    pub amount: Decimal,
    pub successful: usize,
}

impl Breakdown {
    fn add(&mut self, tx: &PaymentTransaction) {
        self.count += 1;
        self.amount += tx.amount;
        if tx.status == TransactionStatus::Completed {
            self.successful += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectBreakdown {
    pub project_id: u64,
    pub project_title: String,
    #[serde(flatten)]
    pub totals: Breakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionReport {
    pub period: DateRange,
    pub status_filter: Option<TransactionStatus>,
    pub summary: ReportSummary,
    pub by_provider: BTreeMap<ProviderId, Breakdown>,
    pub by_project: Vec<ProjectBreakdown>,
}

/// Builds `TransactionReport`s from the payment store.
#[derive(Clone)]
pub struct ReportGenerator {
    store: SharedPaymentStore,
}

impl ReportGenerator {
    pub fn new(store: SharedPaymentStore) -> Self {
        Self { store }
    }

    pub async fn generate(
        &self,
        period: DateRange,
        status: Option<TransactionStatus>,
    ) -> Result<TransactionReport> {
        let transactions: Vec<PaymentTransaction> = self
            .store
            .transactions_between(period.from, period.to)
            .await
            .map_err(|e| PaymentError::ReportingError(e.to_string()))?
            .into_iter()
            .filter(|tx| status.is_none_or(|wanted| tx.status == wanted))
            .collect();

        let mut by_provider: BTreeMap<ProviderId, Breakdown> = BTreeMap::new();
        let mut by_project: BTreeMap<u64, Breakdown> = BTreeMap::new();
        let mut amount_by_currency: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut total_amount = Decimal::ZERO;
        let mut successful_transactions = 0;

        for tx in &transactions {
            total_amount += tx.amount;
            *amount_by_currency.entry(tx.currency.clone()).or_default() += tx.amount;
            if tx.status == TransactionStatus::Completed {
                successful_transactions += 1;
            }
            by_provider.entry(tx.provider).or_default().add(tx);
            by_project.entry(tx.project_id).or_default().add(tx);
        }

        let success_rate = if transactions.is_empty() {
            Decimal::ZERO
        } else {
            (Decimal::from(successful_transactions) / Decimal::from(transactions.len())
                * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        let mut projects = Vec::with_capacity(by_project.len());
        for (project_id, totals) in by_project {
            let project_title = self
                .store
                .find_project(project_id)
                .await
                .map_err(|e| PaymentError::ReportingError(e.to_string()))?
                .map(|project| project.title)
                .unwrap_or_else(|| format!("Project #{project_id}"));
            projects.push(ProjectBreakdown {
                project_id,
                project_title,
                totals,
            });
        }

        Ok(TransactionReport {
            period,
            status_filter: status,
            summary: ReportSummary {
                total_transactions: transactions.len(),
                total_amount,
                successful_transactions,
                success_rate,
                amount_by_currency,
            },
            by_provider,
            by_project: projects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::PaymentStore;
    use crate::domain::project::Project;
    use crate::domain::transaction::NewTransaction;
    use crate::infrastructure::in_memory::InMemoryPaymentStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn tx(provider: ProviderId, project_id: u64, amount: Decimal, status: TransactionStatus) -> PaymentTransaction {
        let currency = if provider == ProviderId::Stripe { "EUR" } else { "XOF" };
        let mut tx = PaymentTransaction::pending(NewTransaction {
            user_id: 1,
            project_id,
            amount,
            currency: currency.to_string(),
            provider,
            phone_number: None,
        });
        tx.status = status;
        tx
    }

    async fn seeded() -> (ReportGenerator, DateRange) {
        let store = InMemoryPaymentStore::new();
        store
            .store_project(Project::new(6, "Chemins croisés", 42, dec!(100000)))
            .await
            .unwrap();
        for tx in [
            tx(ProviderId::Mtn, 6, dec!(5000), TransactionStatus::Completed),
            tx(ProviderId::Mtn, 6, dec!(2000), TransactionStatus::Failed),
            tx(ProviderId::Moov, 7, dec!(1000), TransactionStatus::Completed),
            tx(ProviderId::Stripe, 7, dec!(7.62), TransactionStatus::Pending),
        ] {
            store.create_transaction(tx).await.unwrap();
        }
        let now = Utc::now();
        let range = DateRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        (ReportGenerator::new(Arc::new(store)), range)
    }

    #[tokio::test]
    async fn test_report_summary_and_breakdowns() {
        let (generator, range) = seeded().await;
        let report = generator.generate(range, None).await.unwrap();

        assert_eq!(report.summary.total_transactions, 4);
        assert_eq!(report.summary.successful_transactions, 2);
        assert_eq!(report.summary.success_rate, dec!(50.00));
        assert_eq!(report.summary.amount_by_currency["XOF"], dec!(8000));
        assert_eq!(report.summary.amount_by_currency["EUR"], dec!(7.62));

        let mtn = &report.by_provider[&ProviderId::Mtn];
        assert_eq!((mtn.count, mtn.amount, mtn.successful), (2, dec!(7000), 1));

        assert_eq!(report.by_project.len(), 2);
        assert_eq!(report.by_project[0].project_title, "Chemins croisés");
        assert_eq!(report.by_project[1].project_title, "Project #7");
    }

    #[tokio::test]
    async fn test_report_status_filter() {
        let (generator, range) = seeded().await;
        let report = generator
            .generate(range, Some(TransactionStatus::Completed))
            .await
            .unwrap();
        assert_eq!(report.summary.total_transactions, 2);
        assert_eq!(report.summary.success_rate, dec!(100.00));
    }

    #[tokio::test]
    async fn test_empty_window() {
        let (generator, _) = seeded().await;
        let past = Utc::now() - Duration::days(30);
        let range = DateRange::new(past, past + Duration::days(1)).unwrap();
        let report = generator.generate(range, None).await.unwrap();
        assert_eq!(report.summary.total_transactions, 0);
        assert_eq!(report.summary.success_rate, Decimal::ZERO);
        assert!(report.by_project.is_empty());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let now = Utc::now();
        assert!(DateRange::new(now, now - Duration::seconds(1)).is_err());
    }
}

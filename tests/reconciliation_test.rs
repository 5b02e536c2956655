mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{PROJECT_ID, harness, mtn_request, seed_pending};
use crowdpay::application::report::DateRange;
use crowdpay::domain::notification::NotificationKind;
use crowdpay::domain::ports::PaymentStore;
use crowdpay::domain::provider::{ProviderId, ProviderStatus};
use crowdpay::domain::transaction::TransactionStatus;
use crowdpay::error::PaymentError;
use crowdpay::interfaces::csv::ReportWriter;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_sweep_only_touches_old_pending_and_isolates_failures() {
    let h = harness(&[ProviderId::Mtn]).await;
    for _ in 0..7 {
        seed_pending(&h.store, 1).await;
    }
    let old = vec![
        seed_pending(&h.store, 30).await,
        seed_pending(&h.store, 48).await,
        seed_pending(&h.store, 72).await,
    ];
    let mtn = h.provider(ProviderId::Mtn);
    mtn.answer(ProviderStatus::Completed);
    mtn.fail_for(&old[1].transaction_id);

    let report = h
        .engine
        .reconcile_pending(Duration::from_secs(24 * 3600))
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.remained_pending, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(mtn.status_calls.load(Ordering::SeqCst), 3);

    let failed_poll = h
        .store
        .find_transaction(&old[1].transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed_poll.status, TransactionStatus::Pending);
    let project = h.store.find_project(PROJECT_ID).await.unwrap().unwrap();
    assert_eq!(project.current_amount.value(), dec!(2000));
}

#[tokio::test]
async fn test_sweep_with_nothing_to_do() {
    let h = harness(&[ProviderId::Mtn]).await;
    seed_pending(&h.store, 1).await;
    let report = h
        .engine
        .reconcile_pending(Duration::from_secs(24 * 3600))
        .await
        .unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn test_cancel_pending_transaction() {
    let h = harness(&[ProviderId::Mtn]).await;
    let tx = h
        .engine
        .initiate_payment(mtn_request(dec!(3000)))
        .await
        .unwrap()
        .transaction;

    let outcome = h.engine.cancel_transaction(&tx.transaction_id).await.unwrap();
    assert_eq!(outcome.transaction.status, TransactionStatus::Cancelled);
    assert!(outcome.provider_cancelled);
    assert!(!outcome.already_cancelled);

    let again = h.engine.cancel_transaction(&tx.transaction_id).await.unwrap();
    assert!(again.already_cancelled);
    assert_eq!(
        h.provider(ProviderId::Mtn).cancel_calls.load(Ordering::SeqCst),
        1
    );

    // A late success is discarded.
    let late = h
        .engine
        .handle_callback(
            ProviderId::Mtn,
            &json!({"externalId": tx.transaction_id, "status": "SUCCESSFUL"}),
        )
        .await
        .unwrap();
    assert_eq!(late.status, TransactionStatus::Cancelled);
    assert!(
        h.store
            .find_contribution(&tx.transaction_id)
            .await
            .unwrap()
            .is_none()
    );

    let sent = h.sink.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::TransactionCancelled);
}

#[tokio::test]
async fn test_cancel_completed_transaction_fails() {
    let h = harness(&[ProviderId::Mtn]).await;
    let tx = h
        .engine
        .initiate_payment(mtn_request(dec!(3000)))
        .await
        .unwrap()
        .transaction;
    h.engine
        .handle_callback(
            ProviderId::Mtn,
            &json!({"externalId": tx.transaction_id, "status": "SUCCESSFUL"}),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .cancel_transaction(&tx.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyCompleted(_)));
}

#[tokio::test]
async fn test_cancel_unknown_transaction() {
    let h = harness(&[ProviderId::Mtn]).await;
    let err = h.engine.cancel_transaction("MM-1-00000000").await.unwrap_err();
    assert!(matches!(err, PaymentError::TransactionNotFound(_)));
}

#[tokio::test]
async fn test_report_over_mixed_outcomes() {
    let h = harness(&[ProviderId::Mtn]).await;
    let mut ids = Vec::new();
    for amount in [dec!(1000), dec!(2000), dec!(3000), dec!(4000)] {
        let tx = h
            .engine
            .initiate_payment(mtn_request(amount))
            .await
            .unwrap()
            .transaction;
        ids.push(tx.transaction_id);
    }
    for id in &ids[..3] {
        h.engine
            .handle_callback(
                ProviderId::Mtn,
                &json!({"externalId": id, "status": "SUCCESSFUL"}),
            )
            .await
            .unwrap();
    }

    let period = DateRange::new(Utc::now() - ChronoDuration::hours(1), Utc::now()).unwrap();
    let report = h.engine.generate_report(period, None).await.unwrap();
    assert_eq!(report.summary.total_transactions, 4);
    assert_eq!(report.summary.total_amount, dec!(10000));
    assert_eq!(report.summary.successful_transactions, 3);
    assert_eq!(report.summary.success_rate, dec!(75.00));
    assert_eq!(report.by_provider[&ProviderId::Mtn].count, 4);
    assert_eq!(report.by_project.len(), 1);
    assert_eq!(report.by_project[0].project_title, "Chemins croisés");

    let completed = h
        .engine
        .generate_report(period, Some(TransactionStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.summary.total_amount, dec!(6000));
    assert_eq!(completed.summary.success_rate, dec!(100));

    let mut csv = Vec::new();
    ReportWriter::new(&mut csv).write_projects(&report).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.starts_with("project_id,project_title,count,amount,successful"));
    assert!(csv.contains("6,Chemins croisés,4,10000,3"));
}

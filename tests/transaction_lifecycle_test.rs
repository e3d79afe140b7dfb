mod common;

use common::{callback, deposit, money, withdrawal, TestHarness};
use payrail_core::domain::{Transaction, TransactionStatus};
use payrail_core::error::AppError;
use payrail_core::schemas::DataFormat;
use payrail_core::services::cache::transaction_key;
use serde_json::Value;

async fn start_deposit(h: &TestHarness, amount: &str) -> Transaction {
    h.service
        .handle_deposit(deposit(1, amount, "USD"), DataFormat::Json)
        .await
        .unwrap();
    h.repo.transactions().pop().unwrap()
}

#[tokio::test]
async fn test_successful_deposit_credits_once() {
    let h = TestHarness::new();
    let tx = start_deposit(&h, "100.00").await;
    assert_eq!(h.repo.balance(1), Some(money("50")));

    let outcome = h
        .service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(outcome.message, "Deposit transaction status updated successfully");
    assert_eq!(h.repo.balance(1), Some(money("150")));

    let published = h.broker.messages().len();
    let repeat = h
        .service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(repeat.message, "Transaction already finalised");
    assert_eq!(h.repo.balance(1), Some(money("150")));
    assert_eq!(h.broker.messages().len(), published);
}

#[tokio::test]
async fn test_terminal_status_is_never_overwritten() {
    let h = TestHarness::new();
    let tx = start_deposit(&h, "20.00").await;

    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "FAILED"), DataFormat::Json)
        .await
        .unwrap();
    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();

    assert_eq!(
        h.repo.transaction(tx.id).unwrap().status,
        TransactionStatus::Failed
    );
    assert_eq!(h.repo.balance(1), Some(money("50")));
}

#[tokio::test]
async fn test_callback_cannot_reset_to_pending() {
    let h = TestHarness::new();
    let tx = start_deposit(&h, "20.00").await;

    let result = h
        .service
        .handle_deposit_callback(tx.id, callback(tx.id, "pending"), DataFormat::Json)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(
        h.repo.transaction(tx.id).unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_mismatched_body_id_is_rejected() {
    let h = TestHarness::new();
    let tx = start_deposit(&h, "20.00").await;

    let result = h
        .service
        .handle_deposit_callback(tx.id, callback(tx.id + 1, "success"), DataFormat::Json)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_failed_withdrawal_is_refunded() {
    let h = TestHarness::new();
    h.service
        .handle_withdrawal(withdrawal(2, "75.50", "paypal"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(h.repo.balance(2), Some(money("124.50")));
    assert_eq!(h.paypal.withdrawal_count(), 1);

    let tx = h.repo.transactions().pop().unwrap();
    assert_eq!(tx.currency, "EUR");
    h.service
        .handle_withdrawal_callback(tx.id, callback(tx.id, "failed"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(h.repo.balance(2), Some(money("200")));

    h.service
        .handle_withdrawal_callback(tx.id, callback(tx.id, "failed"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(h.repo.balance(2), Some(money("200")));
}

#[tokio::test]
async fn test_callback_is_served_from_cache() {
    let h = TestHarness::new();
    let tx = start_deposit(&h, "10.00").await;
    assert!(h.store.contains(&transaction_key(tx.id)));

    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(h.repo.transaction_reads(), 0);
    assert!(!h.store.contains(&transaction_key(tx.id)));

    // Miss: read the system of record and repopulate.
    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(h.repo.transaction_reads(), 1);
    assert!(h.store.contains(&transaction_key(tx.id)));

    // Hit: the repository is not consulted again.
    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();
    assert_eq!(h.repo.transaction_reads(), 1);
}

#[tokio::test]
async fn test_cache_outage_falls_back_to_repository() {
    let h = TestHarness::new();
    let tx = start_deposit(&h, "10.00").await;
    h.store.set_unavailable(true);

    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();

    assert_eq!(h.repo.transaction_reads(), 1);
    assert_eq!(h.repo.balance(1), Some(money("60")));
}

#[tokio::test]
async fn test_events_are_masked_and_routed_by_format() {
    let h = TestHarness::new();
    h.service
        .handle_deposit(deposit(1, "30.00", "USD"), DataFormat::Xml)
        .await
        .unwrap();
    let tx = h.repo.transactions().pop().unwrap();
    h.service
        .handle_deposit_callback(tx.id, callback(tx.id, "success"), DataFormat::Json)
        .await
        .unwrap();

    let messages = h.broker.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].topic, "transactions.soap");
    assert_eq!(messages[1].topic, "transactions.json");
    assert!(messages.iter().all(|m| m.key == tx.id.to_string()));

    let raw = String::from_utf8_lossy(&messages[1].payload);
    assert!(!raw.contains("success"));

    let event: Value = h.masker().unmask(&messages[1].payload).unwrap();
    assert_eq!(event["id"], tx.id);
    assert_eq!(event["status"], "success");
    assert_eq!(event["type"], "deposit");
}

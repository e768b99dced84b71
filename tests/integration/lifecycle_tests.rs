//! Termination and shutdown release every waiting caller.

use std::sync::Arc;
use std::time::Duration;

use stdio_dictionary::AppError;

use super::test_helpers::{connect_ok, connect_with_stdin_capacity, PATIENCE};

#[tokio::test]
async fn stdout_close_releases_all_pending_callers() {
    let (dictionary, mut backend, _faults) = connect_ok(r#"{"longest-key":4}"#).await;
    let dictionary = Arc::new(dictionary);

    let mut calls = Vec::new();
    for stroke in ["A", "B", "C"] {
        let dictionary = Arc::clone(&dictionary);
        calls.push(tokio::spawn(async move { dictionary.translate(&[stroke]).await }));
        backend.next_request().await;
    }
    assert_eq!(dictionary.pending_count().await, 3);

    drop(backend.stdout);

    for call in calls {
        let err = call.await.expect("task").expect_err("must fail");
        assert!(matches!(err, AppError::Unavailable(ref reason) if reason.contains("stdout")));
    }
    assert!(!dictionary.is_available().await);

    let err = dictionary.translate(&["D"]).await.expect_err("must fail");
    assert!(matches!(err, AppError::Unavailable(_)));
}

#[tokio::test]
async fn shutdown_releases_waiters_and_refuses_new_requests() {
    let (dictionary, mut backend, _faults) = connect_ok(r#"{"longest-key":4}"#).await;
    let dictionary = Arc::new(dictionary);

    let call = {
        let dictionary = Arc::clone(&dictionary);
        tokio::spawn(async move { dictionary.translate(&["TEFT"]).await })
    };
    backend.next_request().await;

    dictionary.shutdown().await;

    let err = call.await.expect("task").expect_err("must fail");
    assert!(matches!(err, AppError::Unavailable(ref reason) if reason.contains("shut down")));
    assert!(matches!(
        dictionary.untranslate("x").await,
        Err(AppError::Rejected(_))
    ));
    assert!(matches!(
        dictionary.translate(&["TEFT"]).await,
        Err(AppError::Unavailable(_))
    ));

    // Stdin was closed.
    assert!(backend.requests.next_line().await.expect("read").is_none());
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let (dictionary, _backend, _faults) = connect_ok(r#"{"longest-key":4}"#).await;

    dictionary.shutdown().await;
    dictionary.shutdown().await;

    assert!(!dictionary.is_available().await);
}

#[tokio::test]
async fn configuration_is_exposed() {
    let (dictionary, _backend, _faults) =
        connect_ok(r#"{"longest-key":7,"max-latency-ms":100,"untranslate":true}"#).await;

    assert_eq!(dictionary.name(), "fake");
    assert_eq!(dictionary.longest_key(), 7);
    assert!(dictionary.configuration().untranslate);
    assert!(dictionary.is_available().await);
    assert_eq!(dictionary.pending_count().await, 0);
}

#[tokio::test]
async fn shutdown_completes_while_a_write_is_stuck() {
    let (dictionary, _backend, _faults) =
        connect_with_stdin_capacity(r#"{"longest-key":4}"#, 64).await;
    let dictionary = Arc::new(dictionary);

    let call = {
        let dictionary = Arc::clone(&dictionary);
        tokio::spawn(async move { dictionary.translate(&["S".repeat(80)]).await })
    };
    while dictionary.pending_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!call.is_finished(), "write must be stuck on the full pipe");

    tokio::time::timeout(PATIENCE, dictionary.shutdown())
        .await
        .expect("shutdown must not wait on the stuck write");

    let err = tokio::time::timeout(PATIENCE, call)
        .await
        .expect("caller released")
        .expect("task")
        .expect_err("must fail");
    assert!(matches!(err, AppError::Unavailable(_)));
    assert!(!dictionary.is_available().await);
}

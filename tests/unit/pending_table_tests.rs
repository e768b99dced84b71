//! Unit tests for the seq-keyed pending table.

use stdio_dictionary::stdio::channel::PendingTable;
use stdio_dictionary::stdio::wire::Response;
use stdio_dictionary::AppError;

fn response(seq: u64, text: &str) -> Response {
    Response {
        seq,
        translation: Some(text.to_owned()),
        reverse_translation: None,
    }
}

#[tokio::test]
async fn seqs_are_assigned_from_zero_in_order() {
    let table = PendingTable::new();

    let (first, _rx0) = table.register().await.expect("register");
    let (second, _rx1) = table.register().await.expect("register");

    assert_eq!((first, second), (0, 1));
    assert_eq!(table.len().await, 2);
}

#[tokio::test]
async fn resolve_delivers_to_matching_waiter_only() {
    let table = PendingTable::new();
    let (seq0, mut rx0) = table.register().await.expect("register");
    let (seq1, rx1) = table.register().await.expect("register");

    assert!(table.resolve(seq1, Ok(response(seq1, "second"))).await);

    let delivered = rx1.await.expect("sender kept").expect("valid reply");
    assert_eq!(delivered.translation.as_deref(), Some("second"));
    assert!(rx0.try_recv().is_err(), "seq 0 must still be waiting");
    assert_eq!(table.len().await, 1);
    assert!(table.resolve(seq0, Ok(response(seq0, "first"))).await);
}

#[tokio::test]
async fn second_resolution_of_a_seq_is_stale() {
    let table = PendingTable::new();
    let (seq, _rx) = table.register().await.expect("register");

    assert!(table.resolve(seq, Ok(response(seq, "a"))).await);
    assert!(!table.resolve(seq, Ok(response(seq, "b"))).await);
}

#[tokio::test]
async fn expired_seq_cannot_be_resolved() {
    let table = PendingTable::new();
    let (seq, _rx) = table.register().await.expect("register");

    assert!(table.expire(seq).await);
    assert!(!table.expire(seq).await);
    assert!(!table.resolve(seq, Ok(response(seq, "late"))).await);
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn unknown_seq_is_stale() {
    let table = PendingTable::new();
    assert!(!table.resolve(99, Ok(response(99, "ghost"))).await);
}

#[tokio::test]
async fn close_releases_waiters_and_refuses_new_requests() {
    let table = PendingTable::new();
    let (_, rx0) = table.register().await.expect("register");
    let (_, rx1) = table.register().await.expect("register");

    assert_eq!(table.close("dict closed its stdout").await, 2);

    assert!(rx0.await.is_err());
    assert!(rx1.await.is_err());
    assert!(matches!(
        table.register().await,
        Err(AppError::Unavailable(ref reason)) if reason == "dict closed its stdout"
    ));
}

#[tokio::test]
async fn first_close_reason_is_kept() {
    let table = PendingTable::new();
    table.close("first").await;
    table.close("second").await;

    assert_eq!(table.closed_reason().await.as_deref(), Some("first"));
}

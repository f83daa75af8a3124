//! Tests for the shutdown hook.

use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_channel_fires_when_set() {
    let (tx, rx) = watch::channel(false);
    let mut shutdown = Shutdown::channel(rx);

    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), shutdown.requested())
        .await
        .expect("shutdown should fire");
}

#[tokio::test]
async fn test_channel_does_not_fire_while_false() {
    let (_tx, rx) = watch::channel(false);
    let mut shutdown = Shutdown::channel(rx);

    let res = tokio::time::timeout(Duration::from_millis(50), shutdown.requested()).await;

    assert!(res.is_err());
}

#[tokio::test]
async fn test_dropped_sender_never_fires() {
    let (tx, rx) = watch::channel(false);
    drop(tx);
    let mut shutdown = Shutdown::channel(rx);

    let res = tokio::time::timeout(Duration::from_millis(50), shutdown.requested()).await;

    assert!(res.is_err());
}

#[tokio::test]
async fn test_never_does_not_fire() {
    let mut shutdown = Shutdown::never();

    let res = tokio::time::timeout(Duration::from_millis(20), shutdown.requested()).await;

    assert!(res.is_err());
}

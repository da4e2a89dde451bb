// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Roster;

async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> anyhow::Result<String> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("channel closed"))
}

#[tokio::test]
async fn first_and_last_membership_transitions() {
    let roster = Roster::spawn(CancellationToken::new());
    assert!(roster.join("c1", "r1", "s1").await, "first member registers the pair");
    assert!(!roster.join("c2", "r1", "s1").await);
    assert_eq!(roster.member_count("r1", "s1").await, 2);

    assert!(!roster.leave("c1", "r1", "s1").await);
    assert!(roster.leave("c2", "r1", "s1").await, "last member out empties the pair");
    assert_eq!(roster.member_count("r1", "s1").await, 0);
}

#[tokio::test]
async fn deliver_counts_and_fans_out() -> anyhow::Result<()> {
    let roster = Roster::spawn(CancellationToken::new());
    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    roster.attach("c1", tx1).await;
    roster.attach("c2", tx2).await;
    roster.join("c1", "r1", "s1").await;
    roster.join("c2", "r1", "s1").await;

    let count = roster.deliver("r1", "s1", "{\"type\":\"chat_message\"}".into(), None).await;
    assert_eq!(count, 2);
    assert_eq!(recv_frame(&mut rx1).await?, "{\"type\":\"chat_message\"}");
    assert_eq!(recv_frame(&mut rx2).await?, "{\"type\":\"chat_message\"}");
    Ok(())
}

#[tokio::test]
async fn exclude_skips_the_sender() -> anyhow::Result<()> {
    let roster = Roster::spawn(CancellationToken::new());
    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    roster.attach("c1", tx1).await;
    roster.attach("c2", tx2).await;
    roster.join("c1", "r1", "s1").await;
    roster.join("c2", "r1", "s1").await;

    let count = roster.deliver("r1", "s1", "x".into(), Some("c1".into())).await;
    assert_eq!(count, 1);
    assert_eq!(recv_frame(&mut rx2).await?, "x");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx1.try_recv().is_err(), "excluded sender receives nothing");
    Ok(())
}

#[tokio::test]
async fn deliver_to_empty_pair_is_zero() {
    let roster = Roster::spawn(CancellationToken::new());
    assert_eq!(roster.deliver("r1", "s1", "x".into(), None).await, 0);
}

#[tokio::test]
async fn stuck_client_is_unregistered_not_blocked() -> anyhow::Result<()> {
    let roster = Roster::spawn(CancellationToken::new());
    let (tx, _rx) = mpsc::channel(1);
    roster.attach("stuck", tx).await;
    roster.join("stuck", "r1", "s1").await;

    // Fill the buffer, then overflow it; the pump must evict the client.
    roster.deliver("r1", "s1", "one".into(), None).await;
    roster.deliver("r1", "s1", "two".into(), None).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while roster.member_count("r1", "s1").await != 0 {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "client never evicted");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{page_key, HistoryCache};

#[test]
fn page_key_shape() {
    assert_eq!(
        page_key("chat:history", "r1", "s1", None, "backward", 10),
        "chat:history:r1:s1:start:backward:10"
    );
    assert_eq!(
        page_key("chat:history", "r1", "s1", Some(16), "forward", 25),
        "chat:history:r1:s1:16:forward:25"
    );
}

#[tokio::test]
async fn concurrent_identical_misses_share_one_fetch() -> anyhow::Result<()> {
    let cache = Arc::new(HistoryCache::disconnected("t"));
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch("t:r1:s1:start:backward:10", || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok("page".to_owned())
                })
                .await
        }));
    }

    for handle in handles {
        let value = handle.await??;
        assert_eq!(value, "page");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1, "one store query per miss burst");
    Ok(())
}

#[tokio::test]
async fn distinct_keys_fetch_independently() -> anyhow::Result<()> {
    let cache = HistoryCache::disconnected("t");
    let a = cache.get_or_fetch("t:a", || async { Ok("a".to_owned()) }).await?;
    let b = cache.get_or_fetch("t:b", || async { Ok("b".to_owned()) }).await?;
    assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
    Ok(())
}

#[tokio::test]
async fn failed_fetch_propagates_and_clears_the_slot() -> anyhow::Result<()> {
    let cache = HistoryCache::disconnected("t");
    let err = cache
        .get_or_fetch("t:x", || async { Err(anyhow::anyhow!("store down")) })
        .await;
    assert!(err.is_err());

    // The slot must be free for the next attempt.
    let ok = cache.get_or_fetch("t:x", || async { Ok("recovered".to_owned()) }).await?;
    assert_eq!(ok, "recovered");
    Ok(())
}

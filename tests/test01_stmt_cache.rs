use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use sql_essentials::test_utils::MockDriver;
use sql_essentials::{Context, SqlEssentialsError, StmtCache};

fn cache_for(driver: &MockDriver) -> StmtCache<MockDriver> {
    StmtCache::new(Arc::new(driver.clone()))
}

#[tokio::test]
async fn repeated_lookups_share_one_handle() -> Result<(), SqlEssentialsError> {
    let driver = MockDriver::new();
    let cache = cache_for(&driver);
    let ctx = Context::background();

    let first = cache.get_or_prepare(&ctx, "SELECT 1").await?;
    let second = cache.get_or_prepare(&ctx, "SELECT 1").await?;
    assert!(Arc::ptr_eq(&first, &second));

    // Query text is the key: whitespace differences are distinct entries.
    let third = cache.get_or_prepare(&ctx, "SELECT  1").await?;
    assert!(!Arc::ptr_eq(&first, &third));

    assert_eq!(cache.len().await, 2);
    assert_eq!(driver.stats().prepares, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_converge_on_one_cached_handle() -> Result<(), SqlEssentialsError> {
    let driver = MockDriver::new().prepare_delay(Duration::from_millis(20));
    let cache = Arc::new(cache_for(&driver));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            cache
                .get_or_prepare(&Context::background(), "SELECT * FROM t WHERE id = ?")
                .await
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.expect("task panicked")?);
    }

    let cached = cache
        .get_or_prepare(&Context::background(), "SELECT * FROM t WHERE id = ?")
        .await?;
    for handle in &handles {
        assert!(Arc::ptr_eq(handle, &cached));
    }
    assert_eq!(cache.len().await, 1);

    // Every losing handle was closed; only the cached one is still alive.
    let stats = driver.stats();
    assert!(stats.prepares >= 1);
    assert_eq!(stats.closes, stats.prepares - 1);
    assert!(!cached.is_closed());
    Ok(())
}

#[tokio::test]
async fn failed_prepare_is_not_cached() {
    let driver = MockDriver::new().fail_prepare("SELEC broken");
    let cache = cache_for(&driver);
    let ctx = Context::background();

    assert!(cache.get_or_prepare(&ctx, "SELEC broken").await.is_err());
    assert!(!cache.contains("SELEC broken").await);
    assert!(cache.get_or_prepare(&ctx, "SELEC broken").await.is_err());
    assert_eq!(driver.stats().prepares, 2);
}

#[tokio::test]
async fn evict_all_reports_each_close_failure_once() -> Result<(), SqlEssentialsError> {
    let driver = MockDriver::new()
        .fail_close("SELECT a FROM t")
        .fail_close("SELECT b FROM t");
    let cache = cache_for(&driver);
    let ctx = Context::background();

    for query in ["SELECT a FROM t", "SELECT b FROM t", "SELECT c FROM t"] {
        cache.get_or_prepare(&ctx, query).await?;
    }

    let errors = cache.evict_all().await.collect().await;
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|err| matches!(err, SqlEssentialsError::ExecutionError(msg) if msg.contains("close")))
    );
    assert!(cache.is_empty().await);
    assert_eq!(driver.stats().closes, 3);
    Ok(())
}

#[tokio::test]
async fn evict_errors_can_be_consumed_as_a_stream() -> Result<(), SqlEssentialsError> {
    let driver = MockDriver::new().fail_close("SELECT a FROM t");
    let cache = cache_for(&driver);
    let ctx = Context::background();
    cache.get_or_prepare(&ctx, "SELECT a FROM t").await?;
    cache.get_or_prepare(&ctx, "SELECT b FROM t").await?;

    let mut errors = cache.evict_all().await;
    let mut seen = 0;
    while let Some(_err) = errors.next().await {
        seen += 1;
    }
    assert_eq!(seen, 1);
    Ok(())
}

#[tokio::test]
async fn dropping_evict_errors_still_closes_everything() -> Result<(), SqlEssentialsError> {
    let driver = MockDriver::new()
        .fail_close("SELECT a FROM t")
        .fail_close("SELECT b FROM t");
    let cache = cache_for(&driver);
    let ctx = Context::background();
    for query in ["SELECT a FROM t", "SELECT b FROM t", "SELECT c FROM t"] {
        cache.get_or_prepare(&ctx, query).await?;
    }

    drop(cache.evict_all().await);

    // Eviction holds the write lock until the last close, so this read waits.
    assert_eq!(cache.len().await, 0);
    assert_eq!(driver.stats().closes, 3);
    Ok(())
}

#[tokio::test]
async fn lookups_after_eviction_prepare_again() -> Result<(), SqlEssentialsError> {
    let driver = MockDriver::new();
    let cache = cache_for(&driver);
    let ctx = Context::background();

    let before = cache.get_or_prepare(&ctx, "SELECT 1").await?;
    cache.evict_all_discard().await;
    assert!(before.is_closed());

    let after = cache.get_or_prepare(&ctx, "SELECT 1").await?;
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(!after.is_closed());
    assert_eq!(driver.stats().prepares, 2);
    Ok(())
}

#[tokio::test]
async fn evicting_an_empty_cache_yields_nothing() {
    let cache = cache_for(&MockDriver::new());
    assert!(cache.evict_all().await.collect().await.is_empty());
}

#[tokio::test]
async fn cancelled_context_fails_the_miss_without_caching() {
    let driver = MockDriver::new();
    let cache = cache_for(&driver);
    let (ctx, token) = Context::background().with_cancel();
    token.cancel();

    let err = cache
        .get_or_prepare(&ctx, "SELECT 1")
        .await
        .expect_err("cancelled context must fail");
    assert!(matches!(err, SqlEssentialsError::Cancelled));
    assert!(cache.is_empty().await);
}

//! Mini Cache - demonstration binary
//!
//! Walks through the four cache kinds: a manual cache with access expiry, a
//! loading cache with a batch read, an asynchronous loading cache given a
//! completed value, and an asynchronous cache running on its own executor.
//!
//! Bounds come from the `CACHE_*` environment variables, falling back to a
//! size of 20 and a two second access expiry.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::{Builder, Runtime};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::{
    spawn_cleanup_task, AsyncCache, AsyncLoader, AsyncLoadingCache, Cache, CacheBuilder,
    CacheConfig, CacheStats, Loader, LoadingCache,
};

fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env().context("reading cache configuration")?;
    let config = CacheConfig {
        maximum_size: config.maximum_size.or(Some(20)),
        expire_after_access: config.expire_after_access.or(Some(Duration::from_secs(2))),
        ..config
    };
    info!(?config, "Configuration loaded");

    manual_cache(&config)?;
    loading_cache(&config)?;

    let runtime = Runtime::new().context("starting runtime")?;
    runtime.block_on(async_loading_cache(&config))?;

    executor_cache()?;

    info!("Demo complete");
    Ok(())
}

/// Values put by hand expire once idle; a computing read fills the gap.
fn manual_cache(config: &CacheConfig) -> anyhow::Result<()> {
    let cache: Cache<String, i64> = CacheBuilder::from_config(config.clone()).build()?;

    cache.put("t1".to_string(), 1);
    if let Some(idle) = config.expire_after_access {
        thread::sleep(idle + Duration::from_secs(1));
    }

    let t1 = cache.get_if_present(&"t1".to_string());
    info!("t1={:?}", t1);

    let t1 = cache.get_with(&"t1".to_string(), |_| Ok(111))?;
    info!("t1={}", t1);

    print_stats("manual", &cache.stats())
}

/// Keys missing from the cache come from the loader, alone or in bulk.
fn loading_cache(config: &CacheConfig) -> anyhow::Result<()> {
    let cache: LoadingCache<i32, i32> = CacheBuilder::from_config(config.clone()).build_loading(
        Loader::batched(
            |_: &i32| {
                info!("loading one key from the backing store");
                Ok(8)
            },
            |keys: &[i32]| {
                info!(count = keys.len(), "loading keys from the backing store");
                Ok(keys.iter().map(|key| (*key, 8)).collect::<HashMap<_, _>>())
            },
        ),
    )?;

    cache.put(1, 1);
    info!("1={}", cache.get(&1)?);

    let values = cache.get_all(&[2, 3, 4])?;
    info!("batch={:?}", values);

    print_stats("loading", &cache.stats())
}

/// A completed value put into an asynchronous cache is returned without
/// running the loader, until it expires.
async fn async_loading_cache(config: &CacheConfig) -> anyhow::Result<()> {
    let cache: AsyncLoadingCache<String, String> = CacheBuilder::from_config(config.clone())
        .maximum_size(100)
        .build_async_loading(AsyncLoader::from_fn(|key: String, _executor| async move {
            info!("asynchronous load running against the backing store");
            Ok(format!("888{key}"))
        }))?;
    let cleanup = config
        .cleanup_interval
        .map(|interval| spawn_cleanup_task(cache.clone(), interval));

    cache
        .put_async("t1".to_string(), async { Ok("hehehe~".to_string()) })
        .await?;
    info!("t1={}", cache.get("t1".to_string()).await?);

    if let Some(idle) = config.expire_after_access {
        tokio::time::sleep(idle + Duration::from_secs(1)).await;
    }
    info!("t1={}", cache.get("t1".to_string()).await?);

    if let Some(handle) = cleanup {
        handle.abort();
    }
    print_stats("async loading", &cache.stats())
}

/// Computations run on the executor given to the builder, not the caller.
fn executor_cache() -> anyhow::Result<()> {
    let executor = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("cache-executor")
        .enable_all()
        .build()
        .context("starting executor")?;
    let cache: AsyncCache<i32, i32> = CacheBuilder::new()
        .expire_after_write(Duration::from_secs(1))
        .maximum_size(100)
        .executor(executor.handle().clone())
        .build_async()?;

    let future = cache.get_with(1, |key| {
        info!(
            "computing on thread {:?}",
            thread::current().name().unwrap_or("unnamed")
        );
        Ok(key + 1)
    });
    let value = executor.block_on(future)?;

    info!(
        "caller thread {:?}, value {}",
        thread::current().name().unwrap_or("unnamed"),
        value
    );
    print_stats("executor", &cache.stats())
}

fn print_stats(name: &str, stats: &CacheStats) -> anyhow::Result<()> {
    info!("{} stats: {}", name, serde_json::to_string(stats)?);
    Ok(())
}

/// Read-through caching over an optional [`Cache`](crate::db::Cache).
///
/// With a cache present, a hit returns the cached value; a miss awaits
/// `$block`, queues the result for a background write and returns it.
/// Cache read failures are logged and treated as misses so Redis outages
/// never fail a request. Without a cache, `$block` is awaited directly.
///
/// Must be used inside a function returning `AppResult`.
///
/// # Example
/// ```rust,ignore
/// let analysis: BookAnalysis = cached!(state.cache, CacheKey::BookAnalysis(id), ttl, async {
///     load_analysis(id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.as_ref() {
            Some(cache) => {
                let key = $key;
                let hit = match cache.get_from_cache(&key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        tracing::warn!(error = %e, key = %key, "Cache read failed");
                        None
                    }
                };
                match hit {
                    Some(cached) => Ok(cached),
                    None => {
                        let value = $block.await?;
                        cache.set_in_background(&key, &value, $ttl);
                        Ok(value)
                    }
                }
            }
            None => $block.await,
        }
    }};
}

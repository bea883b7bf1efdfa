/// Read-through caching over a [`Cache`](crate::db::Cache).
///
/// Looks the key up first. On a miss the block is awaited, its value is queued for
/// storage with the given TTL (seconds) and returned. A failing cache read is logged
/// and treated as a miss so an unavailable Redis never fails the request.
///
/// Evaluates to `AppResult<T>`; the block must evaluate to a future of `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let snapshot: AppResult<CorpusSnapshot> =
///     cached!(self.cache, CacheKey::Corpus(version), self.ttl, self.inner.snapshot());
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %key, "Cache hit");
                Ok(cached)
            }
            outcome => {
                if let Err(e) = outcome {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, falling back");
                }
                match $block.await {
                    Ok(value) => {
                        $cache.set_in_background(&key, &value, $ttl);
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }};
}

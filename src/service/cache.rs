//! NZB parse cache: hash → parsed NZB, 1h TTL (spec §4.8).

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::nzb::types::ParsedNzb;

const NZB_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct NzbCache {
    inner: Cache<String, Arc<ParsedNzb>>,
}

impl NzbCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().time_to_live(NZB_CACHE_TTL).build(),
        }
    }

    pub async fn get(&self, hash: &str) -> Option<Arc<ParsedNzb>> {
        self.inner.get(hash).await
    }

    pub async fn insert(&self, hash: String, parsed: Arc<ParsedNzb>) {
        self.inner.insert(hash, parsed).await;
    }

    /// Spawns the periodic sweeper. moka evicts lazily on access; this
    /// forces expired entries out even for hashes nobody looks up again.
    pub fn spawn_sweeper(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                inner.run_pending_tasks().await;
            }
        });
    }
}

impl Default for NzbCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nzb::types::ParsedNzb;

    fn sample(hash: &str) -> Arc<ParsedNzb> {
        Arc::new(ParsedNzb {
            hash: hash.to_string(),
            files: vec![],
            media_file_indices: vec![],
            total_size: 0,
            groups: vec![],
        })
    }

    #[tokio::test]
    async fn caches_by_hash() {
        let cache = NzbCache::new();
        assert!(cache.get("abc").await.is_none());
        cache.insert("abc".into(), sample("abc")).await;
        assert_eq!(cache.get("abc").await.unwrap().hash, "abc");
    }
}

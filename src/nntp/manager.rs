//! Multi-provider failover client (spec §4.4).
//!
//! Providers are tried in ascending `priority` order. A failed attempt on
//! one provider (connection error, timeout, or a clean "not found") moves
//! on to the next; only once every provider has been exhausted without a
//! positive hit does [`NntpClientManager::get_article`] fail, with an
//! aggregate error naming every attempt.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::nntp::config::NntpServerConfig;
use crate::nntp::error::{NntpError, ProviderAttempt};
use crate::nntp::pool::NntpPool;
use crate::yenc::{DecodedArticle, YencCodec};

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct NntpClientManager {
    pools: ArcSwap<Vec<Arc<NntpPool>>>,
}

impl NntpClientManager {
    pub fn new(servers: Vec<NntpServerConfig>) -> Self {
        Self {
            pools: ArcSwap::from_pointee(Self::build_pools(servers)),
        }
    }

    fn build_pools(mut servers: Vec<NntpServerConfig>) -> Vec<Arc<NntpPool>> {
        servers.sort_by_key(|s| s.priority);
        servers.into_iter().map(NntpPool::new).collect()
    }

    /// Atomically replaces the provider list (e.g. on config reload).
    /// In-flight checkouts against the old pools are unaffected; they are
    /// simply not handed out again once idle.
    pub fn reload(&self, servers: Vec<NntpServerConfig>) {
        self.pools.store(Arc::new(Self::build_pools(servers)));
    }

    /// Spawns the periodic idle-connection sweep. The returned handle can
    /// be aborted at shutdown.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                manager.cleanup_idle().await;
            }
        })
    }

    pub async fn cleanup_idle(&self) {
        for pool in self.pools.load().iter() {
            pool.reap_idle().await;
        }
    }

    /// Shuts down every provider pool (spec §5 cancellation): new and
    /// queued `acquire()` calls fail with `PoolClosed`, and every
    /// connection (idle now, checked-out as it's returned) is disconnected.
    pub async fn shutdown(&self) {
        for pool in self.pools.load().iter() {
            pool.close().await;
        }
    }

    /// Fetches and yEnc-decodes the article with the given message ID,
    /// trying each provider in priority order.
    pub async fn get_decoded_article(&self, message_id: &str) -> Result<DecodedArticle, NntpError> {
        let raw = self.get_article(message_id).await?;
        YencCodec::decode(&raw).map_err(|e| NntpError::ProtocolError {
            code: 0,
            message: e.to_string(),
        })
    }

    /// Fetches the raw (still yEnc-encoded) article body.
    pub async fn get_article(&self, message_id: &str) -> Result<Vec<u8>, NntpError> {
        let pools = self.pools.load();
        if pools.is_empty() {
            return Err(NntpError::NoProviders);
        }

        let mut attempts = Vec::with_capacity(pools.len());
        for pool in pools.iter() {
            match self.try_fetch(pool, message_id).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    debug!(provider = %pool.provider_name(), error = %err, "provider attempt failed");
                    attempts.push(ProviderAttempt {
                        provider: pool.provider_name().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Err(NntpError::ArticleNotFoundEverywhere {
            message_id: message_id.to_string(),
            attempts,
        })
    }

    /// `STAT`-only existence check with the same failover order as
    /// [`Self::get_article`], short-circuiting on the first positive hit.
    pub async fn article_exists(&self, message_id: &str) -> Result<bool, NntpError> {
        let pools = self.pools.load();
        if pools.is_empty() {
            return Err(NntpError::NoProviders);
        }

        for pool in pools.iter() {
            let mut guard = match pool.acquire().await {
                Ok(guard) => guard,
                Err(err) => {
                    warn!(provider = %pool.provider_name(), error = %err, "could not acquire connection");
                    continue;
                }
            };
            match guard.connection().stat(message_id).await {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(err) => {
                    warn!(provider = %pool.provider_name(), error = %err, "stat failed");
                    continue;
                }
            }
        }

        Ok(false)
    }

    async fn try_fetch(&self, pool: &Arc<NntpPool>, message_id: &str) -> Result<Vec<u8>, NntpError> {
        let mut guard = pool.acquire().await?;
        guard.connection().body(message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, priority: u32) -> NntpServerConfig {
        NntpServerConfig::new(
            name.to_string(),
            "news.example.com".to_string(),
            563,
            true,
            None,
            None,
            5,
            priority,
        )
    }

    #[test]
    fn pools_are_ordered_by_priority() {
        let servers = vec![server("b", 2), server("a", 1), server("c", 3)];
        let pools = NntpClientManager::build_pools(servers);
        let names: Vec<_> = pools.iter().map(|p| p.provider_name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

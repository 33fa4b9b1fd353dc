//! Per-file segment cache with lookahead prefetching (spec §4.6).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::stream::error::StreamError;

const DEFAULT_PREFETCH_COUNT: usize = 5;
const DEFAULT_MAX_CACHE_SIZE: usize = 20;

type FetchFuture = Pin<Box<dyn Future<Output = Result<Bytes, StreamError>> + Send>>;
type Fetcher = Arc<dyn Fn(usize) -> FetchFuture + Send + Sync>;

enum Slot {
    Ready(Bytes, Instant),
    Pending(broadcast::Sender<Result<Bytes, String>>),
}

struct Inner {
    slots: HashMap<usize, Slot>,
}

/// An LRU-ish cache of decoded segments for one file, with deduplicated
/// in-flight fetches and lookahead prefetching. `fetch` decodes segment
/// `index` (typically: NNTP BODY + yEnc decode via
/// [`crate::nntp::NntpClientManager`]).
pub struct PrefetchBuffer {
    inner: Mutex<Inner>,
    fetch: Fetcher,
    prefetch_count: usize,
    max_cache_size: usize,
}

impl PrefetchBuffer {
    pub fn new(fetch: Fetcher) -> Self {
        Self::with_limits(fetch, DEFAULT_PREFETCH_COUNT, DEFAULT_MAX_CACHE_SIZE)
    }

    pub fn with_limits(fetch: Fetcher, prefetch_count: usize, max_cache_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
            }),
            fetch,
            prefetch_count,
            max_cache_size,
        }
    }

    /// Returns the decoded bytes for segment `index`, fetching (and
    /// deduplicating concurrent fetches) if not cached, then schedules
    /// prefetches for `[index+1 .. index+prefetch_count]`.
    pub async fn get_segment(self: &Arc<Self>, index: usize) -> Result<Bytes, StreamError> {
        let result = self.get_or_fetch(index, true).await?;
        self.schedule_prefetch(index);
        Ok(result)
    }

    async fn get_or_fetch(
        self: &Arc<Self>,
        index: usize,
        foreground: bool,
    ) -> Result<Bytes, StreamError> {
        let mut rx = {
            let mut inner = self.inner.lock().await;
            match inner.slots.get(&index) {
                Some(Slot::Ready(bytes, _)) => return Ok(bytes.clone()),
                Some(Slot::Pending(tx)) => tx.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    inner.slots.insert(index, Slot::Pending(tx));
                    drop(inner);
                    self.run_fetch(index).await;
                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(message)) => {
                if foreground {
                    Err(StreamError::ArticleMissing {
                        file: String::new(),
                        segment_index: index,
                        source: crate::nntp::error::NntpError::ProtocolError {
                            code: 0,
                            message,
                        },
                    })
                } else {
                    Err(StreamError::InvalidRange)
                }
            }
            Err(_) => Err(StreamError::InvalidRange),
        }
    }

    async fn run_fetch(self: &Arc<Self>, index: usize) {
        let result = (self.fetch)(index).await;
        let mut inner = self.inner.lock().await;
        let previous = inner.slots.remove(&index);
        match &result {
            Ok(bytes) => {
                inner.slots.insert(index, Slot::Ready(bytes.clone(), Instant::now()));
            }
            Err(_) => {}
        }
        if let Some(Slot::Pending(tx)) = previous {
            let _ = tx.send(result.map_err(|e| e.to_string()));
        }
        drop(inner);
        self.evict_if_full().await;
    }

    fn schedule_prefetch(self: &Arc<Self>, index: usize) {
        for offset in 1..=self.prefetch_count {
            let target = index + offset;
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let already_known = {
                    let inner = this.inner.lock().await;
                    inner.slots.contains_key(&target)
                };
                if already_known {
                    return;
                }
                if let Err(err) = this.get_or_fetch(target, false).await {
                    debug!(segment = target, error = %err, "prefetch failed, swallowed");
                }
            });
        }
    }

    async fn evict_if_full(&self) {
        let mut inner = self.inner.lock().await;
        if inner.slots.len() < self.max_cache_size {
            return;
        }
        let mut ready: Vec<(usize, Instant)> = inner
            .slots
            .iter()
            .filter_map(|(&i, slot)| match slot {
                Slot::Ready(_, ts) => Some((i, *ts)),
                Slot::Pending(_) => None,
            })
            .collect();
        ready.sort_by_key(|(_, ts)| *ts);

        let target = self.max_cache_size / 2;
        let mut evicted = 0;
        for (index, _) in ready {
            if inner.slots.len() <= target {
                break;
            }
            inner.slots.remove(&index);
            evicted += 1;
        }
        if evicted > 0 {
            warn!(evicted, "prefetch buffer evicted oldest cached segments");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn caches_and_dedupes_fetches() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&call_count);
        let fetch: Fetcher = Arc::new(move |index: usize| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from(format!("segment-{index}")))
            })
        });

        let buffer = Arc::new(PrefetchBuffer::with_limits(fetch, 0, 20));
        let a = buffer.get_segment(0).await.unwrap();
        let b = buffer.get_segment(0).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}

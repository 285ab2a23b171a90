// Pool State Cache - read-through cache for pool fields keyed by pool address
// TTL bounded: a cached answer is accurate within the configured window

use ethers::prelude::Address;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheMetricsSnapshot, TtlCache};
use crate::collaborators::PoolReader;
use crate::errors::ZapResult;
use crate::types::{PoolImmutables, PoolState};

/// Read-through cache in front of [`PoolReader`].
///
/// Only `token0`/`token1`/`tickSpacing` are cached; `slot0` is always read live because
/// allocation and slippage floors depend on the current price.
pub struct PoolStateCache {
    reader: Arc<dyn PoolReader>,
    immutables: TtlCache<Address, PoolImmutables>,
}

impl PoolStateCache {
    pub fn new(reader: Arc<dyn PoolReader>, ttl: Duration) -> Self {
        Self {
            reader,
            immutables: TtlCache::new("pool_immutables", ttl),
        }
    }

    pub async fn immutables(&self, pool: Address) -> ZapResult<PoolImmutables> {
        if let Some(cached) = self.immutables.get(&pool) {
            return Ok(cached);
        }
        let fetched = self.reader.immutables(pool).await?;
        debug!("PoolStateCache: fetched immutables for {:?}", pool);
        self.immutables.insert(pool, fetched);
        Ok(fetched)
    }

    pub async fn slot0(&self, pool: Address) -> ZapResult<PoolState> {
        self.reader.slot0(pool).await
    }

    pub fn invalidate_stale(&self) -> usize {
        self.immutables.purge_expired()
    }

    pub fn clear(&self) {
        self.immutables.clear();
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.immutables.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PoolReader for CountingReader {
        async fn slot0(&self, _pool: Address) -> ZapResult<PoolState> {
            Ok(PoolState {
                sqrt_price_x96: U256::one(),
                tick: 0,
            })
        }

        async fn immutables(&self, pool: Address) -> ZapResult<PoolImmutables> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PoolImmutables {
                address: pool,
                token0: Address::from_low_u64_be(1),
                token1: Address::from_low_u64_be(2),
                tick_spacing: 10,
            })
        }
    }

    #[tokio::test]
    async fn test_immutables_read_through() {
        let reader = Arc::new(CountingReader {
            calls: AtomicUsize::new(0),
        });
        let cache = PoolStateCache::new(reader.clone(), Duration::from_secs(60));
        let pool = Address::from_low_u64_be(99);

        let first = cache.immutables(pool).await.unwrap();
        let second = cache.immutables(pool).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().hits, 1);

        cache.clear();
        cache.immutables(pool).await.unwrap();
        assert_eq!(reader.calls.load(Ordering::SeqCst), 2);
    }
}

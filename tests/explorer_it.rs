mod common;

use common::{coinjoin_tx, MockExplorer};

use async_trait::async_trait;
use cjScanner::cache::TxCache;
use cjScanner::config::CacheSettings;
use cjScanner::explorer::client::{CachedExplorer, ExplorerApi};
use cjScanner::explorer::model::{AddressPage, Transaction};
use cjScanner::types::ExplorerError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts upstream calls so cache hits are observable.
struct CountingExplorer {
    inner: MockExplorer,
    tx_calls: AtomicU64,
    page_calls: AtomicU64,
}

#[async_trait]
impl ExplorerApi for CountingExplorer {
    async fn get_mempool_txids(&self) -> Result<Vec<String>, ExplorerError> {
        self.inner.get_mempool_txids().await
    }

    async fn get_tx(&self, txid: &str) -> Result<Transaction, ExplorerError> {
        self.tx_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.get_tx(txid).await
    }

    async fn get_address_txs(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<AddressPage, ExplorerError> {
        self.page_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.get_address_txs(address, cursor).await
    }

    async fn get_spending_tx(
        &self,
        prev_txid: &str,
        vout_index: u32,
    ) -> Result<Option<String>, ExplorerError> {
        self.inner.get_spending_tx(prev_txid, vout_index).await
    }
}

#[tokio::test]
async fn cached_lookup_matches_a_fresh_fetch() {
    let mut inner = MockExplorer::new();
    inner.add_tx(coinjoin_tx("cj1"));
    inner.address_history("watched", &["cj1"]);

    let counting = Arc::new(CountingExplorer {
        inner,
        tx_calls: AtomicU64::new(0),
        page_calls: AtomicU64::new(0),
    });
    let cache = Arc::new(TxCache::new(&CacheSettings {
        capacity: 100,
        ttl_secs: 600,
    }));
    let cached = CachedExplorer::new(counting.clone(), cache.clone());

    let fresh = cached.get_tx("cj1").await.expect("fresh fetch");
    let hit = cached.get_tx("cj1").await.expect("cache hit");

    assert_eq!(counting.tx_calls.load(Ordering::Relaxed), 1);
    assert_eq!(fresh.txid, hit.txid);
    assert_eq!(fresh.fee, hit.fee);
    assert_eq!(fresh.vin.len(), hit.vin.len());
    assert_eq!(fresh.vout.len(), hit.vout.len());

    let status = cache.status();
    assert_eq!(status.hits, 1);
    assert_eq!(status.misses, 1);
}

#[tokio::test]
async fn address_pages_are_cached_per_cursor() {
    let mut inner = MockExplorer::new();
    inner.add_tx(coinjoin_tx("cj1"));
    inner.address_history("watched", &["cj1"]);

    let counting = Arc::new(CountingExplorer {
        inner,
        tx_calls: AtomicU64::new(0),
        page_calls: AtomicU64::new(0),
    });
    let cache = Arc::new(TxCache::new(&CacheSettings {
        capacity: 100,
        ttl_secs: 600,
    }));
    let cached = CachedExplorer::new(counting.clone(), cache);

    let first = cached.get_address_txs("watched", None).await.expect("page");
    let second = cached.get_address_txs("watched", None).await.expect("page");
    assert_eq!(counting.page_calls.load(Ordering::Relaxed), 1);
    assert_eq!(first.txids, second.txids);

    // a different cursor is a different page
    let _ = cached.get_address_txs("watched", Some("cj1")).await;
    assert_eq!(counting.page_calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn not_found_is_not_cached() {
    let counting = Arc::new(CountingExplorer {
        inner: MockExplorer::new(),
        tx_calls: AtomicU64::new(0),
        page_calls: AtomicU64::new(0),
    });
    let cache = Arc::new(TxCache::new(&CacheSettings {
        capacity: 100,
        ttl_secs: 600,
    }));
    let cached = CachedExplorer::new(counting.clone(), cache);

    assert!(matches!(
        cached.get_tx("ghost").await,
        Err(ExplorerError::NotFound)
    ));
    assert!(matches!(
        cached.get_tx("ghost").await,
        Err(ExplorerError::NotFound)
    ));
    assert_eq!(counting.tx_calls.load(Ordering::Relaxed), 2);
}

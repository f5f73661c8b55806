use crate::config::CacheSettings;
use crate::explorer::model::{AddressPage, Transaction};

use log::debug;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// LRU with a per-entry TTL. Expired entries are dropped lazily on access
/// and eagerly by `sweep`.
struct TtlLru<V> {
    inner: LruCache<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlLru<V> {
    fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.inner.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.inner.pop(key);
            return None;
        }
        self.inner.get(key).map(|e| e.value.clone())
    }

    fn put(&mut self, key: String, value: V) {
        self.inner.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn sweep(&mut self) -> usize {
        let expired: Vec<String> = self
            .inner
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.inner.pop(key);
        }
        expired.len()
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub tx_entries: usize,
    pub page_entries: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Process-wide bounded cache of transaction bodies and address-history
/// pages. Eviction only affects latency, never correctness.
pub struct TxCache {
    txs: Mutex<TtlLru<Transaction>>,
    pages: Mutex<TtlLru<AddressPage>>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TxCache {
    pub fn new(settings: &CacheSettings) -> Self {
        let ttl = Duration::from_secs(settings.ttl_secs);
        Self {
            txs: Mutex::new(TtlLru::new(settings.capacity, ttl)),
            pages: Mutex::new(TtlLru::new(settings.capacity, ttl)),
            capacity: settings.capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_tx(&self, txid: &str) -> Option<Transaction> {
        let mut txs = self.txs.lock().unwrap_or_else(|e| e.into_inner());
        self.count(txs.get(txid))
    }

    pub fn put_tx(&self, tx: &Transaction) {
        let mut txs = self.txs.lock().unwrap_or_else(|e| e.into_inner());
        txs.put(tx.txid.clone(), tx.clone());
    }

    pub fn get_page(&self, address: &str, cursor: Option<&str>) -> Option<AddressPage> {
        let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        self.count(pages.get(&page_key(address, cursor)))
    }

    pub fn put_page(&self, address: &str, cursor: Option<&str>, page: &AddressPage) {
        let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        pages.put(page_key(address, cursor), page.clone());
    }

    pub fn clear(&self) {
        self.txs.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.pages.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!("[Cache] cleared");
    }

    /// Removes expired entries from both namespaces, returns how many.
    pub fn cleanup(&self) -> usize {
        let swept = self.txs.lock().unwrap_or_else(|e| e.into_inner()).sweep()
            + self.pages.lock().unwrap_or_else(|e| e.into_inner()).sweep();
        if swept > 0 {
            debug!("[Cache] swept {} expired entries", swept);
        }
        swept
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            tx_entries: self.txs.lock().unwrap_or_else(|e| e.into_inner()).len(),
            page_entries: self.pages.lock().unwrap_or_else(|e| e.into_inner()).len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn count<V>(&self, hit: Option<V>) -> Option<V> {
        match hit {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

fn page_key(address: &str, cursor: Option<&str>) -> String {
    match cursor {
        Some(c) => format!("{}:{}", address, c),
        None => format!("{}:", address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(txid: &str) -> Transaction {
        serde_json::from_str(&format!(
            r#"{{"txid": "{}", "vin": [], "vout": [], "fee": 10, "size": 100}}"#,
            txid
        ))
        .expect("valid tx")
    }

    fn cache(capacity: usize, ttl_secs: u64) -> TxCache {
        TxCache::new(&CacheSettings { capacity, ttl_secs })
    }

    #[test]
    fn hit_returns_identical_body() {
        let cache = cache(10, 60);
        cache.put_tx(&tx("aa"));

        let got = cache.get_tx("aa").expect("cached");
        assert_eq!(got.txid, "aa");
        assert_eq!(got.fee, 10);
        assert_eq!(cache.status().hits, 1);
    }

    #[test]
    fn miss_is_counted() {
        let cache = cache(10, 60);
        assert!(cache.get_tx("absent").is_none());
        assert_eq!(cache.status().misses, 1);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = cache(2, 60);
        cache.put_tx(&tx("aa"));
        cache.put_tx(&tx("bb"));

        // touch aa so bb becomes the eviction candidate
        assert!(cache.get_tx("aa").is_some());
        cache.put_tx(&tx("cc"));

        assert!(cache.get_tx("aa").is_some());
        assert!(cache.get_tx("bb").is_none());
        assert!(cache.get_tx("cc").is_some());
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = cache(10, 0);
        cache.put_tx(&tx("aa"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_tx("aa").is_none());
    }

    #[test]
    fn cleanup_sweeps_expired() {
        let cache = cache(10, 0);
        cache.put_tx(&tx("aa"));
        cache.put_tx(&tx("bb"));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.cleanup(), 2);
        assert_eq!(cache.status().tx_entries, 0);
    }

    #[test]
    fn namespaces_are_independent() {
        let cache = cache(10, 60);
        let page = AddressPage {
            txids: vec!["aa".to_string()],
            next_cursor: None,
        };
        cache.put_page("bc1qaddr", None, &page);

        assert!(cache.get_tx("bc1qaddr").is_none());
        let got = cache.get_page("bc1qaddr", None).expect("cached page");
        assert_eq!(got.txids, vec!["aa".to_string()]);
    }

    #[test]
    fn clear_empties_both_namespaces() {
        let cache = cache(10, 60);
        cache.put_tx(&tx("aa"));
        cache.put_page(
            "bc1qaddr",
            None,
            &AddressPage {
                txids: vec![],
                next_cursor: None,
            },
        );

        cache.clear();
        let status = cache.status();
        assert_eq!(status.tx_entries, 0);
        assert_eq!(status.page_entries, 0);
    }
}

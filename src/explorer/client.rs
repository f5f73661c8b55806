/**
* filename : client
* author : HAMA
* date: 2025. 5. 12.
* description:
**/

use crate::cache::TxCache;
use crate::config::ExplorerSettings;
use crate::explorer::model::{AddressPage, Outspend, Transaction};
use crate::types::ExplorerError;

use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Typed access to the block explorer. The tracer and monitor only talk to
/// this trait, so tests can swap the real client out.
#[async_trait]
pub trait ExplorerApi: Send + Sync {
  async fn get_mempool_txids(&self) -> Result<Vec<String>, ExplorerError>;
  async fn get_tx(&self, txid: &str) -> Result<Transaction, ExplorerError>;
  async fn get_address_txs(
    &self,
    address: &str,
    cursor: Option<&str>,
  ) -> Result<AddressPage, ExplorerError>;
  /// Returns the spending txid for (prev_txid, vout_index), None when unspent.
  async fn get_spending_tx(
    &self,
    prev_txid: &str,
    vout_index: u32,
  ) -> Result<Option<String>, ExplorerError>;
}

/// Admission control shared by every request: a cap on in-flight calls plus
/// a minimum interval between dispatches.
struct RateLimiter {
  min_interval: Duration,
  last_dispatch: Mutex<Option<Instant>>,
  in_flight: Arc<Semaphore>,
}

impl RateLimiter {
  fn new(min_interval: Duration, max_in_flight: usize) -> Self {
    Self {
      min_interval,
      last_dispatch: Mutex::new(None),
      in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
    }
  }

  async fn admit(&self) -> OwnedSemaphorePermit {
    let permit = self
      .in_flight
      .clone()
      .acquire_owned()
      .await
      .expect("explorer semaphore closed");

    // 락을 쥔 채로 대기해서 dispatch 간격을 직렬화한다
    let mut last = self.last_dispatch.lock().await;
    if let Some(prev) = *last {
      let next_allowed = prev + self.min_interval;
      if next_allowed > Instant::now() {
        tokio::time::sleep_until(next_allowed).await;
      }
    }
    *last = Some(Instant::now());

    permit
  }
}

pub struct EsploraClient {
  client: Client,
  base_url: String,
  limiter: RateLimiter,
  retry_attempts: u32,
  retry_base_delay: Duration,
}

#[derive(Deserialize)]
struct TxRef {
  txid: String,
}

impl EsploraClient {
  pub fn new(settings: &ExplorerSettings) -> Self {
    let client = Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .unwrap_or_else(|_| Client::new());

    Self {
      client,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      limiter: RateLimiter::new(
        Duration::from_millis(settings.min_request_interval_ms),
        settings.max_in_flight,
      ),
      retry_attempts: settings.retry_attempts.max(1),
      retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
    }
  }

  async fn fetch_json<T>(&self, url: &str) -> Result<T, ExplorerError>
  where
    T: DeserializeOwned,
  {
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.try_fetch_json(url).await {
        Ok(value) => return Ok(value),
        Err(err) if attempt < self.retry_attempts && is_transient(&err) => {
          let delay = backoff_delay(self.retry_base_delay, attempt);
          warn!(
            "[Explorer] attempt {}/{} failed ({}), retrying in {:?}",
            attempt, self.retry_attempts, err, delay
          );
          tokio::time::sleep(delay).await;
        }
        Err(err) => return Err(err),
      }
    }
  }

  async fn try_fetch_json<T>(&self, url: &str) -> Result<T, ExplorerError>
  where
    T: DeserializeOwned,
  {
    let _permit = self.limiter.admit().await;
    debug!("[Explorer] GET {}", url);

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| ExplorerError::Unavailable(format!("request failed: {}", e)))?;

    match response.status() {
      StatusCode::OK => response
        .json::<T>()
        .await
        .map_err(|e| ExplorerError::Malformed(format!("decode failed: {}", e))),
      StatusCode::NOT_FOUND => Err(ExplorerError::NotFound),
      StatusCode::TOO_MANY_REQUESTS => Err(ExplorerError::RateLimited),
      status if status.is_server_error() => {
        Err(ExplorerError::Unavailable(format!("upstream status {}", status)))
      }
      status => Err(ExplorerError::Malformed(format!("unexpected status {}", status))),
    }
  }
}

fn is_transient(err: &ExplorerError) -> bool {
  matches!(err, ExplorerError::RateLimited | ExplorerError::Unavailable(_))
}

/// Capped exponential backoff with jitter: base * 2^(attempt-1) + [0, base/2).
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
  let exp = base.saturating_mul(1u32 << attempt.saturating_sub(1).min(8));
  let jitter_cap = (base.as_millis() as u64 / 2).max(1);
  let jitter = rand::thread_rng().gen_range(0..jitter_cap);
  exp + Duration::from_millis(jitter)
}

#[async_trait]
impl ExplorerApi for EsploraClient {
  async fn get_mempool_txids(&self) -> Result<Vec<String>, ExplorerError> {
    let url = format!("{}/mempool/txids", self.base_url);
    self.fetch_json(&url).await
  }

  async fn get_tx(&self, txid: &str) -> Result<Transaction, ExplorerError> {
    let url = format!("{}/tx/{}", self.base_url, txid);
    self.fetch_json(&url).await
  }

  async fn get_address_txs(
    &self,
    address: &str,
    cursor: Option<&str>,
  ) -> Result<AddressPage, ExplorerError> {
    let url = match cursor {
      Some(last_seen) => format!("{}/address/{}/txs/chain/{}", self.base_url, address, last_seen),
      None => format!("{}/address/{}/txs/chain", self.base_url, address),
    };
    let refs: Vec<TxRef> = self.fetch_json(&url).await?;
    let txids: Vec<String> = refs.into_iter().map(|r| r.txid).collect();
    let next_cursor = txids.last().cloned();
    Ok(AddressPage { txids, next_cursor })
  }

  async fn get_spending_tx(
    &self,
    prev_txid: &str,
    vout_index: u32,
  ) -> Result<Option<String>, ExplorerError> {
    let url = format!("{}/tx/{}/outspend/{}", self.base_url, prev_txid, vout_index);
    let outspend: Outspend = self.fetch_json(&url).await?;
    if outspend.spent {
      Ok(outspend.txid)
    } else {
      Ok(None)
    }
  }
}

/// Read-through cache in front of any `ExplorerApi`. Transaction bodies and
/// address pages are served from the cache when fresh; mempool snapshots and
/// outspend lookups always go upstream.
pub struct CachedExplorer {
  inner: Arc<dyn ExplorerApi>,
  cache: Arc<TxCache>,
}

impl CachedExplorer {
  pub fn new(inner: Arc<dyn ExplorerApi>, cache: Arc<TxCache>) -> Self {
    Self { inner, cache }
  }
}

#[async_trait]
impl ExplorerApi for CachedExplorer {
  async fn get_mempool_txids(&self) -> Result<Vec<String>, ExplorerError> {
    self.inner.get_mempool_txids().await
  }

  async fn get_tx(&self, txid: &str) -> Result<Transaction, ExplorerError> {
    if let Some(tx) = self.cache.get_tx(txid) {
      return Ok(tx);
    }
    let tx = self.inner.get_tx(txid).await?;
    self.cache.put_tx(&tx);
    Ok(tx)
  }

  async fn get_address_txs(
    &self,
    address: &str,
    cursor: Option<&str>,
  ) -> Result<AddressPage, ExplorerError> {
    if let Some(page) = self.cache.get_page(address, cursor) {
      return Ok(page);
    }
    let page = self.inner.get_address_txs(address, cursor).await?;
    self.cache.put_page(address, cursor, &page);
    Ok(page)
  }

  async fn get_spending_tx(
    &self,
    prev_txid: &str,
    vout_index: u32,
  ) -> Result<Option<String>, ExplorerError> {
    self.inner.get_spending_tx(prev_txid, vout_index).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_grows_and_stays_capped() {
    let base = Duration::from_millis(200);
    let first = backoff_delay(base, 1);
    let second = backoff_delay(base, 2);
    let third = backoff_delay(base, 3);

    assert!(first >= base && first < base + Duration::from_millis(100));
    assert!(second >= base * 2 && second < base * 2 + Duration::from_millis(100));
    assert!(third >= base * 4 && third < base * 4 + Duration::from_millis(100));
  }

  #[test]
  fn transient_errors_are_retryable() {
    assert!(is_transient(&ExplorerError::RateLimited));
    assert!(is_transient(&ExplorerError::Unavailable("503".into())));
    assert!(!is_transient(&ExplorerError::NotFound));
    assert!(!is_transient(&ExplorerError::Malformed("bad".into())));
  }
}

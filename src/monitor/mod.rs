use crate::config::MonitorSettings;
use crate::detector::Classifier;
use crate::explorer::client::ExplorerApi;
use crate::tracer::Tracer;
use crate::types::AppError;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub processed: u64,
    pub positive: u64,
    pub dropped: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct MonitorShared {
    running: AtomicBool,
    processed: AtomicU64,
    positive: AtomicU64,
    dropped: AtomicU64,
    last_tick: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl MonitorShared {
    fn record_error(&self, err: String) {
        let mut last_error = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *last_error = Some(err);
    }
}

/// Background mempool watcher. Diffs successive snapshots and pushes new
/// transactions through the classifier; positives go to the tracer.
pub struct MempoolMonitor {
    explorer: Arc<dyn ExplorerApi>,
    classifier: Arc<Classifier>,
    tracer: Arc<Tracer>,
    settings: MonitorSettings,
    shared: Arc<MonitorShared>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MempoolMonitor {
    pub fn new(
        explorer: Arc<dyn ExplorerApi>,
        classifier: Arc<Classifier>,
        tracer: Arc<Tracer>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            explorer,
            classifier,
            tracer,
            settings,
            shared: Arc::new(MonitorShared::default()),
            stop_tx: Mutex::new(None),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(AppError::Monitor("monitoring already running".to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        {
            let mut slot = self.stop_tx.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(stop_tx);
        }

        let ctx = LoopCtx {
            explorer: self.explorer.clone(),
            classifier: self.classifier.clone(),
            tracer: self.tracer.clone(),
            settings: self.settings.clone(),
            shared: self.shared.clone(),
        };

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            run_monitor(ctx, stop_rx).await;
            shared.running.store(false, Ordering::SeqCst);
        });

        let mut handle = self.handle.lock().await;
        *handle = Some(task);

        info!("[Monitor] started (tick {}s, {} workers)",
            self.settings.tick_interval_secs, self.settings.worker_pool_size);
        Ok(())
    }

    /// Signals the loop to stop between ticks and waits for it. In-flight
    /// workers drain on their own.
    pub async fn stop(&self) {
        let stop_tx = {
            let mut slot = self.stop_tx.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        match stop_tx {
            Some(stop_tx) => {
                let _ = stop_tx.send(true);
            }
            None => return,
        }

        let task = {
            let mut handle = self.handle.lock().await;
            handle.take()
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("[Monitor] join failed: {}", e);
            }
        }
        info!("[Monitor] stopped");
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            processed: self.shared.processed.load(Ordering::Relaxed),
            positive: self.shared.positive.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            last_tick: *self
                .shared
                .last_tick
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
            last_error: self
                .shared
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

struct LoopCtx {
    explorer: Arc<dyn ExplorerApi>,
    classifier: Arc<Classifier>,
    tracer: Arc<Tracer>,
    settings: MonitorSettings,
    shared: Arc<MonitorShared>,
}

/// txids present in `current` but not yet seen.
fn diff_new(current: &HashSet<String>, last_seen: &HashSet<String>) -> Vec<String> {
    current.difference(last_seen).cloned().collect()
}

async fn run_monitor(ctx: LoopCtx, mut stop_rx: watch::Receiver<bool>) {
    info!("[Monitor] loop starting...");

    let mut tick = interval(Duration::from_secs(ctx.settings.tick_interval_secs.max(1)));
    let mut last_seen: HashSet<String> = HashSet::new();
    let pool = Arc::new(Semaphore::new(ctx.settings.worker_pool_size.max(1)));
    let ctx = Arc::new(ctx);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let current: HashSet<String> = match ctx.explorer.get_mempool_txids().await {
            Ok(txids) => txids.into_iter().collect(),
            Err(e) => {
                warn!("[Monitor] mempool snapshot failed: {}", e);
                ctx.shared.record_error(e.to_string());
                continue;
            }
        };

        let new_txids = diff_new(&current, &last_seen);
        if !new_txids.is_empty() {
            info!("[Monitor] tick: {} mempool txs, {} new", current.len(), new_txids.len());
        }

        for txid in new_txids {
            match pool.clone().try_acquire_owned() {
                Ok(permit) => {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        process_new_tx(&ctx, &txid).await;
                        drop(permit);
                    });
                }
                Err(_) => {
                    // 풀이 가득 차면 드롭; 다음 스냅샷에 다시 나타난다
                    ctx.shared.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // 스냅샷 교체는 dispatch가 끝난 뒤 한 번에
        last_seen = current;
        {
            let mut last_tick = ctx
                .shared
                .last_tick
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *last_tick = Some(Utc::now());
        }
    }

    info!("[Monitor] loop exited.");
}

async fn process_new_tx(ctx: &LoopCtx, txid: &str) {
    let tx = match ctx.explorer.get_tx(txid).await {
        Ok(tx) => tx,
        Err(e) => {
            warn!("[Monitor] failed to fetch {}: {}", txid, e);
            ctx.shared.record_error(e.to_string());
            return;
        }
    };

    let verdict = ctx.classifier.classify(&tx);
    ctx.shared.processed.fetch_add(1, Ordering::Relaxed);

    if !verdict.is_coinjoin {
        return;
    }

    ctx.shared.positive.fetch_add(1, Ordering::Relaxed);
    info!(
        "[Monitor] 🚨 CoinJoin detected in mempool: {} ({}, score {:.2})",
        txid,
        verdict.detection_method.as_str(),
        verdict.score
    );

    if let Err(e) = ctx.tracer.trace_tx(txid, None).await {
        error!("[Monitor] investigation of {} failed: {}", txid, e);
        ctx.shared.record_error(e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(txids: &[&str]) -> HashSet<String> {
        txids.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn diff_picks_only_unseen() {
        let last = set(&["aa", "bb"]);
        let current = set(&["bb", "cc", "dd"]);

        let mut new = diff_new(&current, &last);
        new.sort();
        assert_eq!(new, vec!["cc".to_string(), "dd".to_string()]);
    }

    #[test]
    fn diff_of_identical_snapshots_is_empty() {
        let snapshot = set(&["aa", "bb"]);
        assert!(diff_new(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn evicted_txids_reappear_as_new() {
        // confirmed/evicted ids leave the snapshot; if they come back they
        // are treated as new again
        let last = set(&["aa"]);
        let current = set(&["bb"]);
        assert_eq!(diff_new(&current, &last), vec!["bb".to_string()]);

        let again = set(&["aa"]);
        assert_eq!(diff_new(&again, &current), vec!["aa".to_string()]);
    }
}

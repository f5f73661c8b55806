use crate::config::TracerSettings;
use crate::detector::{Classifier, Verdict};
use crate::explorer::client::ExplorerApi;
use crate::explorer::model::Transaction;
use crate::graph::{AddressTag, GraphStore, GraphWrapper};
use crate::tracer::tree::{
    Investigation, TerminationReason, TraceMetadata, TraceNode, TxSummary,
};
use crate::types::AppError;

use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Walks the outputs-are-spent-by relation forward from a seed, classifying
/// every discovered transaction and persisting positives as it goes.
pub struct Tracer {
    explorer: Arc<dyn ExplorerApi>,
    classifier: Arc<Classifier>,
    graph: Arc<GraphWrapper>,
    cfg: TracerSettings,
}

struct Slot {
    tx: TxSummary,
    verdict: Verdict,
    depth: u32,
    is_reference: bool,
    children: Vec<usize>,
}

struct Frame {
    slot: usize,
    depth: u32,
    streak: u32,
    tx: Transaction,
}

/// Per-run mutable state; never shared across investigations.
struct RunState {
    slots: Vec<Slot>,
    roots: Vec<usize>,
    stack: Vec<Frame>,
    visited: HashSet<String>,
    verdicts: HashMap<String, Verdict>,
    seed_txid: String,
    node_count: usize,
    coinjoin_found: usize,
    depth_reached: u32,
    last_streak: u32,
    termination: Option<TerminationReason>,
    depth_pruned: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            roots: Vec::new(),
            stack: Vec::new(),
            visited: HashSet::new(),
            verdicts: HashMap::new(),
            seed_txid: String::new(),
            node_count: 0,
            coinjoin_found: 0,
            depth_reached: 0,
            last_streak: 0,
            termination: None,
            depth_pruned: false,
        }
    }

    fn push_slot(&mut self, slot: Slot) -> usize {
        self.slots.push(slot);
        self.slots.len() - 1
    }
}

impl Tracer {
    pub fn new(
        explorer: Arc<dyn ExplorerApi>,
        classifier: Arc<Classifier>,
        graph: Arc<GraphWrapper>,
        cfg: TracerSettings,
    ) -> Self {
        Self {
            explorer,
            classifier,
            graph,
            cfg,
        }
    }

    fn effective_cfg(&self, max_depth: Option<u32>) -> TracerSettings {
        let mut cfg = self.cfg.clone();
        if let Some(depth) = max_depth {
            cfg.max_depth = depth;
        }
        cfg
    }

    /// Trace forward from a seed transaction.
    pub async fn trace_tx(
        &self,
        txid: &str,
        max_depth: Option<u32>,
    ) -> Result<Investigation, AppError> {
        let cfg = self.effective_cfg(max_depth);
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started + Duration::from_secs(cfg.max_wall_clock_secs);

        info!("[Tracer] 🔍 investigating tx {} (max_depth {})", txid, cfg.max_depth);

        // Seed failure aborts the request before anything is persisted.
        let root_tx = self.explorer.get_tx(txid).await?;

        let mut state = RunState::new();
        state.seed_txid = root_tx.txid.clone();
        self.seed_root(&mut state, root_tx, &cfg).await?;
        self.run(&mut state, &cfg, deadline).await;

        Ok(self.finish(state, txid, &cfg, started, started_at).await)
    }

    /// Address-seed mode: the address's recent transactions become virtual
    /// roots of the same walk.
    pub async fn trace_address(
        &self,
        address: &str,
        max_depth: Option<u32>,
    ) -> Result<Investigation, AppError> {
        let cfg = self.effective_cfg(max_depth);
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started + Duration::from_secs(cfg.max_wall_clock_secs);

        info!("[Tracer] 🔍 investigating address {} (max_depth {})", address, cfg.max_depth);

        let page = self.explorer.get_address_txs(address, None).await?;
        let seeds: Vec<String> = page
            .txids
            .into_iter()
            .take(cfg.max_txs_per_address)
            .collect();

        let mut state = RunState::new();
        state.seed_txid = address.to_string();

        for seed in seeds {
            if state.termination.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                state.termination = Some(TerminationReason::Timeout);
                break;
            }
            if state.visited.contains(&seed) {
                continue;
            }

            // Per-item failures leave a gap, never abort the investigation.
            let tx = match self.explorer.get_tx(&seed).await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!("[Tracer] virtual root {} unavailable: {}", seed, e);
                    continue;
                }
            };
            self.seed_root(&mut state, tx, &cfg).await?;
            self.run(&mut state, &cfg, deadline).await;
        }

        Ok(self.finish(state, address, &cfg, started, started_at).await)
    }

    /// Classify + persist a root and push it for expansion. The root is
    /// classified and persisted before any descendant is looked at.
    async fn seed_root(
        &self,
        state: &mut RunState,
        tx: Transaction,
        cfg: &TracerSettings,
    ) -> Result<(), AppError> {
        let verdict = self.classify_memo(state, &tx);

        self.graph.merge_transaction(&tx, &verdict).await?;
        if verdict.is_coinjoin {
            self.persist_coinjoin_addresses(&tx, cfg).await;
            state.coinjoin_found += 1;
        }

        state.visited.insert(tx.txid.clone());
        let streak = if verdict.is_coinjoin { 0 } else { 1 };
        state.last_streak = streak;

        let slot = state.push_slot(Slot {
            tx: TxSummary::from(&tx),
            verdict,
            depth: 0,
            is_reference: false,
            children: Vec::new(),
        });
        state.roots.push(slot);
        state.node_count += 1;

        if state.node_count >= cfg.max_total_nodes {
            state.termination = Some(TerminationReason::NodeBudget);
            return Ok(());
        }
        state.stack.push(Frame {
            slot,
            depth: 0,
            streak,
            tx,
        });
        Ok(())
    }

    /// The DFS loop proper. Runs until the stack drains or a stopping
    /// condition triggers.
    async fn run(&self, state: &mut RunState, cfg: &TracerSettings, deadline: Instant) {
        while state.termination.is_none() {
            let frame = match state.stack.pop() {
                Some(frame) => frame,
                None => break,
            };

            if frame.depth >= cfg.max_depth {
                state.depth_pruned = true;
                continue;
            }
            if Instant::now() >= deadline {
                state.termination = Some(TerminationReason::Timeout);
                break;
            }

            let children = self.resolve_children(&frame.tx, cfg, deadline).await;

            let mut candidates: Vec<(Transaction, Verdict)> = Vec::with_capacity(children.len());
            for child in children {
                if Instant::now() >= deadline {
                    state.termination = Some(TerminationReason::Timeout);
                    break;
                }
                let verdict = self.classify_memo(state, &child);
                candidates.push((child, verdict));
            }
            if state.termination.is_some() {
                break;
            }

            // Branch selection: positives first, higher score first, then
            // ascending txid so the walk is deterministic.
            candidates.sort_by(|a, b| {
                b.1
                    .is_coinjoin
                    .cmp(&a.1.is_coinjoin)
                    .then(
                        b.1
                            .score
                            .partial_cmp(&a.1.score)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
                    .then(a.0.txid.cmp(&b.0.txid))
            });
            candidates.truncate(cfg.max_branches_per_node);

            let mut pushed: Vec<Frame> = Vec::new();
            for (child, verdict) in candidates {
                if Instant::now() >= deadline {
                    state.termination = Some(TerminationReason::Timeout);
                    break;
                }

                let depth = frame.depth + 1;

                if state.visited.contains(&child.txid) {
                    // 이미 방문한 txid는 참조 리프로만 남긴다 (tree 유지)
                    let slot = state.push_slot(Slot {
                        tx: TxSummary::from(&child),
                        verdict,
                        depth,
                        is_reference: true,
                        children: Vec::new(),
                    });
                    state.slots[frame.slot].children.push(slot);
                    state.depth_reached = state.depth_reached.max(depth);
                    continue;
                }
                state.visited.insert(child.txid.clone());

                // Persist before the child can be scheduled for expansion.
                self.persist_child(state, &child, &verdict, cfg).await;

                let streak = if verdict.is_coinjoin {
                    state.coinjoin_found += 1;
                    0
                } else {
                    frame.streak + 1
                };
                state.last_streak = streak;

                let slot = state.push_slot(Slot {
                    tx: TxSummary::from(&child),
                    verdict,
                    depth,
                    is_reference: false,
                    children: Vec::new(),
                });
                state.slots[frame.slot].children.push(slot);
                state.node_count += 1;
                state.depth_reached = state.depth_reached.max(depth);

                if state.node_count >= cfg.max_total_nodes {
                    state.termination = Some(TerminationReason::NodeBudget);
                    break;
                }
                if streak >= cfg.consecutive_non_coinjoin_limit {
                    // the node that tipped the counter stays in the tree
                    state.termination = Some(TerminationReason::NonCoinjoinStreak);
                    break;
                }

                pushed.push(Frame {
                    slot,
                    depth,
                    streak,
                    tx: child,
                });
            }

            // LIFO: push in reverse so the best-ranked child is expanded first.
            for frame in pushed.into_iter().rev() {
                state.stack.push(frame);
            }
        }
    }

    /// Spending transactions of up to `max_outputs_per_tx` outputs, resolved
    /// by a bounded worker set. Unspent outputs and per-output failures are
    /// simply skipped.
    async fn resolve_children(
        &self,
        tx: &Transaction,
        cfg: &TracerSettings,
        deadline: Instant,
    ) -> Vec<Transaction> {
        let limiter = Arc::new(Semaphore::new(cfg.branch_workers.max(1)));

        let mut handles = Vec::new();
        for index in 0..tx.vout.len().min(cfg.max_outputs_per_tx) {
            if Instant::now() >= deadline {
                break;
            }
            let explorer = self.explorer.clone();
            let limiter = limiter.clone();
            let txid = tx.txid.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok()?;
                match explorer.get_spending_tx(&txid, index as u32).await {
                    Ok(spender) => spender,
                    Err(e) => {
                        debug!("[Tracer] outspend {}:{} failed: {}", txid, index, e);
                        None
                    }
                }
            }));
        }

        let mut spenders: Vec<String> = Vec::new();
        for handle in handles {
            if let Ok(Some(spender)) = handle.await {
                if !spenders.contains(&spender) {
                    spenders.push(spender);
                }
            }
        }

        let mut handles = Vec::new();
        for spender in spenders {
            if Instant::now() >= deadline {
                break;
            }
            let explorer = self.explorer.clone();
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok()?;
                match explorer.get_tx(&spender).await {
                    Ok(tx) => Some(tx),
                    Err(e) => {
                        // permanent failures become terminal leaves, never abort the tree
                        debug!("[Tracer] child {} unavailable: {}", spender, e);
                        None
                    }
                }
            }));
        }

        let mut children = Vec::new();
        for handle in handles {
            if let Ok(Some(child)) = handle.await {
                children.push(child);
            }
        }
        children
    }

    fn classify_memo(&self, state: &mut RunState, tx: &Transaction) -> Verdict {
        if let Some(verdict) = state.verdicts.get(&tx.txid) {
            return verdict.clone();
        }
        let verdict = self.classifier.classify(tx);
        state.verdicts.insert(tx.txid.clone(), verdict.clone());
        verdict
    }

    /// Store writes for a traced child. Positives get coinjoin-tagged
    /// addresses and input/output edges; negatives are linked back to the
    /// seed as related. Store failures are logged and never fail the run.
    async fn persist_child(
        &self,
        state: &RunState,
        tx: &Transaction,
        verdict: &Verdict,
        cfg: &TracerSettings,
    ) {
        if let Err(e) = self.graph.merge_transaction(tx, verdict).await {
            error!("[Tracer] failed to persist {}: {}", tx.txid, e);
            return;
        }
        if verdict.is_coinjoin {
            self.persist_coinjoin_addresses(tx, cfg).await;
        } else {
            for address in dedup(tx.input_addresses())
                .into_iter()
                .chain(dedup(tx.output_addresses()))
                .take(cfg.max_outputs_per_tx)
            {
                if let Err(e) = self.graph.merge_address(&address, AddressTag::Related).await {
                    error!("[Tracer] failed to merge address {}: {}", address, e);
                    continue;
                }
                let _ = self.graph.link_related(&address, &state.seed_txid).await;
            }
        }
    }

    async fn persist_coinjoin_addresses(&self, tx: &Transaction, cfg: &TracerSettings) {
        for address in dedup(tx.input_addresses()).into_iter().take(cfg.max_outputs_per_tx) {
            if let Err(e) = self.graph.merge_address(&address, AddressTag::Coinjoin).await {
                error!("[Tracer] failed to merge address {}: {}", address, e);
                continue;
            }
            let _ = self.graph.link_input(&address, &tx.txid).await;
        }
        for address in dedup(tx.output_addresses()).into_iter().take(cfg.max_outputs_per_tx) {
            if let Err(e) = self.graph.merge_address(&address, AddressTag::Coinjoin).await {
                error!("[Tracer] failed to merge address {}: {}", address, e);
                continue;
            }
            let _ = self.graph.link_output(&tx.txid, &address).await;
        }
    }

    async fn finish(
        &self,
        state: RunState,
        root: &str,
        cfg: &TracerSettings,
        started: Instant,
        started_at: chrono::DateTime<Utc>,
    ) -> Investigation {
        let termination = state.termination.unwrap_or(if state.depth_pruned {
            TerminationReason::Depth
        } else {
            TerminationReason::Exhausted
        });

        let metadata = TraceMetadata {
            root: root.to_string(),
            max_depth: cfg.max_depth,
            max_total_nodes: cfg.max_total_nodes,
            depth_reached: state.depth_reached,
            node_count: state.node_count,
            coinjoin_found: state.coinjoin_found,
            non_coinjoin_streak: state.last_streak,
            duration_ms: started.elapsed().as_millis() as u64,
            termination,
            started_at,
        };

        if let Err(e) = self.graph.record_investigation(&metadata).await {
            error!("[Tracer] failed to record investigation {}: {}", root, e);
        }

        info!(
            "[Tracer] ✅ {} finished: {} nodes, depth {}, {} coinjoin, {} ({} ms)",
            root,
            metadata.node_count,
            metadata.depth_reached,
            metadata.coinjoin_found,
            termination.as_str(),
            metadata.duration_ms
        );

        let RunState { slots, roots, .. } = state;
        Investigation {
            roots: assemble(slots, &roots),
            metadata,
        }
    }
}

fn dedup(addresses: Vec<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|a| seen.insert(a.to_string()))
        .map(|a| a.to_string())
        .collect()
}

/// Turns the flat slot arena into nested trees. Children always carry a
/// larger index than their parent, so one reverse pass suffices.
fn assemble(slots: Vec<Slot>, roots: &[usize]) -> Vec<TraceNode> {
    let mut pending: Vec<Option<Slot>> = slots.into_iter().map(Some).collect();
    let mut built: Vec<Option<TraceNode>> = (0..pending.len()).map(|_| None).collect();

    for index in (0..pending.len()).rev() {
        if let Some(slot) = pending[index].take() {
            let children: Vec<TraceNode> = slot
                .children
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[index] = Some(TraceNode {
                tx: slot.tx,
                verdict: slot.verdict,
                depth: slot.depth,
                is_reference: slot.is_reference,
                children,
            });
        }
    }

    roots
        .iter()
        .filter_map(|&root| built[root].take())
        .collect()
}

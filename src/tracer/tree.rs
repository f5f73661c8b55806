use crate::detector::Verdict;
use crate::explorer::model::Transaction;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Compact transaction view carried by tree nodes.
#[derive(Debug, Clone, Serialize)]
pub struct TxSummary {
    pub txid: String,
    pub vin_count: usize,
    pub vout_count: usize,
    pub fee: u64,
    pub size: u64,
}

impl From<&Transaction> for TxSummary {
    fn from(tx: &Transaction) -> Self {
        Self {
            txid: tx.txid.clone(),
            vin_count: tx.vin.len(),
            vout_count: tx.vout.len(),
            fee: tx.fee,
            size: tx.size,
        }
    }
}

/// One node of an investigation tree. A txid reached a second time in the
/// same run becomes a reference leaf, so the output stays a tree.
#[derive(Debug, Clone, Serialize)]
pub struct TraceNode {
    pub tx: TxSummary,
    pub verdict: Verdict,
    pub depth: u32,
    pub is_reference: bool,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    pub fn max_depth(&self) -> u32 {
        self.children
            .iter()
            .map(|c| c.max_depth())
            .max()
            .unwrap_or(self.depth)
    }

    /// Internal (non-reference) nodes in this subtree.
    pub fn node_count(&self) -> usize {
        let own = if self.is_reference { 0 } else { 1 };
        own + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Exhausted,
    Depth,
    NodeBudget,
    Timeout,
    NonCoinjoinStreak,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Exhausted => "exhausted",
            TerminationReason::Depth => "depth",
            TerminationReason::NodeBudget => "node_budget",
            TerminationReason::Timeout => "timeout",
            TerminationReason::NonCoinjoinStreak => "non_coinjoin_streak",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceMetadata {
    /// Seed txid or address
    pub root: String,
    pub max_depth: u32,
    pub max_total_nodes: usize,
    pub depth_reached: u32,
    pub node_count: usize,
    pub coinjoin_found: usize,
    /// Consecutive non-CoinJoin counter at termination
    pub non_coinjoin_streak: u32,
    pub duration_ms: u64,
    pub termination: TerminationReason,
    pub started_at: DateTime<Utc>,
}

/// Per-request result: the discovered subtrees plus run metadata. Address
/// seeds fan out into several virtual roots; tx seeds have exactly one.
#[derive(Debug, Clone, Serialize)]
pub struct Investigation {
    pub roots: Vec<TraceNode>,
    pub metadata: TraceMetadata,
}

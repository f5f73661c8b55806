use crate::detector::Verdict;
use crate::explorer::model::Transaction;
use crate::tracer::tree::TraceMetadata;
use crate::types::AppError;

use async_trait::async_trait;
use serde::Serialize;

/// Classification tag on an Address node. Promotion is monotone:
/// `related` may become `coinjoin`, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressTag {
    Related,
    Coinjoin,
}

impl AddressTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressTag::Related => "related",
            AddressTag::Coinjoin => "coinjoin",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphHealth {
    pub connected: bool,
    pub transactions: u64,
    pub addresses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    pub coinjoin_transactions: u64,
    pub coinjoin_addresses: u64,
    pub related_addresses: u64,
    /// detection_method -> count, most frequent first
    pub detection_methods: Vec<(String, u64)>,
}

/// Idempotent writes into the labelled-property graph. Every operation is
/// one transaction against the store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn merge_transaction(&self, tx: &Transaction, verdict: &Verdict) -> Result<(), AppError>;

    async fn merge_address(&self, address: &str, tag: AddressTag) -> Result<(), AppError>;

    async fn link_input(&self, address: &str, txid: &str) -> Result<(), AppError>;

    async fn link_output(&self, txid: &str, address: &str) -> Result<(), AppError>;

    async fn link_related(&self, address: &str, txid: &str) -> Result<(), AppError>;

    async fn record_investigation(&self, meta: &TraceMetadata) -> Result<(), AppError>;

    async fn health(&self) -> GraphHealth;

    async fn statistics(&self) -> Result<GraphStatistics, AppError>;

    /// Coinjoin txids an address participates in, most recent first.
    async fn find_by_address(&self, address: &str) -> Result<Vec<String>, AppError>;
}

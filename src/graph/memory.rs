use crate::detector::Verdict;
use crate::explorer::model::Transaction;
use crate::graph::store::{AddressTag, GraphHealth, GraphStatistics, GraphStore};
use crate::tracer::tree::TraceMetadata;
use crate::types::AppError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory graph backend. Used by tests and offline runs; mirrors the
/// merge semantics of the Neo4j writer.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    transactions: Arc<RwLock<HashMap<String, StoredTransaction>>>,
    addresses: Arc<RwLock<HashMap<String, StoredAddress>>>,
    // (relation, from, to)
    edges: Arc<RwLock<HashSet<(String, String, String)>>>,
    investigations: Arc<RwLock<Vec<TraceMetadata>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub txid: String,
    pub is_coinjoin: bool,
    pub detection_method: String,
    pub score: f64,
    pub fee: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct StoredAddress {
    pub tag: AddressTag,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction(&self, txid: &str) -> Option<StoredTransaction> {
        self.transactions.read().await.get(txid).cloned()
    }

    pub async fn address_tag(&self, address: &str) -> Option<AddressTag> {
        self.addresses.read().await.get(address).map(|a| a.tag)
    }

    pub async fn has_edge(&self, relation: &str, from: &str, to: &str) -> bool {
        self.edges
            .read()
            .await
            .contains(&(relation.to_string(), from.to_string(), to.to_string()))
    }

    pub async fn edge_count(&self) -> usize {
        self.edges.read().await.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn investigation_count(&self) -> usize {
        self.investigations.read().await.len()
    }

    async fn put_edge(&self, relation: &str, from: &str, to: &str) {
        let mut edges = self.edges.write().await;
        edges.insert((relation.to_string(), from.to_string(), to.to_string()));
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn merge_transaction(&self, tx: &Transaction, verdict: &Verdict) -> Result<(), AppError> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(
            tx.txid.clone(),
            StoredTransaction {
                txid: tx.txid.clone(),
                is_coinjoin: verdict.is_coinjoin,
                detection_method: verdict.detection_method.as_str().to_string(),
                score: verdict.score,
                fee: tx.fee,
                size: tx.size,
            },
        );
        Ok(())
    }

    async fn merge_address(&self, address: &str, tag: AddressTag) -> Result<(), AppError> {
        let now = Utc::now();
        let mut addresses = self.addresses.write().await;
        match addresses.get_mut(address) {
            Some(existing) => {
                existing.last_seen = now;
                // coinjoin은 내려가지 않는다
                if existing.tag != AddressTag::Coinjoin {
                    existing.tag = tag;
                }
            }
            None => {
                addresses.insert(
                    address.to_string(),
                    StoredAddress {
                        tag,
                        first_seen: now,
                        last_seen: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn link_input(&self, address: &str, txid: &str) -> Result<(), AppError> {
        self.put_edge("INPUT_TO", address, txid).await;
        Ok(())
    }

    async fn link_output(&self, txid: &str, address: &str) -> Result<(), AppError> {
        self.put_edge("OUTPUT_TO", txid, address).await;
        Ok(())
    }

    async fn link_related(&self, address: &str, txid: &str) -> Result<(), AppError> {
        self.put_edge("RELATED_TO", address, txid).await;
        Ok(())
    }

    async fn record_investigation(&self, meta: &TraceMetadata) -> Result<(), AppError> {
        self.investigations.write().await.push(meta.clone());
        Ok(())
    }

    async fn health(&self) -> GraphHealth {
        GraphHealth {
            connected: true,
            transactions: self.transactions.read().await.len() as u64,
            addresses: self.addresses.read().await.len() as u64,
        }
    }

    async fn statistics(&self) -> Result<GraphStatistics, AppError> {
        let transactions = self.transactions.read().await;
        let addresses = self.addresses.read().await;

        let coinjoin_transactions = transactions.values().filter(|t| t.is_coinjoin).count() as u64;
        let coinjoin_addresses = addresses
            .values()
            .filter(|a| a.tag == AddressTag::Coinjoin)
            .count() as u64;
        let related_addresses = addresses
            .values()
            .filter(|a| a.tag == AddressTag::Related)
            .count() as u64;

        let mut by_method: HashMap<String, u64> = HashMap::new();
        for tx in transactions.values().filter(|t| t.is_coinjoin) {
            *by_method.entry(tx.detection_method.clone()).or_insert(0) += 1;
        }
        let mut detection_methods: Vec<(String, u64)> = by_method.into_iter().collect();
        detection_methods.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(GraphStatistics {
            coinjoin_transactions,
            coinjoin_addresses,
            related_addresses,
            detection_methods,
        })
    }

    async fn find_by_address(&self, address: &str) -> Result<Vec<String>, AppError> {
        let edges = self.edges.read().await;
        let transactions = self.transactions.read().await;

        let mut txids: Vec<String> = edges
            .iter()
            .filter_map(|(relation, from, to)| match relation.as_str() {
                "INPUT_TO" | "RELATED_TO" if from == address => Some(to.clone()),
                "OUTPUT_TO" if to == address => Some(from.clone()),
                _ => None,
            })
            .filter(|txid| {
                transactions
                    .get(txid)
                    .map(|t| t.is_coinjoin)
                    .unwrap_or(false)
            })
            .collect();
        txids.sort();
        txids.dedup();
        Ok(txids)
    }
}

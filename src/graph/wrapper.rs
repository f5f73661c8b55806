use crate::config::StoreSettings;
use crate::detector::Verdict;
use crate::explorer::model::Transaction;
use crate::graph::memory::MemoryGraph;
use crate::graph::neo4j::Neo4jGraph;
use crate::graph::store::{AddressTag, GraphHealth, GraphStatistics, GraphStore};
use crate::tracer::tree::TraceMetadata;
use crate::types::AppError;

use async_trait::async_trait;
use std::sync::Arc;

/// Graph wrapper - 설정에 따라 적절한 backend를 선택
pub enum GraphWrapper {
    Memory(Arc<MemoryGraph>),
    Neo4j(Arc<Neo4jGraph>),
}

impl GraphWrapper {
    pub async fn from_settings(settings: &StoreSettings) -> Result<Self, AppError> {
        if settings.memory_graph {
            Ok(GraphWrapper::Memory(Arc::new(MemoryGraph::new())))
        } else {
            let graph = Neo4jGraph::connect(settings).await?;
            Ok(GraphWrapper::Neo4j(Arc::new(graph)))
        }
    }

    pub fn memory(graph: Arc<MemoryGraph>) -> Self {
        GraphWrapper::Memory(graph)
    }
}

#[async_trait]
impl GraphStore for GraphWrapper {
    async fn merge_transaction(&self, tx: &Transaction, verdict: &Verdict) -> Result<(), AppError> {
        match self {
            GraphWrapper::Memory(g) => g.merge_transaction(tx, verdict).await,
            GraphWrapper::Neo4j(g) => g.merge_transaction(tx, verdict).await,
        }
    }

    async fn merge_address(&self, address: &str, tag: AddressTag) -> Result<(), AppError> {
        match self {
            GraphWrapper::Memory(g) => g.merge_address(address, tag).await,
            GraphWrapper::Neo4j(g) => g.merge_address(address, tag).await,
        }
    }

    async fn link_input(&self, address: &str, txid: &str) -> Result<(), AppError> {
        match self {
            GraphWrapper::Memory(g) => g.link_input(address, txid).await,
            GraphWrapper::Neo4j(g) => g.link_input(address, txid).await,
        }
    }

    async fn link_output(&self, txid: &str, address: &str) -> Result<(), AppError> {
        match self {
            GraphWrapper::Memory(g) => g.link_output(txid, address).await,
            GraphWrapper::Neo4j(g) => g.link_output(txid, address).await,
        }
    }

    async fn link_related(&self, address: &str, txid: &str) -> Result<(), AppError> {
        match self {
            GraphWrapper::Memory(g) => g.link_related(address, txid).await,
            GraphWrapper::Neo4j(g) => g.link_related(address, txid).await,
        }
    }

    async fn record_investigation(&self, meta: &TraceMetadata) -> Result<(), AppError> {
        match self {
            GraphWrapper::Memory(g) => g.record_investigation(meta).await,
            GraphWrapper::Neo4j(g) => g.record_investigation(meta).await,
        }
    }

    async fn health(&self) -> GraphHealth {
        match self {
            GraphWrapper::Memory(g) => g.health().await,
            GraphWrapper::Neo4j(g) => g.health().await,
        }
    }

    async fn statistics(&self) -> Result<GraphStatistics, AppError> {
        match self {
            GraphWrapper::Memory(g) => g.statistics().await,
            GraphWrapper::Neo4j(g) => g.statistics().await,
        }
    }

    async fn find_by_address(&self, address: &str) -> Result<Vec<String>, AppError> {
        match self {
            GraphWrapper::Memory(g) => g.find_by_address(address).await,
            GraphWrapper::Neo4j(g) => g.find_by_address(address).await,
        }
    }
}

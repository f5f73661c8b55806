use crate::config::StoreSettings;
use crate::detector::Verdict;
use crate::explorer::model::Transaction;
use crate::graph::store::{AddressTag, GraphHealth, GraphStatistics, GraphStore};
use crate::tracer::tree::TraceMetadata;
use crate::types::AppError;

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use neo4rs::{query, Graph};

/// Neo4j-backed graph writer. Nodes are MERGEd by key, so every write is
/// idempotent; failures surface as `StoreUnavailable`.
pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    pub async fn connect(settings: &StoreSettings) -> Result<Self, AppError> {
        let graph = Graph::new(&settings.uri, &settings.user, &settings.password)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("connect {}: {}", settings.uri, e)))?;

        // 연결 확인
        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("ping failed: {}", e)))?;

        info!("[GraphWriter] ✅ connected to {}", settings.uri);
        Ok(Self { graph })
    }

    async fn count(&self, cypher: &str) -> Result<u64, AppError> {
        let mut stream = self.graph.execute(query(cypher)).await?;
        let count = match stream.next().await? {
            Some(row) => row.get::<i64>("c").unwrap_or(0),
            None => 0,
        };
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn merge_transaction(&self, tx: &Transaction, verdict: &Verdict) -> Result<(), AppError> {
        let q = query(
            "MERGE (t:Transaction {txid: $txid})
             SET t.is_coinjoin = $is_coinjoin,
                 t.detection_method = $method,
                 t.score = $score,
                 t.fee = $fee,
                 t.size = $size,
                 t.last_updated = $now",
        )
        .param("txid", tx.txid.as_str())
        .param("is_coinjoin", verdict.is_coinjoin)
        .param("method", verdict.detection_method.as_str())
        .param("score", verdict.score)
        .param("fee", tx.fee as i64)
        .param("size", tx.size as i64)
        .param("now", Utc::now().to_rfc3339());

        self.graph.run(q).await?;
        Ok(())
    }

    async fn merge_address(&self, address: &str, tag: AddressTag) -> Result<(), AppError> {
        // coinjoin은 유지, 그 외에는 전달된 tag로 갱신 (monotone promotion)
        let q = query(
            "MERGE (a:Address {address: $address})
             ON CREATE SET a.first_seen = $now, a.tag = $tag
             SET a.last_seen = $now,
                 a.tag = CASE WHEN a.tag = 'coinjoin' THEN 'coinjoin' ELSE $tag END",
        )
        .param("address", address)
        .param("tag", tag.as_str())
        .param("now", Utc::now().to_rfc3339());

        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_input(&self, address: &str, txid: &str) -> Result<(), AppError> {
        let q = query(
            "MATCH (a:Address {address: $address})
             MATCH (t:Transaction {txid: $txid})
             MERGE (a)-[:INPUT_TO]->(t)",
        )
        .param("address", address)
        .param("txid", txid);

        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_output(&self, txid: &str, address: &str) -> Result<(), AppError> {
        let q = query(
            "MATCH (t:Transaction {txid: $txid})
             MATCH (a:Address {address: $address})
             MERGE (t)-[:OUTPUT_TO]->(a)",
        )
        .param("txid", txid)
        .param("address", address);

        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_related(&self, address: &str, txid: &str) -> Result<(), AppError> {
        let q = query(
            "MATCH (a:Address {address: $address})
             MATCH (t:Transaction {txid: $txid})
             MERGE (a)-[:RELATED_TO]->(t)",
        )
        .param("address", address)
        .param("txid", txid);

        self.graph.run(q).await?;
        Ok(())
    }

    async fn record_investigation(&self, meta: &TraceMetadata) -> Result<(), AppError> {
        let q = query(
            "CREATE (i:Investigation {
                root: $root,
                started_at: $started_at,
                depth_reached: $depth_reached,
                node_count: $node_count,
                coinjoin_found: $coinjoin_found,
                duration_ms: $duration_ms,
                termination: $termination
            })",
        )
        .param("root", meta.root.as_str())
        .param("started_at", meta.started_at.to_rfc3339())
        .param("depth_reached", meta.depth_reached as i64)
        .param("node_count", meta.node_count as i64)
        .param("coinjoin_found", meta.coinjoin_found as i64)
        .param("duration_ms", meta.duration_ms as i64)
        .param("termination", meta.termination.as_str());

        self.graph.run(q).await?;
        Ok(())
    }

    async fn health(&self) -> GraphHealth {
        let transactions = self.count("MATCH (t:Transaction) RETURN count(t) AS c").await;
        let addresses = self.count("MATCH (a:Address) RETURN count(a) AS c").await;

        match (transactions, addresses) {
            (Ok(transactions), Ok(addresses)) => GraphHealth {
                connected: true,
                transactions,
                addresses,
            },
            _ => {
                warn!("[GraphWriter] health check failed");
                GraphHealth {
                    connected: false,
                    transactions: 0,
                    addresses: 0,
                }
            }
        }
    }

    async fn statistics(&self) -> Result<GraphStatistics, AppError> {
        let coinjoin_transactions = self
            .count("MATCH (t:Transaction {is_coinjoin: true}) RETURN count(t) AS c")
            .await?;
        let coinjoin_addresses = self
            .count("MATCH (a:Address {tag: 'coinjoin'}) RETURN count(a) AS c")
            .await?;
        let related_addresses = self
            .count("MATCH (a:Address {tag: 'related'}) RETURN count(a) AS c")
            .await?;

        let mut detection_methods = Vec::new();
        let mut stream = self
            .graph
            .execute(query(
                "MATCH (t:Transaction {is_coinjoin: true})
                 RETURN t.detection_method AS method, count(t) AS c
                 ORDER BY c DESC",
            ))
            .await?;
        while let Some(row) = stream.next().await? {
            let method: String = row.get("method").unwrap_or_default();
            let count: i64 = row.get("c").unwrap_or(0);
            detection_methods.push((method, count.max(0) as u64));
        }

        Ok(GraphStatistics {
            coinjoin_transactions,
            coinjoin_addresses,
            related_addresses,
            detection_methods,
        })
    }

    async fn find_by_address(&self, address: &str) -> Result<Vec<String>, AppError> {
        let mut stream = self
            .graph
            .execute(
                query(
                    "MATCH (a:Address {address: $address})-[:INPUT_TO|OUTPUT_TO|RELATED_TO]-(t:Transaction {is_coinjoin: true})
                     RETURN DISTINCT t.txid AS txid, t.last_updated AS last_updated
                     ORDER BY last_updated DESC
                     LIMIT 50",
                )
                .param("address", address),
            )
            .await?;

        let mut txids = Vec::new();
        while let Some(row) = stream.next().await? {
            if let Ok(txid) = row.get::<String>("txid") {
                txids.push(txid);
            }
        }
        Ok(txids)
    }
}

use crate::cache::{CacheStatus, TxCache};
use crate::config::Settings;
use crate::detector::{Classifier, Verdict};
use crate::explorer::client::{CachedExplorer, EsploraClient, ExplorerApi};
use crate::graph::{GraphHealth, GraphStatistics, GraphStore, GraphWrapper};
use crate::monitor::{MempoolMonitor, MonitorStatus};
use crate::tracer::{Investigation, Tracer};
use crate::types::AppError;

use log::info;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Result of an on-demand transaction investigation: the seed's verdict
/// plus the discovered tree.
#[derive(Debug, Clone, Serialize)]
pub struct TxInvestigation {
    pub verdict: Option<Verdict>,
    pub investigation: Investigation,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub store: GraphHealth,
    pub monitor: MonitorStatus,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub graph: GraphStatistics,
    pub monitor: MonitorStatus,
}

/// Owns the long-lived singletons and serves on-demand investigations. The
/// REST surface is a thin wrapper over these operations.
pub struct Engine {
    cache: Arc<TxCache>,
    classifier: Arc<Classifier>,
    graph: Arc<GraphWrapper>,
    tracer: Arc<Tracer>,
    monitor: MempoolMonitor,
    investigations: Semaphore,
    reject_when_busy: bool,
}

impl Engine {
    pub async fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let graph = Arc::new(GraphWrapper::from_settings(&settings.store).await?);
        let cache = Arc::new(TxCache::new(&settings.cache));
        let client = Arc::new(EsploraClient::new(&settings.explorer));
        let explorer: Arc<dyn ExplorerApi> =
            Arc::new(CachedExplorer::new(client, cache.clone()));
        let classifier = Arc::new(Classifier::from_settings(&settings.classifier));

        Ok(Self::assemble(explorer, cache, classifier, graph, settings))
    }

    /// Wiring seam for tests: any explorer/graph combination.
    pub fn with_components(
        explorer: Arc<dyn ExplorerApi>,
        graph: Arc<GraphWrapper>,
        settings: &Settings,
    ) -> Self {
        let cache = Arc::new(TxCache::new(&settings.cache));
        let classifier = Arc::new(Classifier::from_settings(&settings.classifier));
        Self::assemble(explorer, cache, classifier, graph, settings)
    }

    fn assemble(
        explorer: Arc<dyn ExplorerApi>,
        cache: Arc<TxCache>,
        classifier: Arc<Classifier>,
        graph: Arc<GraphWrapper>,
        settings: &Settings,
    ) -> Self {
        let tracer = Arc::new(Tracer::new(
            explorer.clone(),
            classifier.clone(),
            graph.clone(),
            settings.tracer.clone(),
        ));
        let monitor = MempoolMonitor::new(
            explorer,
            classifier.clone(),
            tracer.clone(),
            settings.monitor.clone(),
        );

        Self {
            cache,
            classifier,
            graph,
            tracer,
            monitor,
            investigations: Semaphore::new(settings.tracer.max_concurrent_investigations.max(1)),
            reject_when_busy: settings.tracer.reject_when_busy,
        }
    }

    async fn admit(&self) -> Result<SemaphorePermit<'_>, AppError> {
        if self.reject_when_busy {
            self.investigations.try_acquire().map_err(|_| AppError::Busy)
        } else {
            self.investigations.acquire().await.map_err(|_| AppError::Busy)
        }
    }

    pub async fn investigate_tx(
        &self,
        txid: &str,
        max_depth: Option<u32>,
    ) -> Result<TxInvestigation, AppError> {
        let _permit = self.admit().await?;
        info!("[Engine] investigate tx {}", txid);

        let investigation = self.tracer.trace_tx(txid, max_depth).await?;
        let verdict = investigation.roots.first().map(|root| root.verdict.clone());
        Ok(TxInvestigation {
            verdict,
            investigation,
        })
    }

    pub async fn investigate_address(
        &self,
        address: &str,
        max_depth: Option<u32>,
    ) -> Result<Investigation, AppError> {
        let _permit = self.admit().await?;
        info!("[Engine] investigate address {}", address);

        self.tracer.trace_address(address, max_depth).await
    }

    pub fn monitor(&self) -> &MempoolMonitor {
        &self.monitor
    }

    pub fn ml_available(&self) -> bool {
        self.classifier.ml_available()
    }

    pub async fn health(&self) -> EngineHealth {
        EngineHealth {
            store: self.graph.health().await,
            monitor: self.monitor.status(),
            cache: self.cache.status(),
        }
    }

    pub async fn statistics(&self) -> Result<EngineStatistics, AppError> {
        Ok(EngineStatistics {
            graph: self.graph.statistics().await?,
            monitor: self.monitor.status(),
        })
    }

    pub async fn find_by_address(&self, address: &str) -> Result<Vec<String>, AppError> {
        self.graph.find_by_address(address).await
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.cache.status()
    }

    pub fn cache_clear(&self) {
        self.cache.clear();
    }

    pub fn cache_cleanup(&self) -> usize {
        self.cache.cleanup()
    }
}

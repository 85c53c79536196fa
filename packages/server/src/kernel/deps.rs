//! Server dependencies (using traits for testability)
//!
//! Central container for the external collaborators. Production wires the
//! Postgres store and reqwest clients; tests wire the doubles from
//! `test_dependencies`.

use std::sync::Arc;

use crate::domains::crawl_jobs::{
    CrawlJobLifecycle, LifecycleConfig, StalenessConfig, StalenessDetector,
};
use crate::kernel::{BaseCrawlJobStore, BaseCrawlWorker, BaseSiteProbe};

#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseCrawlJobStore>,
    pub worker: Arc<dyn BaseCrawlWorker>,
    pub probe: Arc<dyn BaseSiteProbe>,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseCrawlJobStore>,
        worker: Arc<dyn BaseCrawlWorker>,
        probe: Arc<dyn BaseSiteProbe>,
    ) -> Self {
        Self {
            store,
            worker,
            probe,
        }
    }

    pub fn lifecycle(&self, config: LifecycleConfig) -> CrawlJobLifecycle {
        CrawlJobLifecycle::new(self.store.clone(), self.worker.clone(), config)
    }

    pub fn staleness_detector(&self, config: StalenessConfig) -> StalenessDetector {
        StalenessDetector::new(self.store.clone(), self.probe.clone(), config)
    }
}

//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod scheduled_tasks;
pub mod site_probe;
pub mod test_dependencies;
pub mod traits;
pub mod worker_client;

pub use deps::ServerDeps;
pub use scheduled_tasks::start_scheduler;
pub use site_probe::HttpSiteProbe;
pub use test_dependencies::{
    InMemoryCrawlJobStore, MockCrawlWorker, MockSiteProbe, TestDependencies,
};
pub use traits::*;
pub use worker_client::{CrawlWorkerClient, WorkerClientConfig, DEFAULT_WORKER_BASE_URL};

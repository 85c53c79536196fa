mod crawl_job;

pub use crawl_job::{CrawlJob, CrawlJobStatus, JobAction, JobTransition};

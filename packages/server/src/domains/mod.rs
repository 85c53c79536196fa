// Business domains
pub mod auth;
pub mod crawl_jobs;

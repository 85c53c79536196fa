// Crawl Tracker - API Core
//
// Tracks asynchronous crawl jobs delegated to an external crawl worker,
// reconciles their status, and flags completed results whose origin changed.
//
// Domains live under domains/*; external collaborators are injected through
// the traits in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;

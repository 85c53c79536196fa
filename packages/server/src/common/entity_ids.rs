//! Typed ID definitions for the entities this service tracks.

pub use super::id::Id;

/// Marker type for crawl job rows.
pub struct CrawlJob;

/// Marker type for the identity provider's users (job owners).
pub struct Owner;

pub type CrawlJobId = Id<CrawlJob>;

pub type OwnerId = Id<Owner>;

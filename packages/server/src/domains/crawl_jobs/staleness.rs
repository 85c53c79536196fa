//! Staleness detection for completed crawl jobs.
//!
//! Runs in system context across every owner:
//!
//! ```text
//! latest completed job per target URL
//!     │
//!     └─► for each (sequential, `probe_delay` apart, `probe_timeout` each)
//!             ├─► HEAD target_url
//!             └─► compare ETag / Last-Modified with the stored validators
//!
//! flag all stale URLs concurrently, await all, report counts
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::errors::CrawlJobError;
use crate::kernel::{BaseCrawlJobStore, BaseSiteProbe, CacheValidators};

#[derive(Debug, Clone)]
pub struct StalenessConfig {
    /// Pause before each probe.
    pub probe_delay: Duration,
    /// Upper bound for a single probe.
    pub probe_timeout: Duration,
    /// Wall-clock budget for a whole batch; no new probe starts after it.
    pub budget: Duration,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            probe_delay: Duration::from_millis(200),
            probe_timeout: Duration::from_secs(15),
            budget: Duration::from_secs(60),
        }
    }
}

/// Counts returned to the scheduled trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessReport {
    pub sites_checked: usize,
    pub sites_updated: usize,
}

/// Parse an HTTP-date (RFC 7231 IMF-fixdate is RFC 2822 compatible) or RFC 3339 timestamp.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decide whether fresh origin validators indicate changed content.
///
/// Stale when both ETags are present and differ, or when both Last-Modified
/// values parse and the fresh one is strictly later. Without a stored
/// baseline nothing is ever flagged.
pub fn has_changed(stored: &CacheValidators, fresh: &CacheValidators) -> bool {
    let etag_changed = match (&stored.etag, &fresh.etag) {
        (Some(old), Some(new)) => old != new,
        _ => false,
    };

    let last_modified_changed = match (&stored.last_modified, &fresh.last_modified) {
        (Some(old), Some(new)) => match (parse_http_date(old), parse_http_date(new)) {
            (Some(old), Some(new)) => new > old,
            _ => false,
        },
        _ => false,
    };

    etag_changed || last_modified_changed
}

pub struct StalenessDetector {
    store: Arc<dyn BaseCrawlJobStore>,
    probe: Arc<dyn BaseSiteProbe>,
    config: StalenessConfig,
}

impl StalenessDetector {
    pub fn new(
        store: Arc<dyn BaseCrawlJobStore>,
        probe: Arc<dyn BaseSiteProbe>,
        config: StalenessConfig,
    ) -> Self {
        Self {
            store,
            probe,
            config,
        }
    }

    /// Scan the latest completed job of every URL and flag changed origins.
    ///
    /// Only a failure to load the candidate list is an error. Probe failures
    /// and individual flag writes are logged and skipped.
    pub async fn run(&self) -> Result<StalenessReport, CrawlJobError> {
        let started = Instant::now();
        let candidates = self.store.latest_completed_per_url().await?;

        info!(candidates = candidates.len(), "Checking sites for changes");

        let mut sites_checked = 0;
        let mut stale_urls = Vec::new();

        for job in &candidates {
            if started.elapsed() >= self.config.budget {
                warn!(
                    checked = sites_checked,
                    remaining = candidates.len() - sites_checked,
                    "Staleness budget exhausted, deferring remaining sites"
                );
                break;
            }

            tokio::time::sleep(self.config.probe_delay).await;
            sites_checked += 1;

            let fresh = match tokio::time::timeout(
                self.config.probe_timeout,
                self.probe.head(&job.target_url),
            )
            .await
            {
                Ok(Ok(validators)) => validators,
                Ok(Err(e)) => {
                    let err = CrawlJobError::ProbeFailure {
                        url: job.target_url.clone(),
                        reason: format!("{:#}", e),
                    };
                    warn!(job_id = %job.id, error = %err, "Probe failed, skipping");
                    continue;
                }
                Err(_) => {
                    let err = CrawlJobError::ProbeFailure {
                        url: job.target_url.clone(),
                        reason: format!("timed out after {:?}", self.config.probe_timeout),
                    };
                    warn!(job_id = %job.id, error = %err, "Probe timed out, skipping");
                    continue;
                }
            };

            if has_changed(&job.validators(), &fresh) {
                info!(job_id = %job.id, target_url = %job.target_url, "Origin changed, flagging job stale");
                stale_urls.push(job.target_url.clone());
            }
        }

        let writes = join_all(stale_urls.iter().map(|url| self.store.mark_stale_by_url(url))).await;
        for (url, write) in stale_urls.iter().zip(writes) {
            if let Err(e) = write {
                error!(target_url = %url, error = %e, "Failed to flag stale job");
            }
        }

        let report = StalenessReport {
            sites_checked,
            sites_updated: stale_urls.len(),
        };
        info!(
            sites_checked = report.sites_checked,
            sites_updated = report.sites_updated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Staleness check complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validators(etag: Option<&str>, last_modified: Option<&str>) -> CacheValidators {
        CacheValidators::new(etag.map(String::from), last_modified.map(String::from))
    }

    #[test]
    fn differing_etags_are_stale() {
        assert!(has_changed(
            &validators(Some("\"abc\""), None),
            &validators(Some("\"xyz\""), None)
        ));
    }

    #[test]
    fn identical_etags_are_fresh() {
        assert!(!has_changed(
            &validators(Some("\"abc\""), None),
            &validators(Some("\"abc\""), None)
        ));
    }

    #[test]
    fn missing_baseline_never_flags() {
        assert!(!has_changed(
            &validators(None, None),
            &validators(Some("\"xyz\""), Some("Wed, 21 Oct 2015 07:28:00 GMT"))
        ));
    }

    #[test]
    fn missing_fresh_etag_is_not_a_change() {
        assert!(!has_changed(
            &validators(Some("\"abc\""), None),
            &validators(None, None)
        ));
    }

    #[test]
    fn later_last_modified_is_stale() {
        assert!(has_changed(
            &validators(None, Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            &validators(None, Some("Thu, 22 Oct 2015 07:28:00 GMT"))
        ));
    }

    #[test]
    fn equal_or_earlier_last_modified_is_fresh() {
        let stored = validators(None, Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert!(!has_changed(
            &stored,
            &validators(None, Some("Wed, 21 Oct 2015 07:28:00 GMT"))
        ));
        assert!(!has_changed(
            &stored,
            &validators(None, Some("Tue, 20 Oct 2015 07:28:00 GMT"))
        ));
    }

    #[test]
    fn unparsable_last_modified_is_fresh() {
        assert!(!has_changed(
            &validators(None, Some("yesterday")),
            &validators(None, Some("Thu, 22 Oct 2015 07:28:00 GMT"))
        ));
    }

    #[test]
    fn parse_http_date_accepts_rfc3339() {
        let parsed = parse_http_date("2015-10-21T07:28:00Z").unwrap();
        assert_eq!(parsed, parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap());
    }

    #[test]
    fn report_serializes_camel_case() {
        let json = serde_json::to_value(StalenessReport {
            sites_checked: 3,
            sites_updated: 1,
        })
        .unwrap();
        assert_eq!(json["sitesChecked"], 3);
        assert_eq!(json["sitesUpdated"], 1);
    }
}

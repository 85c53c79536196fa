// TestDependencies - doubles for the external collaborators
//
// Provides a scripted crawl worker, a scripted site probe and an in-memory
// job store that can be injected into ServerDeps for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{
    BaseCrawlJobStore, BaseCrawlWorker, BaseSiteProbe, CacheValidators, PollOutcome, ServerDeps,
    SubmitOutcome,
};
use crate::common::{CrawlJobId, OwnerId};
use crate::domains::crawl_jobs::models::{CrawlJob, CrawlJobStatus, JobTransition};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Mock Crawl Worker
// =============================================================================

/// Scripted crawl worker.
///
/// Submissions pop queued outcomes and fall back to `Accepted` with a
/// generated `ext-N` id. Polls pop per-id queues and fall back to `Running`.
/// A submit gate holds every submission until permits are released.
pub struct MockCrawlWorker {
    submit_responses: Mutex<VecDeque<Result<SubmitOutcome, String>>>,
    poll_responses: Mutex<HashMap<String, VecDeque<Result<PollOutcome, String>>>>,
    submit_calls: Mutex<Vec<String>>,
    poll_calls: Mutex<Vec<String>>,
    submit_gate: Option<Arc<Semaphore>>,
    next_id: AtomicUsize,
}

impl Default for MockCrawlWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCrawlWorker {
    pub fn new() -> Self {
        Self {
            submit_responses: Mutex::new(VecDeque::new()),
            poll_responses: Mutex::new(HashMap::new()),
            submit_calls: Mutex::new(Vec::new()),
            poll_calls: Mutex::new(Vec::new()),
            submit_gate: None,
            next_id: AtomicUsize::new(1),
        }
    }

    /// Hold submissions until permits are added to the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.submit_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn with_accepted(self, external_job_id: &str) -> Self {
        lock(&self.submit_responses).push_back(Ok(SubmitOutcome::Accepted {
            external_job_id: external_job_id.to_string(),
        }));
        self
    }

    pub fn with_immediate_result(self, result: &str) -> Self {
        lock(&self.submit_responses).push_back(Ok(SubmitOutcome::CompletedImmediately {
            result: result.to_string(),
            validators: CacheValidators::default(),
        }));
        self
    }

    pub fn with_submit_error(self, message: &str) -> Self {
        lock(&self.submit_responses).push_back(Err(message.to_string()));
        self
    }

    pub fn with_poll(self, external_job_id: &str, outcome: PollOutcome) -> Self {
        self.push_poll(external_job_id, Ok(outcome));
        self
    }

    pub fn with_poll_error(self, external_job_id: &str, message: &str) -> Self {
        self.push_poll(external_job_id, Err(message.to_string()));
        self
    }

    fn push_poll(&self, external_job_id: &str, response: Result<PollOutcome, String>) {
        lock(&self.poll_responses)
            .entry(external_job_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// URLs submitted so far
    pub fn submit_calls(&self) -> Vec<String> {
        lock(&self.submit_calls).clone()
    }

    /// External ids polled so far
    pub fn poll_calls(&self) -> Vec<String> {
        lock(&self.poll_calls).clone()
    }
}

#[async_trait]
impl BaseCrawlWorker for MockCrawlWorker {
    async fn submit(&self, url: &str) -> Result<SubmitOutcome> {
        lock(&self.submit_calls).push(url.to_string());

        if let Some(gate) = &self.submit_gate {
            gate.acquire().await?.forget();
        }

        let scripted = lock(&self.submit_responses).pop_front();
        match scripted {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(SubmitOutcome::Accepted {
                external_job_id: format!("ext-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            }),
        }
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollOutcome> {
        lock(&self.poll_calls).push(external_job_id.to_string());

        let scripted = lock(&self.poll_responses)
            .get_mut(external_job_id)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(PollOutcome::Running),
        }
    }
}

// =============================================================================
// Mock Site Probe
// =============================================================================

#[derive(Clone)]
enum ProbeScript {
    Respond(CacheValidators),
    Fail(String),
    Hang,
}

/// Scripted origin probe. Unknown URLs answer with no validators.
pub struct MockSiteProbe {
    responses: Mutex<HashMap<String, ProbeScript>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockSiteProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSiteProbe {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_validators(self, url: &str, etag: Option<&str>, last_modified: Option<&str>) -> Self {
        lock(&self.responses).insert(
            url.to_string(),
            ProbeScript::Respond(CacheValidators::new(
                etag.map(String::from),
                last_modified.map(String::from),
            )),
        );
        self
    }

    pub fn with_failure(self, url: &str, message: &str) -> Self {
        lock(&self.responses).insert(url.to_string(), ProbeScript::Fail(message.to_string()));
        self
    }

    /// Never answer for `url`; exercises the per-probe timeout.
    pub fn with_hang(self, url: &str) -> Self {
        lock(&self.responses).insert(url.to_string(), ProbeScript::Hang);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl BaseSiteProbe for MockSiteProbe {
    async fn head(&self, url: &str) -> Result<CacheValidators> {
        lock(&self.calls).push(url.to_string());

        let script = lock(&self.responses).get(url).cloned();
        match script {
            Some(ProbeScript::Respond(validators)) => Ok(validators),
            Some(ProbeScript::Fail(message)) => Err(anyhow!(message)),
            Some(ProbeScript::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(anyhow!("probe never answered"))
            }
            None => Ok(CacheValidators::default()),
        }
    }
}

// =============================================================================
// In-memory Crawl Job Store
// =============================================================================

/// `BaseCrawlJobStore` over a map, with the same conditional-update rules as
/// the Postgres store.
#[derive(Default)]
pub struct InMemoryCrawlJobStore {
    jobs: RwLock<HashMap<CrawlJobId, CrawlJob>>,
    fail_writes: RwLock<bool>,
    fail_deletes: RwLock<bool>,
}

impl InMemoryCrawlJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job exactly as given (useful for back-dated fixtures).
    pub fn seed(&self, job: CrawlJob) -> CrawlJob {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: CrawlJobId) -> Option<CrawlJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn all(&self) -> Vec<CrawlJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.write().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// Make every subsequent delete fail, including the delete half of a
    /// retry replacement. Inserts and updates keep working.
    pub fn set_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(anyhow!("store unavailable"));
        }
        Ok(())
    }

    fn check_deletable(&self) -> Result<()> {
        self.check_writable()?;
        if *self.fail_deletes.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(anyhow!("delete failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl BaseCrawlJobStore for InMemoryCrawlJobStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, job: &CrawlJob) -> Result<CrawlJob> {
        self.check_writable()?;
        Ok(self.seed(job.clone()))
    }

    async fn find_for_owner(&self, id: CrawlJobId, owner_id: OwnerId) -> Result<Option<CrawlJob>> {
        Ok(self.get(id).filter(|job| job.owner_id == owner_id))
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<CrawlJob>> {
        let mut jobs: Vec<CrawlJob> = self
            .all()
            .into_iter()
            .filter(|job| job.owner_id == owner_id)
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn list_pending(&self, owner_id: Option<OwnerId>) -> Result<Vec<CrawlJob>> {
        let mut jobs: Vec<CrawlJob> = self
            .all()
            .into_iter()
            .filter(|job| job.status == CrawlJobStatus::Pending)
            .filter(|job| owner_id.map_or(true, |owner| job.owner_id == owner))
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn apply_transition(&self, id: CrawlJobId, transition: &JobTransition) -> Result<bool> {
        self.check_writable()?;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        Ok(jobs
            .get_mut(&id)
            .map(|job| job.apply(transition))
            .unwrap_or(false))
    }

    async fn replace_for_owner(
        &self,
        original: CrawlJobId,
        owner_id: OwnerId,
        replacement: &CrawlJob,
    ) -> Result<Option<CrawlJob>> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if !jobs.get(&original).is_some_and(|job| job.owner_id == owner_id) {
            return Ok(None);
        }
        self.check_deletable()?;

        jobs.remove(&original);
        jobs.insert(replacement.id, replacement.clone());
        Ok(Some(replacement.clone()))
    }

    async fn delete_for_owner(&self, id: CrawlJobId, owner_id: OwnerId) -> Result<bool> {
        self.check_deletable()?;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.get(&id) {
            Some(job) if job.owner_id == owner_id => {
                jobs.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn latest_completed_per_url(&self) -> Result<Vec<CrawlJob>> {
        let mut latest: HashMap<String, CrawlJob> = HashMap::new();
        for job in self.all() {
            if job.status != CrawlJobStatus::Completed || job.is_stale {
                continue;
            }
            let newer = latest
                .get(&job.target_url)
                .map_or(true, |current| (job.created_at, job.id) > (current.created_at, current.id));
            if newer {
                latest.insert(job.target_url.clone(), job);
            }
        }
        let mut jobs: Vec<CrawlJob> = latest.into_values().collect();
        jobs.sort_by(|a, b| a.target_url.cmp(&b.target_url));
        Ok(jobs)
    }

    async fn mark_stale_by_url(&self, target_url: &str) -> Result<u64> {
        self.check_writable()?;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut flagged = 0;
        for job in jobs.values_mut() {
            if job.target_url == target_url && job.status == CrawlJobStatus::Completed {
                job.is_stale = true;
                flagged += 1;
            }
        }
        Ok(flagged)
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Builder wiring doubles into `ServerDeps` while keeping typed handles for assertions.
pub struct TestDependencies {
    pub store: Arc<InMemoryCrawlJobStore>,
    pub worker: Arc<MockCrawlWorker>,
    pub probe: Arc<MockSiteProbe>,
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryCrawlJobStore::new()),
            worker: Arc::new(MockCrawlWorker::new()),
            probe: Arc::new(MockSiteProbe::new()),
        }
    }

    pub fn mock_worker(mut self, worker: MockCrawlWorker) -> Self {
        self.worker = Arc::new(worker);
        self
    }

    pub fn mock_probe(mut self, probe: MockSiteProbe) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn into_server_deps(&self) -> ServerDeps {
        ServerDeps::new(self.store.clone(), self.worker.clone(), self.probe.clone())
    }
}

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain_upload::{
    command::UploadEvent,
    exception::{UploadException, UploadResult},
    model::{
        entity::{SessionKey, UploadSession},
        vo::{
            ChunkProgress, CompletedUpload, MarkOutcome, QuotaDecision, SessionStatus, VideoRecord,
        },
    },
    repository::{ChunkTracker, SessionStore},
    service::{ArtifactStore, MessageQueueProducerTemplate, QuotaService, VideoCatalog},
};
use service_upload::{LocalCacheServiceImpl, RetryPolicy, UploadServiceImpl};
use tempfile::TempDir;

struct Entry {
    session: UploadSession,
    chunks: BTreeSet<u32>,
    lease_until: Option<Instant>,
    lease_owner: Option<String>,
    outcome: Option<CompletedUpload>,
    expires_at: Instant,
}

/// Session store and chunk tracker with the same atomicity as the scripted store, one lock per call.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
    next_lease: AtomicU64,
}

fn not_found(key: &SessionKey) -> UploadException {
    UploadException::SessionNotFound {
        session_id: key.session_id.to_owned(),
    }
}

impl MemoryStore {
    fn with_entry<T>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut Entry) -> UploadResult<T>,
    ) -> UploadResult<T> {
        let mut entries = self.entries.lock().unwrap();
        let expired = entries.get(key).map(|e| Instant::now() >= e.expires_at);
        match expired {
            None => Err(not_found(key)),
            Some(true) => {
                entries.remove(key);
                Err(not_found(key))
            }
            Some(false) => f(entries.get_mut(key).unwrap()),
        }
    }

    /// Run `f` on a session still processing under `lease`.
    fn with_lease(
        &self,
        key: &SessionKey,
        lease: &str,
        f: impl FnOnce(&mut Entry),
    ) -> UploadResult<()> {
        self.with_entry(key, |e| {
            if e.session.status != SessionStatus::Processing
                || e.lease_owner.as_deref() != Some(lease)
            {
                return Err(UploadException::LeaseLost {
                    session_id: key.session_id.to_owned(),
                });
            }
            f(e);
            Ok(())
        })
    }

    pub fn status(&self, key: &SessionKey) -> Option<SessionStatus> {
        self.entries.lock().unwrap().get(key).map(|e| e.session.status)
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &UploadSession, ttl_ms: i64) -> UploadResult<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(&session.key) {
            if Instant::now() < entry.expires_at {
                return Err(UploadException::AlreadyExists {
                    session_id: session.key.session_id.to_owned(),
                });
            }
        }
        entries.insert(
            session.key.to_owned(),
            Entry {
                session: session.to_owned(),
                chunks: BTreeSet::new(),
                lease_until: None,
                lease_owner: None,
                outcome: None,
                expires_at: Instant::now() + Duration::from_millis(ttl_ms as u64),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> UploadResult<(UploadSession, Option<CompletedUpload>)> {
        self.with_entry(key, |e| Ok((e.session.to_owned(), e.outcome.to_owned())))
    }

    async fn transition(
        &self,
        key: &SessionKey,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> UploadResult<SessionStatus> {
        self.with_entry(key, |e| {
            let previous = e.session.status;
            if !from.contains(&previous) {
                return Err(UploadException::InvalidStatus {
                    session_id: key.session_id.to_owned(),
                    status: previous,
                });
            }
            e.session.status = to;
            Ok(previous)
        })
    }

    async fn acquire_processing(&self, key: &SessionKey, lease_ms: i64) -> UploadResult<String> {
        let lease = format!("lease-{}", self.next_lease.fetch_add(1, Ordering::SeqCst));
        self.with_entry(key, |e| {
            let now = Instant::now();
            let stale = e.lease_until.map(|until| now >= until).unwrap_or(true);
            let acquirable = SessionStatus::MERGEABLE.contains(&e.session.status)
                || (e.session.status == SessionStatus::Processing && stale);
            if !acquirable {
                return Err(UploadException::InvalidStatus {
                    session_id: key.session_id.to_owned(),
                    status: e.session.status,
                });
            }
            e.session.status = SessionStatus::Processing;
            e.lease_until = Some(now + Duration::from_millis(lease_ms as u64));
            e.lease_owner = Some(lease.to_owned());
            Ok(lease)
        })
    }

    async fn renew_processing(&self, key: &SessionKey, lease: &str, lease_ms: i64) -> UploadResult<()> {
        self.with_lease(key, lease, |e| {
            e.lease_until = Some(Instant::now() + Duration::from_millis(lease_ms as u64));
        })
    }

    async fn complete(
        &self,
        key: &SessionKey,
        lease: &str,
        outcome: &CompletedUpload,
    ) -> UploadResult<()> {
        self.with_lease(key, lease, |e| {
            e.session.status = SessionStatus::Completed;
            e.lease_until = None;
            e.lease_owner = None;
            e.outcome = Some(outcome.to_owned());
        })
    }

    async fn fail_processing(&self, key: &SessionKey, lease: &str) -> UploadResult<()> {
        self.with_lease(key, lease, |e| {
            e.session.status = SessionStatus::Failed;
            e.lease_until = None;
            e.lease_owner = None;
        })
    }

    async fn delete(&self, key: &SessionKey) -> UploadResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[async_trait]
impl ChunkTracker for MemoryStore {
    async fn mark_chunk(&self, key: &SessionKey, nth: u32) -> UploadResult<MarkOutcome> {
        self.with_entry(key, |e| {
            let total_chunks = e.session.total_chunks;
            if nth == 0 || nth > total_chunks {
                return Err(UploadException::InvalidChunkNumber {
                    chunk_number: nth,
                    total_chunks,
                });
            }
            let added = e.chunks.insert(nth);
            let uploaded_count = e.chunks.len() as u32;
            let is_complete = uploaded_count == total_chunks;
            if e.session.status == SessionStatus::Pending {
                e.session.status = SessionStatus::Uploading;
            }
            if is_complete && e.session.status == SessionStatus::Uploading {
                e.session.status = SessionStatus::ReadyToMerge;
            }
            Ok(MarkOutcome {
                uploaded_count,
                total_chunks,
                already_marked: !added,
                is_complete,
            })
        })
    }

    async fn progress(&self, key: &SessionKey) -> UploadResult<ChunkProgress> {
        self.with_entry(key, |e| {
            Ok(ChunkProgress::from_members(
                e.session.total_chunks,
                e.chunks.iter().copied(),
            ))
        })
    }
}

/// Quota counter with a single limit shared by every owner.
pub struct MemoryQuota {
    limit: u64,
    used: Mutex<HashMap<i64, u64>>,
}

impl MemoryQuota {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: Mutex::new(HashMap::new()),
        }
    }

    pub fn used(&self, owner_id: i64) -> u64 {
        self.used.lock().unwrap().get(&owner_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QuotaService for MemoryQuota {
    async fn check_and_reserve(&self, owner_id: i64, bytes: u64) -> anyhow::Result<QuotaDecision> {
        let mut used = self.used.lock().unwrap();
        let current = used.entry(owner_id).or_default();
        if *current + bytes > self.limit {
            return Ok(QuotaDecision::Denied {
                reason: format!("{} of {} bytes used", current, self.limit),
            });
        }
        *current += bytes;
        Ok(QuotaDecision::Approved)
    }

    async fn release(&self, owner_id: i64, bytes: u64) -> anyhow::Result<()> {
        let mut used = self.used.lock().unwrap();
        let current = used.entry(owner_id).or_default();
        *current = current.saturating_sub(bytes);
        Ok(())
    }

    async fn settle(&self, owner_id: i64, reserved: u64, actual: u64) -> anyhow::Result<()> {
        let mut used = self.used.lock().unwrap();
        let current = used.entry(owner_id).or_default();
        *current = current.saturating_sub(reserved) + actual;
        Ok(())
    }
}

/// Object store keeping artifacts in memory; the first `failures` puts fail.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failures: AtomicU32,
    latency: Duration,
}

impl MemoryArtifactStore {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    /// Every put takes `latency` after reading the artifact.
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn object(&self, location: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(location).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put_artifact(
        &self,
        owner_id: i64,
        video_id: i64,
        local_path: &Path,
    ) -> anyhow::Result<String> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("object store unavailable");
        }
        let content = tokio::fs::read(local_path).await?;
        tokio::time::sleep(self.latency).await;
        let location = format!("memory://videos/{owner_id}/{video_id}/source.mp4");
        self.objects.lock().unwrap().insert(location.to_owned(), content);
        Ok(location)
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    next_id: AtomicI64,
    records: Mutex<Vec<(VideoRecord, String)>>,
}

impl MemoryCatalog {
    pub fn records(&self) -> Vec<(VideoRecord, String)> {
        self.records.lock().unwrap().to_owned()
    }
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn allocate_video_id(&self) -> anyhow::Result<i64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_video_record(&self, record: &VideoRecord, source_url: &str) -> anyhow::Result<i64> {
        self.records.lock().unwrap().push((record.to_owned(), source_url.to_owned()));
        Ok(record.video_id)
    }
}

#[derive(Default)]
pub struct RecordingProducer {
    events: Mutex<Vec<UploadEvent>>,
}

impl RecordingProducer {
    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().to_owned()
    }
}

#[async_trait]
impl MessageQueueProducerTemplate<UploadEvent> for RecordingProducer {
    async fn send_object(&self, content: &UploadEvent, _topic: &str) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(content.to_owned());
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<UploadServiceImpl>,
    pub store: Arc<MemoryStore>,
    pub quota: Arc<MemoryQuota>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub events: Arc<RecordingProducer>,
    pub base: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MemoryQuota::new(u64::MAX), MemoryArtifactStore::default())
    }

    pub fn with(quota: MemoryQuota, artifacts: MemoryArtifactStore) -> Self {
        Self::with_lease(quota, artifacts, 10 * 60 * 1000)
    }

    pub fn with_lease(
        quota: MemoryQuota,
        artifacts: MemoryArtifactStore,
        processing_lease_msecs: i64,
    ) -> Self {
        let base = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let quota = Arc::new(quota);
        let artifacts = Arc::new(artifacts);
        let catalog = Arc::new(MemoryCatalog::default());
        let events = Arc::new(RecordingProducer::default());
        let service = UploadServiceImpl::builder()
            .session_store(store.clone())
            .chunk_tracker(store.clone())
            .cache_service(Arc::new(
                LocalCacheServiceImpl::builder().base(base.path()).build(),
            ))
            .quota_service(quota.clone())
            .artifact_store(artifacts.clone())
            .catalog(catalog.clone())
            .event_producer(events.clone())
            .event_topic("upload_events")
            .chunk_size(4)
            .processing_lease_msecs(processing_lease_msecs)
            .retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_interval_ms: 1,
                max_interval_ms: 4,
                ..Default::default()
            })
            .build();
        Self {
            service: Arc::new(service),
            store,
            quota,
            artifacts,
            catalog,
            events,
            base,
        }
    }

    pub fn session_dir(&self, key: &SessionKey) -> std::path::PathBuf {
        self.base.path().join("multipart").join(key.tag())
    }

    /// Wait for the background cleanup of a completed session.
    pub async fn wait_reclaimed(&self, key: &SessionKey) {
        for _ in 0..200 {
            if !self.session_dir(key).exists() && !self.store.contains(key) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {key} was not reclaimed");
    }
}

pub fn checksum(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain_upload::{
    command::{StartUploadCommand, UploadChunkCommand, UploadEvent},
    exception::{UploadException, UploadResult},
    model::{
        entity::{SessionKey, UploadSession},
        vo::{
            CancelOutcome, ChecksumAlgorithm, Chunk, ChunkChecksum, ChunkReceipt, ChunkWrite,
            CleanupStatus, CompletedUpload, QuotaDecision, SessionStatus, StartedUpload,
            UploadProgress, VideoRecord,
        },
    },
    repository::{ChunkTracker, SessionStore},
    service::{
        ArtifactStore, ChunkCacheService, MessageQueueProducerTemplate, QuotaService,
        UploadService, VideoCatalog,
    },
};
use typed_builder::TypedBuilder;

use crate::retry::RetryPolicy;

const CATALOG_PUBLISHED: &str = "published";

#[derive(TypedBuilder)]
pub struct UploadServiceImpl {
    session_store: Arc<dyn SessionStore>,
    chunk_tracker: Arc<dyn ChunkTracker>,
    cache_service: Arc<dyn ChunkCacheService>,
    quota_service: Arc<dyn QuotaService>,
    artifact_store: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn VideoCatalog>,
    event_producer: Arc<dyn MessageQueueProducerTemplate<UploadEvent>>,
    #[builder(setter(into))]
    event_topic: String,
    #[builder(default = 24 * 60 * 60 * 1000)]
    exp_msecs: i64,
    #[builder(default = 5 * 1024 * 1024)]
    chunk_size: u64,
    #[builder(default = 10_000)]
    max_total_chunks: u32,
    #[builder(default = 10 * 60 * 1000)]
    processing_lease_msecs: i64,
    #[builder(default)]
    default_checksum_algorithm: ChecksumAlgorithm,
    #[builder(default)]
    retry_policy: RetryPolicy,
}

fn invalid(reason: impl ToString) -> UploadException {
    UploadException::InvalidArgument {
        reason: reason.to_string(),
    }
}

fn not_found(key: &SessionKey) -> UploadException {
    UploadException::SessionNotFound {
        session_id: key.session_id.to_owned(),
    }
}

impl UploadServiceImpl {
    /// Session that is still visible to callers.
    async fn live_session(&self, key: &SessionKey) -> UploadResult<UploadSession> {
        let (session, _) = self.session_store.get(key).await?;
        if session.status == SessionStatus::Cancelled || session.is_expired(Utc::now()) {
            return Err(not_found(key));
        }
        Ok(session)
    }

    async fn open_session(
        &self,
        key: &SessionKey,
        cmd: &StartUploadCommand,
        reserved_bytes: u64,
    ) -> UploadResult<UploadSession> {
        let video_id = self.catalog.allocate_video_id().await?;
        let created_at = Utc::now();
        let session = UploadSession {
            key: key.to_owned(),
            video_id,
            title: cmd.title.trim().to_owned(),
            description: cmd.description.to_owned(),
            category: cmd.category.to_owned(),
            tags: cmd.tags.to_owned(),
            total_chunks: cmd.total_chunks,
            temp_dir: self.cache_service.temp_dir(key),
            reserved_bytes,
            status: SessionStatus::Pending,
            created_at,
            expires_at: created_at + chrono::Duration::milliseconds(self.exp_msecs),
        };
        // The loser of a create race returns here without touching the winner's directory.
        self.session_store.create(&session, self.exp_msecs).await?;
        if let Err(e) = self.cache_service.provision(key).await {
            if let Err(e) = self.session_store.delete(key).await {
                tracing::warn!(session = %key, "Cannot delete unprovisioned session: {e}");
            }
            return Err(e.into());
        }
        Ok(session)
    }

    async fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.event_producer.send_object(&event, &self.event_topic).await {
            tracing::warn!(kind = event.kind(), owner_id = event.owner_id(), "Cannot emit upload event: {e}");
        }
    }

    async fn release_quota(&self, session: &UploadSession) {
        if let Err(e) =
            self.quota_service.release(session.key.owner_id, session.reserved_bytes).await
        {
            tracing::warn!(session = %session.key, "Cannot release quota: {e}");
        }
    }

    /// Move a processing session to failed and give its reservation back.
    ///
    /// Once the lease is lost the session belongs to its new holder and is left alone.
    async fn fail(&self, session: &UploadSession, lease: &str, reason: String) {
        tracing::error!(session = %session.key, "Upload failed: {reason}");
        match self.session_store.fail_processing(&session.key, lease).await {
            Ok(()) => {}
            Err(
                e @ (UploadException::LeaseLost { .. } | UploadException::SessionNotFound { .. }),
            ) => {
                tracing::warn!(session = %session.key, "Not marking session failed: {e}");
                return;
            }
            Err(e) => tracing::warn!(session = %session.key, "Cannot mark session failed: {e}"),
        }
        self.release_quota(session).await;
        self.emit(UploadEvent::UploadFailed {
            owner_id: session.key.owner_id,
            session_id: session.key.session_id.to_owned(),
            reason,
        })
        .await;
    }

    fn spawn_cleanup(&self, key: SessionKey) {
        let cache_service = self.cache_service.clone();
        let session_store = self.session_store.clone();
        tokio::spawn(async move {
            match cache_service.reclaim(&key).await {
                Ok(bytes) => tracing::debug!(session = %key, bytes, "Reclaimed temp storage"),
                Err(e) => {
                    // Left to expiry and the sweeper.
                    tracing::warn!(session = %key, "Cannot reclaim temp storage: {e}");
                    return;
                }
            }
            if let Err(e) = session_store.delete(&key).await {
                tracing::warn!(session = %key, "Cannot delete completed session: {e}");
            }
        });
    }

    async fn teardown(&self, key: &SessionKey) -> UploadResult<u64> {
        let reclaimed_bytes = self.cache_service.reclaim(key).await?;
        self.session_store.delete(key).await?;
        Ok(reclaimed_bytes)
    }

    /// Remove a cancelled session and announce it. Runs again when an earlier attempt failed.
    async fn finish_cancel(&self, key: &SessionKey) -> UploadResult<u64> {
        let reclaimed_bytes = self.teardown(key).await?;
        tracing::info!(session = %key, reclaimed_bytes, "Upload cancelled");
        self.emit(UploadEvent::UploadCancelled {
            owner_id: key.owner_id,
            session_id: key.session_id.to_owned(),
            reclaimed_bytes,
        })
        .await;
        Ok(reclaimed_bytes)
    }

    /// Extend the processing lease between steps, failing when another worker took it over.
    async fn renew(&self, key: &SessionKey, lease: &str) -> UploadResult<()> {
        match self.session_store.renew_processing(key, lease, self.processing_lease_msecs).await {
            Err(UploadException::SessionNotFound { .. }) => Err(UploadException::LeaseLost {
                session_id: key.session_id.to_owned(),
            }),
            other => other,
        }
    }
}

#[async_trait]
impl UploadService for UploadServiceImpl {
    async fn start_upload(&self, cmd: StartUploadCommand) -> UploadResult<StartedUpload> {
        if cmd.total_chunks == 0 || cmd.total_chunks > self.max_total_chunks {
            return Err(invalid(format!(
                "totalChunks must be within [1, {}], got {}",
                self.max_total_chunks, cmd.total_chunks
            )));
        }
        if cmd.title.trim().is_empty() {
            return Err(invalid("title must not be empty"));
        }
        let key = match cmd.session_id.as_deref() {
            Some(session_id) => SessionKey::explicit(cmd.owner_id, session_id).map_err(invalid)?,
            None => SessionKey::generate(cmd.owner_id),
        };

        let reserved_bytes = cmd
            .estimated_size
            .unwrap_or_else(|| u64::from(cmd.total_chunks).saturating_mul(self.chunk_size));
        match self.quota_service.check_and_reserve(cmd.owner_id, reserved_bytes).await? {
            QuotaDecision::Approved => {}
            QuotaDecision::Denied { reason } => {
                tracing::info!(owner_id = cmd.owner_id, "Upload denied by quota: {reason}");
                return Err(UploadException::QuotaExceeded {
                    owner_id: cmd.owner_id,
                    reason,
                });
            }
        }

        let session = match self.open_session(&key, &cmd, reserved_bytes).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(e) = self.quota_service.release(cmd.owner_id, reserved_bytes).await {
                    tracing::warn!(session = %key, "Cannot release quota: {e}");
                }
                return Err(e);
            }
        };
        tracing::info!(
            session = %key,
            video_id = session.video_id,
            total_chunks = session.total_chunks,
            "Upload session started"
        );
        Ok(StartedUpload {
            session_id: key.session_id,
            video_id: session.video_id,
            temp_dir: session.temp_dir,
            expires_at: session.expires_at,
            chunk_size: self.chunk_size,
        })
    }

    async fn upload_chunk(&self, cmd: UploadChunkCommand) -> UploadResult<ChunkReceipt> {
        let UploadChunkCommand {
            key,
            chunk_number,
            payload,
            checksum,
        } = cmd;
        if payload.is_empty() {
            return Err(invalid("chunk payload must not be empty"));
        }
        if checksum.trim().is_empty() {
            return Err(invalid("chunkChecksum must not be empty"));
        }
        let checksum =
            ChunkChecksum::parse(&checksum, self.default_checksum_algorithm).map_err(invalid)?;

        let session = self.live_session(&key).await?;
        if chunk_number == 0 || chunk_number > session.total_chunks {
            return Err(UploadException::InvalidChunkNumber {
                chunk_number,
                total_chunks: session.total_chunks,
            });
        }
        // Verified before anything is persisted.
        if let Err(actual) = checksum.verify(&payload) {
            tracing::warn!(session = %key, chunk_number, "Chunk checksum mismatch");
            return Err(UploadException::ChecksumMismatch {
                chunk_number,
                expected: checksum.value,
                actual,
            });
        }
        if !session.status.accepts_chunks() {
            // Every chunk of a merging or merged session is already acknowledged.
            if let SessionStatus::Processing | SessionStatus::Completed = session.status {
                return Ok(ChunkReceipt {
                    uploaded_count: session.total_chunks,
                    total_chunks: session.total_chunks,
                    progress_percent: 100.0,
                    already_marked: true,
                    is_complete: true,
                });
            }
            return Err(UploadException::InvalidStatus {
                session_id: key.session_id,
                status: session.status,
            });
        }

        let written = self
            .cache_service
            .write_chunk(Chunk {
                key: key.to_owned(),
                nth: chunk_number,
                content: payload,
            })
            .await?;
        if written == ChunkWrite::SessionGone {
            tracing::info!(session = %key, chunk_number, "Chunk arrived after session teardown");
            return Err(not_found(&key));
        }
        let outcome = self.chunk_tracker.mark_chunk(&key, chunk_number).await?;
        tracing::debug!(
            session = %key,
            chunk_number,
            uploaded = outcome.uploaded_count,
            already_marked = outcome.already_marked,
            "Chunk acknowledged"
        );
        Ok(ChunkReceipt {
            uploaded_count: outcome.uploaded_count,
            total_chunks: outcome.total_chunks,
            progress_percent: outcome.progress_percent(),
            already_marked: outcome.already_marked,
            is_complete: outcome.is_complete,
        })
    }

    async fn complete_upload(&self, key: &SessionKey) -> UploadResult<CompletedUpload> {
        let (session, outcome) = self.session_store.get(key).await?;
        match session.status {
            SessionStatus::Completed => {
                return outcome.ok_or_else(|| {
                    anyhow::anyhow!("Completed session {key} has no outcome").into()
                })
            }
            SessionStatus::Cancelled => return Err(not_found(key)),
            SessionStatus::Failed => {
                return Err(UploadException::InvalidStatus {
                    session_id: key.session_id.to_owned(),
                    status: session.status,
                })
            }
            _ => {}
        }

        let progress = self.chunk_tracker.progress(key).await?;
        if !progress.is_complete() {
            return Err(UploadException::IncompleteUpload {
                session_id: key.session_id.to_owned(),
                missing_chunks: progress.missing_chunks,
            });
        }
        let lease = self.session_store.acquire_processing(key, self.processing_lease_msecs).await?;
        tracing::info!(session = %key, total_chunks = session.total_chunks, "Merging upload");

        let artifact = match self.cache_service.merge(key, session.total_chunks).await {
            Ok(artifact) => artifact,
            Err(source) => {
                self.fail(&session, &lease, format!("merge failed: {source:#}")).await;
                return Err(UploadException::MergeFailure {
                    session_id: key.session_id.to_owned(),
                    source,
                });
            }
        };

        self.renew(key, &lease).await?;
        let owner_id = key.owner_id;
        let video_id = session.video_id;
        let artifact_location = match self
            .retry_policy
            .run("artifact handoff", || {
                self.artifact_store.put_artifact(owner_id, video_id, &artifact.path)
            })
            .await
        {
            Ok(location) => location,
            Err((attempts, source)) => {
                self.fail(&session, &lease, format!("handoff failed: {source:#}")).await;
                return Err(UploadException::HandoffFailure {
                    session_id: key.session_id.to_owned(),
                    attempts,
                    source,
                });
            }
        };

        if let Err(e) = self.renew(key, &lease).await {
            tracing::warn!(
                session = %key,
                location = %artifact_location,
                "Handed off without a lease: {e}"
            );
            return Err(e);
        }
        let record = VideoRecord {
            video_id,
            owner_id,
            title: session.title.to_owned(),
            description: session.description.to_owned(),
            category: session.category.to_owned(),
            tags: session.tags.to_owned(),
            size_bytes: artifact.size_bytes,
            digest: artifact.digest.to_owned(),
        };
        let video_id = match self
            .retry_policy
            .run("catalog insert", || {
                self.catalog.insert_video_record(&record, &artifact_location)
            })
            .await
        {
            Ok(video_id) => video_id,
            Err((attempts, source)) => {
                self.fail(&session, &lease, format!("catalog insert failed: {source:#}")).await;
                return Err(UploadException::CatalogFailure {
                    session_id: key.session_id.to_owned(),
                    attempts,
                    source,
                });
            }
        };

        let outcome = CompletedUpload {
            video_id,
            artifact_location,
            catalog_status: CATALOG_PUBLISHED.to_owned(),
            size_bytes: artifact.size_bytes,
            digest: artifact.digest,
        };
        if let Err(e) = self.session_store.complete(key, &lease, &outcome).await {
            tracing::error!(
                session = %key,
                video_id,
                "Published video without completing its session: {e}"
            );
            return Err(e);
        }
        if let Err(e) = self
            .quota_service
            .settle(owner_id, session.reserved_bytes, outcome.size_bytes)
            .await
        {
            tracing::warn!(session = %key, "Cannot settle quota: {e}");
        }
        tracing::info!(
            session = %key,
            video_id,
            size_bytes = outcome.size_bytes,
            location = %outcome.artifact_location,
            "Upload completed"
        );
        self.emit(UploadEvent::VideoPublished {
            owner_id,
            session_id: key.session_id.to_owned(),
            video_id,
            title: session.title,
            artifact_location: outcome.artifact_location.to_owned(),
            size_bytes: outcome.size_bytes,
        })
        .await;
        self.spawn_cleanup(key.to_owned());
        Ok(outcome)
    }

    async fn cancel_upload(&self, key: &SessionKey) -> UploadResult<CancelOutcome> {
        let session = match self.session_store.get(key).await {
            Ok((session, _)) => session,
            Err(UploadException::SessionNotFound { .. }) => {
                return Ok(CancelOutcome {
                    cleanup_status: CleanupStatus::AlreadyReclaimed,
                    reclaimed_bytes: 0,
                })
            }
            Err(e) => return Err(e),
        };
        if session.status == SessionStatus::Cancelled {
            // An earlier cancel gave the reservation back but did not finish its teardown.
            let reclaimed_bytes = self.finish_cancel(key).await?;
            return Ok(CancelOutcome {
                cleanup_status: CleanupStatus::AlreadyReclaimed,
                reclaimed_bytes,
            });
        }

        let mut from = SessionStatus::CANCELLABLE.to_vec();
        if session.status == SessionStatus::Processing {
            // Only a stale lease can be taken over; a live one is reported as processing.
            self.session_store.acquire_processing(key, self.processing_lease_msecs).await?;
            from.push(SessionStatus::Processing);
        }
        let transition = self.session_store.transition(key, &from, SessionStatus::Cancelled).await;
        let previous = match transition {
            Ok(previous) => previous,
            Err(UploadException::InvalidStatus {
                status: SessionStatus::Cancelled,
                ..
            }) => {
                // A concurrent cancel won and owns the teardown.
                return Ok(CancelOutcome {
                    cleanup_status: CleanupStatus::AlreadyReclaimed,
                    reclaimed_bytes: 0,
                });
            }
            Err(e) => return Err(e),
        };
        // Released by the winner of the transition only, before anything else can fail.
        // A failed session already gave its reservation back.
        if previous != SessionStatus::Failed {
            self.release_quota(&session).await;
        }
        let reclaimed_bytes = self.finish_cancel(key).await?;
        Ok(CancelOutcome {
            cleanup_status: CleanupStatus::Cleaned,
            reclaimed_bytes,
        })
    }

    async fn get_upload_progress(&self, key: &SessionKey) -> UploadResult<UploadProgress> {
        let session = self.live_session(key).await?;
        let progress = self.chunk_tracker.progress(key).await?;
        let eta_seconds = session.eta_seconds(
            progress.uploaded_count,
            progress.missing_chunks.len(),
            Utc::now(),
        );
        Ok(UploadProgress {
            uploaded_count: progress.uploaded_count,
            total_chunks: progress.total_chunks,
            progress_percent: progress.progress_percent(),
            missing_chunks: progress.missing_chunks,
            status: session.status,
            eta_seconds,
        })
    }
}

//! Client instance
//!
//! Owns the job service, configuration and event bus, and allows a single
//! live import session at a time. A second start while one session is
//! submitting or polling is rejected with the live job id instead of racing
//! a second poller against the same job.

use super::commit::{CommitError, CommitOperation, CommitOutcome};
use super::http_client::HttpJobClient;
use super::import_session::{ImportSession, SessionOutcome};
use super::job_client::{JobService, SubmitPayload};
use super::staging_buffer::StagingBuffer;
use crate::error::{ImportError, ImportResult};
use crate::models::JobId;
use rollcall_common::config::ImportConfig;
use rollcall_common::events::{EventBus, ImportEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 100;

struct ActiveImport {
    job_rx: watch::Receiver<Option<JobId>>,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveImport>>>;

/// Releases the active slot when the session ends, however it ends
struct ActiveGuard {
    slot: ActiveSlot,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.slot).take();
    }
}

fn lock(slot: &ActiveSlot) -> MutexGuard<'_, Option<ActiveImport>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Importer {
    service: Arc<dyn JobService>,
    config: ImportConfig,
    events: EventBus,
    active: ActiveSlot,
}

impl Importer {
    pub fn new(service: Arc<dyn JobService>, config: ImportConfig) -> Self {
        Self {
            service,
            config,
            events: EventBus::new(EVENT_CAPACITY),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Importer backed by the HTTP job service; the configuration is validated first
    pub fn from_config(config: ImportConfig) -> ImportResult<Self> {
        config.validate()?;
        let client = HttpJobClient::new(&config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Job id of the live session, once the backend has assigned one
    pub fn active_job_id(&self) -> Option<JobId> {
        lock(&self.active)
            .as_ref()
            .and_then(|active| active.job_rx.borrow().clone())
    }

    /// Stop local polling of the live session; the server-side job continues
    pub fn cancel_active(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Submit a document and follow the job to a terminal outcome
    pub async fn start_import(
        &self,
        payload: &SubmitPayload,
        cancel: &CancellationToken,
    ) -> ImportResult<SessionOutcome> {
        let mut session = ImportSession::from_config(&self.config, self.events.clone());
        let (_guard, token) = self.claim(&session, cancel)?;
        session.submit(self.service.as_ref(), payload, &token).await
    }

    /// Reattach to an existing job and follow it to a terminal outcome
    pub async fn resume_import(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> ImportResult<SessionOutcome> {
        let mut session = ImportSession::from_config(&self.config, self.events.clone());
        let (_guard, token) = self.claim(&session, cancel)?;
        session.resume(self.service.as_ref(), job_id, &token).await
    }

    /// Commit reviewed records; the buffer is cleared only on success
    pub async fn commit(
        &self,
        target_id: &str,
        buffer: &mut StagingBuffer,
    ) -> Result<CommitOutcome, CommitError> {
        CommitOperation::new(Arc::clone(&self.service), self.events.clone())
            .commit(target_id, buffer)
            .await
    }

    fn claim(
        &self,
        session: &ImportSession,
        cancel: &CancellationToken,
    ) -> ImportResult<(ActiveGuard, CancellationToken)> {
        let mut slot = lock(&self.active);
        if let Some(active) = slot.as_ref() {
            let job_id = active.job_rx.borrow().clone();
            tracing::warn!(job_id = ?job_id, "Import requested while another is in progress");
            return Err(ImportError::SessionActive { job_id });
        }

        let token = cancel.child_token();
        *slot = Some(ActiveImport {
            job_rx: session.watch_job_id(),
            cancel: token.clone(),
        });

        Ok((
            ActiveGuard {
                slot: Arc::clone(&self.active),
            },
            token,
        ))
    }
}

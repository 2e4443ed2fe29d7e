//! Test helpers
//!
//! `FakeJobService` is an in-memory job service: it creates at most one job
//! per target (a second upload for the same target gets a conflict with the
//! running job's id), replays a scripted sequence of status responses, and
//! records every commit it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use rollcall_import::models::{ImportJob, ImportRecord, JobId, JobStatus, Progress, ProgressStage};
use rollcall_import::services::{
    CommitRequest, CommitResponse, JobClientError, JobService, SubmitOutcome, SubmitPayload,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One scripted status response
#[derive(Debug, Clone)]
pub enum StatusStep {
    Pending,
    Running(u32, u32),
    Done,
    DoneAutoSaved(u64),
    Failed(String, Option<String>),
    NetworkError,
    /// Backend refused the status query with this HTTP status and message
    Rejected(u16, String),
}

#[derive(Debug, Clone)]
pub enum CommitBehavior {
    /// Persist everything except `skip` records
    Accept { skip: u64 },
    Reject(String),
}

struct FakeState {
    jobs_by_target: HashMap<String, JobId>,
    jobs_created: u32,
    submit_calls: u32,
    status_calls: u32,
    status_script: VecDeque<StatusStep>,
    after_script: StatusStep,
    records: Vec<ImportRecord>,
    submit_error: Option<fn() -> JobClientError>,
    commit_behavior: CommitBehavior,
    commits: Vec<CommitRequest>,
}

pub struct FakeJobService {
    state: Mutex<FakeState>,
}

impl FakeJobService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                jobs_by_target: HashMap::new(),
                jobs_created: 0,
                submit_calls: 0,
                status_calls: 0,
                status_script: VecDeque::new(),
                after_script: StatusStep::Running(0, 0),
                records: Vec::new(),
                submit_error: None,
                commit_behavior: CommitBehavior::Accept { skip: 0 },
                commits: Vec::new(),
            }),
        }
    }

    pub fn with_records(self, records: Vec<ImportRecord>) -> Self {
        self.state.lock().unwrap().records = records;
        self
    }

    /// Status responses in order; `after` repeats once the script is used up
    pub fn with_status_script(self, steps: Vec<StatusStep>, after: StatusStep) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.status_script = steps.into();
            state.after_script = after;
        }
        self
    }

    pub fn with_submit_error(self, error: fn() -> JobClientError) -> Self {
        self.state.lock().unwrap().submit_error = Some(error);
        self
    }

    pub fn with_commit_behavior(self, behavior: CommitBehavior) -> Self {
        self.state.lock().unwrap().commit_behavior = behavior;
        self
    }

    pub fn jobs_created(&self) -> u32 {
        self.state.lock().unwrap().jobs_created
    }

    pub fn submit_calls(&self) -> u32 {
        self.state.lock().unwrap().submit_calls
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }

    pub fn commits(&self) -> Vec<CommitRequest> {
        self.state.lock().unwrap().commits.clone()
    }
}

#[async_trait]
impl JobService for FakeJobService {
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmitOutcome, JobClientError> {
        let mut state = self.state.lock().unwrap();
        state.submit_calls += 1;

        if let Some(make_error) = state.submit_error {
            return Err(make_error());
        }

        if let Some(existing) = state.jobs_by_target.get(&payload.target_id) {
            return Ok(SubmitOutcome::AlreadyRunning(existing.clone()));
        }

        state.jobs_created += 1;
        let job_id = JobId::parse(&format!("job-{}", state.jobs_created)).unwrap();
        state
            .jobs_by_target
            .insert(payload.target_id.clone(), job_id.clone());
        Ok(SubmitOutcome::Created(job_id))
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<ImportJob, JobClientError> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;

        let scripted = state.status_script.pop_front();
        let step = scripted.unwrap_or_else(|| state.after_script.clone());

        let job = match step {
            StatusStep::Pending => ImportJob::with_status(job_id.clone(), JobStatus::Pending),
            StatusStep::Running(current, total) => ImportJob {
                progress: Some(Progress {
                    stage: ProgressStage::Extract,
                    current,
                    total,
                }),
                ..ImportJob::with_status(job_id.clone(), JobStatus::Running)
            },
            StatusStep::Done => ImportJob::done(job_id.clone(), state.records.clone()),
            StatusStep::DoneAutoSaved(total_saved) => ImportJob {
                auto_saved: Some(total_saved),
                ..ImportJob::done(job_id.clone(), Vec::new())
            },
            StatusStep::Failed(message, raw_text) => ImportJob {
                raw_text,
                ..ImportJob::failed(job_id.clone(), message)
            },
            StatusStep::NetworkError => {
                return Err(JobClientError::Transport("connection reset by peer".to_string()))
            }
            StatusStep::Rejected(status, message) => {
                return Err(JobClientError::Rejected {
                    status,
                    message,
                    raw_text: None,
                })
            }
        };
        Ok(job)
    }

    async fn commit(&self, request: &CommitRequest) -> Result<CommitResponse, JobClientError> {
        let mut state = self.state.lock().unwrap();
        state.commits.push(request.clone());

        match state.commit_behavior.clone() {
            CommitBehavior::Accept { skip } => Ok(CommitResponse {
                inserted: (request.records.len() as u64).saturating_sub(skip),
            }),
            CommitBehavior::Reject(message) => Err(JobClientError::Rejected {
                status: 400,
                message,
                raw_text: None,
            }),
        }
    }
}

/// Records named A, B, C, ...
pub fn sample_records(count: usize) -> Vec<ImportRecord> {
    (0..count)
        .map(|i| ImportRecord {
            cr: Some((i + 1).to_string()),
            voter_no: Some(format!("10{:04}", i)),
            ..ImportRecord::named(((b'A' + i as u8) as char).to_string())
        })
        .collect()
}

pub fn pdf_payload(target_id: &str) -> SubmitPayload {
    SubmitPayload::pdf("voter-list.pdf", b"%PDF-1.4 test".to_vec(), target_id)
}

//! HTTP job service client
//!
//! Endpoints, relative to the configured base URL:
//! - `POST import/pdf` multipart (`pdf` file, `centerId` text) → `{ jobId }`, or 409 `{ jobId?, message }`
//! - `GET import/status/{jobId}` → `{ status, progress?, data?: { voters }, error? }`
//! - `POST import/save` `{ targetId, records }` → `{ inserted }`

use super::job_client::{
    CommitRequest, CommitResponse, JobClientError, JobService, SubmitOutcome, SubmitPayload,
};
use crate::models::{ImportJob, ImportRecord, JobId, JobStatus, Progress};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use rollcall_common::config::ImportConfig;
use rollcall_common::serde_ext::null_as_default;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("rollcall-import/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    job_id: Option<String>,
}

/// Body of 409 and other non-2xx responses
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    job_id: Option<String>,
    message: Option<String>,
    error: Option<String>,
    raw_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    status: JobStatus,
    #[serde(default)]
    progress: Option<Progress>,
    #[serde(default)]
    data: Option<JobData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobData {
    #[serde(default, deserialize_with = "null_as_default")]
    voters: Vec<ImportRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    auto_saved: bool,
    total_saved: Option<u64>,
    total_extracted: Option<u64>,
}

/// The save endpoint has answered both bare and `data`-wrapped
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommitBody {
    Bare(CommitResponse),
    Wrapped { data: CommitResponse },
}

impl StatusBody {
    fn into_job(self, job_id: JobId) -> ImportJob {
        let (result, auto_saved, total_extracted) = match (self.status, self.data) {
            (JobStatus::Done, Some(data)) => {
                let total = data.total_extracted.or(Some(data.voters.len() as u64));
                let auto_saved = data
                    .auto_saved
                    .then(|| data.total_saved.unwrap_or(data.voters.len() as u64));
                (Some(data.voters), auto_saved, total)
            }
            (JobStatus::Done, None) => (Some(Vec::new()), None, Some(0)),
            _ => (None, None, None),
        };

        ImportJob {
            job_id,
            status: self.status,
            progress: self.progress,
            result,
            error_message: self.error,
            raw_text: self.raw_text,
            auto_saved,
            total_extracted,
        }
    }
}

/// Job service client over HTTP
pub struct HttpJobClient {
    http_client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    upload_timeout: Duration,
}

impl HttpJobClient {
    pub fn new(config: &ImportConfig) -> Result<Self, JobClientError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JobClientError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            upload_timeout: config.upload_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Status URL with the job id as a single percent-encoded path segment
    fn status_url(&self, job_id: &JobId) -> Result<Url, JobClientError> {
        let mut url = Url::parse(&self.url("import/status"))
            .map_err(|e| JobClientError::Transport(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| JobClientError::Transport("base URL cannot carry a path".to_string()))?
            .push(job_id.as_str());
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, JobClientError> {
        self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                JobClientError::Transport(format!("request timed out: {}", e))
            } else {
                JobClientError::Transport(e.to_string())
            }
        })
    }
}

/// Map a non-2xx response to an error, reading the backend's message if present
async fn error_from_response(response: Response) -> JobClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .or(body.error)
        .unwrap_or_else(|| if text.trim().is_empty() { status.to_string() } else { text.clone() });

    if status == StatusCode::UNAUTHORIZED {
        JobClientError::Unauthorized(message)
    } else if status.is_server_error() {
        JobClientError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        JobClientError::Rejected {
            status: status.as_u16(),
            message,
            raw_text: body.raw_text,
        }
    }
}

#[async_trait]
impl JobService for HttpJobClient {
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmitOutcome, JobClientError> {
        let part = Part::bytes(payload.content.clone())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime_type)
            .map_err(|e| JobClientError::Parse(format!("invalid mime type: {}", e)))?;
        let form = Form::new()
            .part("pdf", part)
            .text("centerId", payload.target_id.clone());

        tracing::debug!(
            file = %payload.file_name,
            bytes = payload.content.len(),
            target_id = %payload.target_id,
            "Uploading document"
        );

        let request = self
            .http_client
            .post(self.url("import/pdf"))
            .timeout(self.upload_timeout)
            .multipart(form);
        let response = self.send(request).await?;
        let status = response.status();

        if status == StatusCode::CONFLICT {
            let text = response.text().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return match body.job_id.as_deref().and_then(JobId::parse) {
                Some(job_id) => Ok(SubmitOutcome::AlreadyRunning(job_id)),
                None => Err(JobClientError::ConflictWithoutJob {
                    message: body
                        .message
                        .unwrap_or_else(|| "An import is already running".to_string()),
                    raw_text: body.raw_text,
                }),
            };
        }

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let body: SubmitBody = response
            .json()
            .await
            .map_err(|e| JobClientError::Parse(e.to_string()))?;

        body.job_id
            .as_deref()
            .and_then(JobId::parse)
            .map(SubmitOutcome::Created)
            .ok_or_else(|| JobClientError::Parse("submission response carried no jobId".to_string()))
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<ImportJob, JobClientError> {
        let url = self.status_url(job_id)?;
        let response = self.send(self.http_client.get(url)).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| JobClientError::Parse(e.to_string()))?;

        Ok(body.into_job(job_id.clone()))
    }

    async fn commit(&self, request: &CommitRequest) -> Result<CommitResponse, JobClientError> {
        let response = self
            .send(self.http_client.post(self.url("import/save")).json(request))
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: CommitBody = response
            .json()
            .await
            .map_err(|e| JobClientError::Parse(e.to_string()))?;

        Ok(match body {
            CommitBody::Bare(inner) | CommitBody::Wrapped { data: inner } => inner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_id() -> JobId {
        JobId::parse("job-7").unwrap()
    }

    #[test]
    fn test_done_body_maps_voters() {
        let body: StatusBody = serde_json::from_value(json!({
            "status": "done",
            "progress": { "stage": "saving", "current": 2, "total": 2 },
            "data": { "voters": [{ "name": "A" }, { "name": "B" }] }
        }))
        .unwrap();

        let job = body.into_job(job_id());
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.result.as_ref().map(Vec::len), Some(2));
        assert_eq!(job.total_extracted, Some(2));
        assert!(job.auto_saved.is_none());
    }

    #[test]
    fn test_done_without_data_is_empty_result() {
        let body: StatusBody = serde_json::from_value(json!({ "status": "done" })).unwrap();
        let job = body.into_job(job_id());
        assert_eq!(job.result, Some(Vec::new()));
    }

    #[test]
    fn test_auto_saved_body() {
        let body: StatusBody = serde_json::from_value(json!({
            "status": "done",
            "data": { "voters": [], "autoSaved": true, "totalSaved": 120 }
        }))
        .unwrap();
        assert_eq!(body.into_job(job_id()).auto_saved, Some(120));
    }

    #[test]
    fn test_failed_body_keeps_error() {
        let body: StatusBody = serde_json::from_value(json!({
            "status": "failed",
            "error": "No voter rows found",
            "rawText": "page 1 ..."
        }))
        .unwrap();
        let job = body.into_job(job_id());
        assert_eq!(job.error_message.as_deref(), Some("No voter rows found"));
        assert_eq!(job.raw_excerpt().as_deref(), Some("page 1 ..."));
        assert!(job.result.is_none());
    }

    #[test]
    fn test_running_body_with_partial_progress() {
        let body: StatusBody = serde_json::from_value(json!({
            "status": "running",
            "progress": { "current": 1, "total": 5 }
        }))
        .unwrap();
        let progress = body.into_job(job_id()).progress.unwrap();
        assert_eq!((progress.current, progress.total), (1, 5));

        let body: StatusBody = serde_json::from_value(json!({
            "status": "running",
            "progress": { "stage": "ocr", "current": 1, "total": null }
        }))
        .unwrap();
        assert_eq!(body.into_job(job_id()).progress.unwrap().total, 0);

        let body: StatusBody =
            serde_json::from_value(json!({ "status": "running", "progress": null })).unwrap();
        assert!(body.into_job(job_id()).progress.is_none());
    }

    #[test]
    fn test_done_body_with_null_fields() {
        let body: StatusBody = serde_json::from_value(json!({
            "status": "done",
            "data": { "voters": null, "autoSaved": null, "totalExtracted": null }
        }))
        .unwrap();
        let job = body.into_job(job_id());
        assert_eq!(job.result, Some(Vec::new()));
        assert!(job.auto_saved.is_none());
        assert_eq!(job.total_extracted, Some(0));
    }

    #[test]
    fn test_status_url_encodes_job_id() {
        let client = HttpJobClient::new(&ImportConfig::default()).unwrap();
        let url = client
            .status_url(&JobId::parse("batch/7?page=2#top").unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5056/api/import/status/batch%2F7%3Fpage=2%23top"
        );
    }

    #[test]
    fn test_commit_body_shapes() {
        let bare: CommitBody = serde_json::from_value(json!({ "inserted": 3 })).unwrap();
        let wrapped: CommitBody =
            serde_json::from_value(json!({ "data": { "inserted": 4 } })).unwrap();
        assert!(matches!(bare, CommitBody::Bare(CommitResponse { inserted: 3 })));
        assert!(matches!(
            wrapped,
            CommitBody::Wrapped {
                data: CommitResponse { inserted: 4 }
            }
        ));
    }

    #[test]
    fn test_client_creation() {
        let client = HttpJobClient::new(&ImportConfig::default()).unwrap();
        assert_eq!(client.url("import/pdf"), "http://localhost:5056/api/import/pdf");
    }
}

//! Poll controller: submit a long-running job, then poll until it settles.
//!
//! Generation services (image, video, avatar) hand back a job id and finish
//! seconds to minutes later. [`submit_and_poll`] checks status at a fixed
//! interval and gives up once the total budget is spent.

mod provider;

pub use self::provider::{GenerationProvider, run_provider};

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            timeout_ms: 300_000,
        }
    }
}

impl PollConfig {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval_ms: poll_interval.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Opaque handle returned by a provider's submit call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalJobId(String);

impl ExternalJobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of an external job as seen by one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    InProgress,
    Succeeded(T),
    Failed(String),
}

impl<T> JobStatus<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> JobStatus<U> {
        match self {
            JobStatus::InProgress => JobStatus::InProgress,
            JobStatus::Succeeded(v) => JobStatus::Succeeded(f(v)),
            JobStatus::Failed(reason) => JobStatus::Failed(reason),
        }
    }
}

const FAILED_STATES: &[&str] = &[
    "failed",
    "failure",
    "error",
    "errored",
    "cancelled",
    "canceled",
    "rejected",
];

const RESOURCE_FIELDS: &[&str] = &[
    "url",
    "video_url",
    "image_url",
    "audio_url",
    "output_url",
    "result_url",
    "resource_url",
    "download_url",
    "path",
];

const NESTED_FIELDS: &[&str] = &["output", "outputs", "result", "data"];

impl JobStatus<String> {
    /// Map a provider's status payload onto a [`JobStatus`].
    ///
    /// An explicit failure in `status`/`state` wins; otherwise any completed
    /// resource reference (top level or under `output`/`result`/`data`) means
    /// success; anything else is still in progress.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let state = payload
            .get("status")
            .or_else(|| payload.get("state"))
            .and_then(|s| s.as_str())
            .map(str::to_ascii_lowercase);

        if let Some(state) = state.as_deref()
            && FAILED_STATES.contains(&state)
        {
            let reason = ["error", "failure_reason", "message"]
                .iter()
                .find_map(|k| payload.get(*k))
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .unwrap_or_else(|| format!("job reported status {state}"));
            return JobStatus::Failed(reason);
        }

        match find_resource(payload) {
            Some(resource) => JobStatus::Succeeded(resource),
            None => JobStatus::InProgress,
        }
    }
}

fn find_resource(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => RESOURCE_FIELDS
            .iter()
            .filter_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                NESTED_FIELDS
                    .iter()
                    .filter_map(|k| map.get(*k))
                    .find_map(find_resource)
            }),
        serde_json::Value::Array(items) => items.iter().find_map(find_resource),
        serde_json::Value::String(s) if s.starts_with("http") => Some(s.clone()),
        _ => None,
    }
}

/// A submitted job being watched. Lives only for one `submit_and_poll` call.
#[derive(Debug, Clone)]
pub struct PollJob {
    pub external_job_id: ExternalJobId,
    pub started_at: Instant,
    pub timeout: Duration,
}

impl PollJob {
    pub fn new(external_job_id: ExternalJobId, timeout: Duration) -> Self {
        Self {
            external_job_id,
            started_at: Instant::now(),
            timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

/// Submit once, then check status every `poll_interval` until the job
/// succeeds, fails, or `timeout` elapses.
///
/// - submit failure: returned as-is.
/// - job reported failure: `JOB_FAILED`, retryable.
/// - budget exhausted: `TIMEOUT`, retryable. The last check happens no later
///   than the deadline.
/// - status check error: retryable ones are treated as "still in progress";
///   anything else aborts as non-retryable.
pub async fn submit_and_poll<T, S, SFut, C, CFut>(
    submit: S,
    mut check_status: C,
    config: &PollConfig,
) -> Result<T, CallError>
where
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<ExternalJobId, CallError>>,
    C: FnMut(ExternalJobId) -> CFut,
    CFut: Future<Output = Result<JobStatus<T>, CallError>>,
{
    let external_job_id = match submit().await {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, retryable = err.retryable, "job submission failed");
            return Err(err);
        }
    };

    let job = PollJob::new(external_job_id, config.timeout());
    info!(
        job_id = %job.external_job_id,
        timeout_ms = config.timeout_ms,
        poll_interval_ms = config.poll_interval_ms,
        "job submitted"
    );

    let mut checks: u32 = 0;
    loop {
        checks += 1;
        match check_status(job.external_job_id.clone()).await {
            Ok(JobStatus::Succeeded(output)) => {
                info!(
                    job_id = %job.external_job_id,
                    checks,
                    elapsed_ms = job.elapsed().as_millis() as u64,
                    "job succeeded"
                );
                return Ok(output);
            }
            Ok(JobStatus::Failed(reason)) => {
                warn!(job_id = %job.external_job_id, checks, %reason, "job failed");
                return Err(CallError::job_failed(reason));
            }
            Ok(JobStatus::InProgress) => {
                debug!(job_id = %job.external_job_id, checks, "job in progress");
            }
            Err(err) if err.retryable => {
                warn!(job_id = %job.external_job_id, checks, error = %err, "status check failed, will poll again");
            }
            Err(err) => {
                warn!(job_id = %job.external_job_id, checks, error = %err, "status check rejected");
                return Err(err.into_fatal());
            }
        }

        if job.is_expired() {
            warn!(
                job_id = %job.external_job_id,
                checks,
                elapsed_ms = job.elapsed().as_millis() as u64,
                "job polling timed out"
            );
            return Err(CallError::timeout(job.elapsed()));
        }
        tokio::time::sleep(config.poll_interval().min(job.remaining())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> PollConfig {
        PollConfig::new(Duration::from_millis(100), Duration::from_millis(1000))
    }

    fn scripted(
        script: Vec<Result<JobStatus<String>, CallError>>,
    ) -> Mutex<VecDeque<Result<JobStatus<String>, CallError>>> {
        Mutex::new(script.into())
    }

    async fn submit_ok() -> Result<ExternalJobId, CallError> {
        Ok(ExternalJobId::new("job-1"))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_third_check() {
        let script = scripted(vec![
            Ok(JobStatus::InProgress),
            Ok(JobStatus::InProgress),
            Ok(JobStatus::Succeeded("https://cdn/x.mp4".to_string())),
        ]);
        let checks = AtomicU32::new(0);

        let out = submit_and_poll(
            submit_ok,
            |_id| {
                checks.fetch_add(1, Ordering::SeqCst);
                let next = script.lock().unwrap().pop_front().unwrap();
                async move { next }
            },
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(out, "https://cdn/x.mp4");
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_interval() {
        let start = Instant::now();
        let err = submit_and_poll(
            submit_ok,
            |_id| async { Ok::<JobStatus<String>, CallError>(JobStatus::InProgress) },
            &config(),
        )
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed <= Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn job_failure_is_retryable() {
        let err = submit_and_poll(
            submit_ok,
            |_id| async { Ok::<JobStatus<String>, CallError>(JobStatus::Failed("nsfw".to_string())) },
            &config(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::JobFailed);
        assert_eq!(err.message, "nsfw");
        assert!(err.retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_failure_skips_polling() {
        let checks = AtomicU32::new(0);
        let err = submit_and_poll(
            || async { Err(CallError::from_status(401, "bad key")) },
            |_id| {
                checks.fetch_add(1, Ordering::SeqCst);
                async { Ok::<JobStatus<String>, CallError>(JobStatus::InProgress) }
            },
            &config(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status_code, Some(401));
        assert!(!err.retryable);
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_during_check_keep_polling() {
        let script = scripted(vec![
            Err(CallError::from_status(502, "bad gateway")),
            Ok(JobStatus::Succeeded("done.png".to_string())),
        ]);

        let out = submit_and_poll(
            submit_ok,
            |_id| {
                let next = script.lock().unwrap().pop_front().unwrap();
                async move { next }
            },
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(out, "done.png");
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_during_check_aborts() {
        let checks = AtomicU32::new(0);
        let err = submit_and_poll(
            submit_ok,
            |_id| {
                checks.fetch_add(1, Ordering::SeqCst);
                async { Err::<JobStatus<String>, CallError>(CallError::from_status(404, "no such job")) }
            },
            &config(),
        )
        .await
        .unwrap_err();

        assert!(!err.retryable);
        assert_eq!(err.kind, ErrorKind::Client);
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn payload_mapping() {
        use serde_json::json;

        assert_eq!(
            JobStatus::<String>::from_payload(&json!({"status": "processing"})),
            JobStatus::InProgress
        );
        assert_eq!(
            JobStatus::<String>::from_payload(&json!({"status": "completed", "video_url": "https://v/1.mp4"})),
            JobStatus::Succeeded("https://v/1.mp4".to_string())
        );
        assert_eq!(
            JobStatus::<String>::from_payload(&json!({"state": "done", "output": {"images": [], "url": "https://i/1.png"}})),
            JobStatus::Succeeded("https://i/1.png".to_string())
        );
        assert_eq!(
            JobStatus::<String>::from_payload(&json!({"data": {"outputs": ["https://a/1.wav"]}})),
            JobStatus::Succeeded("https://a/1.wav".to_string())
        );
        assert_eq!(
            JobStatus::<String>::from_payload(&json!({"status": "FAILED", "error": "quota"})),
            JobStatus::Failed("quota".to_string())
        );
        assert_eq!(
            JobStatus::<String>::from_payload(&json!({"status": "cancelled"})),
            JobStatus::Failed("job reported status cancelled".to_string())
        );
    }
}

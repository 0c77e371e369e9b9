//! Provider adapters for the poll controller.
//!
//! Each generation service only says how to submit and how to read a status;
//! the polling loop itself is shared.

use async_trait::async_trait;
use tracing::Instrument;

use super::{ExternalJobId, JobStatus, PollConfig, submit_and_poll};
use crate::domain::CallError;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    type Request: Send + Sync;
    type Output: Send;

    fn name(&self) -> &str;

    async fn submit(&self, request: &Self::Request) -> Result<ExternalJobId, CallError>;

    async fn check_status(
        &self,
        job_id: &ExternalJobId,
    ) -> Result<JobStatus<Self::Output>, CallError>;
}

/// Submit `request` to `provider` and poll it to completion.
pub async fn run_provider<P>(
    provider: &P,
    request: &P::Request,
    config: &PollConfig,
) -> Result<P::Output, CallError>
where
    P: GenerationProvider + ?Sized,
{
    let span = tracing::info_span!("provider", name = provider.name());
    submit_and_poll(
        || provider.submit(request),
        move |job_id| async move { provider.check_status(&job_id).await },
        config,
    )
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fake video service answering with raw JSON payloads.
    struct FakeVideoProvider {
        submitted: Mutex<Vec<String>>,
        payloads: Mutex<VecDeque<serde_json::Value>>,
    }

    impl FakeVideoProvider {
        fn new(payloads: Vec<serde_json::Value>) -> Self {
            Self {
                submitted: Mutex::new(Vec::new()),
                payloads: Mutex::new(payloads.into()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeVideoProvider {
        type Request = String;
        type Output = String;

        fn name(&self) -> &str {
            "fake-video"
        }

        async fn submit(&self, prompt: &String) -> Result<ExternalJobId, CallError> {
            self.submitted.lock().unwrap().push(prompt.clone());
            Ok(ExternalJobId::new("vid-42"))
        }

        async fn check_status(&self, job_id: &ExternalJobId) -> Result<JobStatus<String>, CallError> {
            assert_eq!(job_id.as_str(), "vid-42");
            let payload = self
                .payloads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| json!({"status": "processing"}));
            Ok(JobStatus::<String>::from_payload(&payload))
        }
    }

    fn config() -> PollConfig {
        PollConfig::new(Duration::from_millis(50), Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn adapter_supplies_submit_and_status() {
        let provider = FakeVideoProvider::new(vec![
            json!({"status": "queued"}),
            json!({"status": "completed", "result": {"video_url": "https://v/42.mp4"}}),
        ]);

        let out = run_provider(&provider, &"a cat".to_string(), &config())
            .await
            .unwrap();

        assert_eq!(out, "https://v/42.mp4");
        assert_eq!(provider.submitted.lock().unwrap().as_slice(), ["a cat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn adapter_surfaces_job_failure() {
        let provider = FakeVideoProvider::new(vec![json!({"status": "error", "message": "gpu oom"})]);

        let err = run_provider(&provider, &"a dog".to_string(), &config())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::JobFailed);
        assert_eq!(err.message, "gpu oom");
    }

    #[tokio::test(start_paused = true)]
    async fn adapter_times_out() {
        let provider = FakeVideoProvider::new(vec![]);
        let err = run_provider(&provider, &"slow".to_string(), &config())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}

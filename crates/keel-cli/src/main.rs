use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keel_core::domain::{BodyError, CallError, Task, TaskId, TaskRecord};
use keel_core::failure::{FailureTracker, FailureTrackerConfig, RetryLoop};
use keel_core::impls::{ChannelAlertSink, InMemoryFailureStore, InMemoryTaskStore};
use keel_core::lock::LockManager;
use keel_core::poll::{ExternalJobId, GenerationProvider, JobStatus, PollConfig, run_provider};
use keel_core::ports::SystemClock;
use keel_core::retry::{RetryPolicy, call_with_retry};
use keel_core::runner::{TaskRunner, unit_fn};
use keel_core::CoreConfig;

/// `RUST_LOG` picks the filter (default `info`); `KEEL_LOG_JSON=1` switches to
/// JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("KEEL_LOG_JSON").is_ok_and(|v| v == "1");

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Short delays so the demo finishes in a few seconds. `KEEL_CONFIG` points
/// at a JSON file that replaces them.
fn load_config() -> Result<CoreConfig, Box<dyn Error>> {
    match std::env::var("KEEL_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            info!(%path, "config loaded");
            Ok(CoreConfig::from_json_str(&raw)?)
        }
        Err(_) => Ok(CoreConfig::default()
            .with_retry(RetryPolicy::new(3, Duration::from_millis(200)))
            .with_poll(PollConfig::new(
                Duration::from_millis(250),
                Duration::from_secs(10),
            ))
            .with_failure(FailureTrackerConfig::new(3, Duration::ZERO))),
    }
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    title: String,
    words: usize,
}

/// Image service that needs a couple of polls before the asset is ready.
struct FakeImageService {
    checks: AtomicU32,
}

#[async_trait]
impl GenerationProvider for FakeImageService {
    type Request = String;
    type Output = String;

    fn name(&self) -> &str {
        "fake-image"
    }

    async fn submit(&self, prompt: &String) -> Result<ExternalJobId, CallError> {
        info!(%prompt, "submitting image job");
        Ok(ExternalJobId::new("img-0001"))
    }

    async fn check_status(&self, job_id: &ExternalJobId) -> Result<JobStatus<String>, CallError> {
        let n = self.checks.fetch_add(1, Ordering::SeqCst);
        let payload = if n < 2 {
            serde_json::json!({ "id": job_id.as_str(), "status": "processing" })
        } else {
            serde_json::json!({
                "id": job_id.as_str(),
                "status": "done",
                "output": { "image_url": "https://cdn.example.com/img-0001.png" }
            })
        };
        Ok(JobStatus::from_payload(&payload))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let config = load_config()?;

    // (A) single-flight: two runs of the same task, one wins
    let tasks = Arc::new(InMemoryTaskStore::new());
    tasks.insert(TaskRecord::pending("article-42")).await;
    let runner = TaskRunner::new(LockManager::in_memory())
        .with_store(tasks.clone())
        .with_config(config.runner);

    let summarize = unit_fn("summarize", |text: String| async move {
        sleep(Duration::from_millis(200)).await;
        if text.is_empty() {
            return Err(BodyError::new("nothing to summarize"));
        }
        Ok(Summary {
            title: text.split_whitespace().take(3).collect::<Vec<_>>().join(" "),
            words: text.split_whitespace().count(),
        })
    });
    let task = Task::new(
        "article-42",
        "Rust makes fearless concurrency practical for everyday services".to_string(),
    );

    let (first, second) = tokio::join!(runner.run(&summarize, &task), runner.run(&summarize, &task));
    for result in [&first, &second] {
        match result {
            Ok(summary) => info!(?summary, "run finished"),
            Err(err) => warn!(kind = %err.kind, %err, "run rejected"),
        }
    }
    if let Some(record) = tasks.get(&TaskId::new("article-42")).await {
        println!("task record: {}", serde_json::to_string(&record)?);
    }
    println!("runner stats: {}", serde_json::to_string(&runner.stats())?);

    // (B) retry: a flaky upstream recovers on the third attempt
    let calls = AtomicU32::new(0);
    let fetched = call_with_retry(&config.retry, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(CallError::from_status(503, "upstream warming up"))
            } else {
                Ok("feed contents")
            }
        }
    })
    .await?;
    println!("fetched {fetched:?} after {} calls", calls.load(Ordering::SeqCst));

    // (C) submit-then-poll against a slow generation service
    let images = FakeImageService {
        checks: AtomicU32::new(0),
    };
    let image = run_provider(&images, &"a lighthouse at dusk".to_string(), &config.poll).await?;
    println!("image ready: {image}");

    // (D) failure tracking: a publish target that never recovers
    let (alert_sink, mut alerts) = ChannelAlertSink::channel(16);
    let alert_consumer = tokio::spawn(async move {
        while let Some(alert) = alerts.recv().await {
            match serde_json::to_string(&alert) {
                Ok(body) => println!("alert webhook body: {body}"),
                Err(err) => warn!(error = %err, "alert not serializable"),
            }
        }
    });

    let tracker = Arc::new(FailureTracker::new(
        Arc::new(InMemoryFailureStore::new()),
        Arc::new(alert_sink),
        Arc::new(SystemClock),
        config.failure,
    ));
    tracker
        .track_failure("x:post-42", CallError::from_status(502, "bad gateway"))
        .await?;

    let retry_loop = RetryLoop::spawn(tracker.clone(), Duration::from_millis(100), |record| async move {
        info!(resource_key = %record.resource_key, attempts = record.attempts, "republishing");
        Err::<(), _>(CallError::from_status(502, "bad gateway"))
    });
    sleep(Duration::from_millis(500)).await;
    retry_loop.shutdown_and_join().await;

    if let Some(record) = tracker.get("x:post-42").await? {
        println!("failure record: {}", serde_json::to_string(&record)?);
    }

    // closing the tracker drops the last sender and ends the consumer
    drop(tracker);
    let _ = alert_consumer.await;
    Ok(())
}

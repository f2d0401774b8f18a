use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::TaskId;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, warn};

/// Receives the page transition once a submission has been accepted. The
/// front end decides what navigation means (open a browser, print a URL);
/// the scheduler only decides when it happens.
#[async_trait]
pub trait NavigationSink: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
}

/// Default sink for front ends that have not wired navigation.
pub struct MissingNavigationSink;

#[async_trait]
impl NavigationSink for MissingNavigationSink {
    async fn navigate(&self, url: &str) -> Result<()> {
        Err(anyhow!("navigation sink is unavailable (wanted '{url}')"))
    }
}

/// Schedules navigation to the result view of an accepted task after a
/// fixed delay, leaving the success state visible for a moment first. An
/// identifier arriving before the pending navigation fires replaces it;
/// the latest identifier wins.
pub struct RedirectScheduler {
    base_url: String,
    delay: Duration,
    sink: Arc<dyn NavigationSink>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RedirectScheduler {
    pub fn new(
        base_url: impl Into<String>,
        delay: Duration,
        sink: Arc<dyn NavigationSink>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            delay,
            sink,
            pending: Mutex::new(None),
        }
    }

    /// Result view address for a task.
    pub fn analysis_url(&self, task_id: &TaskId) -> String {
        format!("{}/analysis/{task_id}", self.base_url)
    }

    pub async fn schedule(&self, task_id: TaskId) {
        let url = self.analysis_url(&task_id);
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(%url, "navigating to analysis view");
            if let Err(err) = sink.navigate(&url).await {
                warn!(error = %err, "navigation failed");
            }
        });

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Wait for the pending navigation, if any, to fire or be aborted.
    pub async fn settle(&self) {
        let handle = self.pending.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{multipart, Client};
use shared::{
    domain::{TaskId, UploadId, UploadState, WorkerCatalog, WorkerDescriptor},
    error::rejection_message,
    protocol::{
        encode_disabled_workers, SubmitResponse, FIELD_FILE, FIELD_PASSWORD,
        FIELD_WORKERS_DISABLED, HEADER_CSRF_TOKEN,
    },
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex, Semaphore},
    task::JoinHandle,
};
use tracing::{info, warn};
use url::Url;

pub mod redirect;
pub mod settings;

pub use redirect::{MissingNavigationSink, NavigationSink, RedirectScheduler};
pub use settings::{load_settings, Settings};

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Shown when a failure carries no usable server text.
pub const DEFAULT_REJECTION_MESSAGE: &str = "file submission failed";

/// Terminal failure classification for one upload. `TooLarge` is decided
/// locally before any network call; `Rejected` carries the (sanitized)
/// server text; `Network` covers transport failures where no detail can be
/// assumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitFailure {
    #[error("file exceeds the maximum size of {max_mb} MB")]
    TooLarge { max_mb: u64 },
    #[error("{0}")]
    Rejected(String),
    #[error("network error while submitting the file")]
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown worker '{0}'")]
pub struct UnknownWorker(pub String);

#[derive(Debug, Clone)]
pub struct SelectionEntry {
    pub worker: WorkerDescriptor,
    pub enabled: bool,
}

/// Per-module enabled flags over the selectable catalog. Every surfaced
/// worker starts enabled; only an explicit toggle changes a flag. Workers
/// filtered out of the catalog (zero replicas) do not exist here at all.
#[derive(Debug, Clone)]
pub struct WorkerSelectionMatrix {
    entries: Vec<SelectionEntry>,
}

impl WorkerSelectionMatrix {
    pub fn from_catalog(catalog: &WorkerCatalog) -> Self {
        Self {
            entries: catalog
                .selectable()
                .cloned()
                .map(|worker| SelectionEntry {
                    worker,
                    enabled: true,
                })
                .collect(),
        }
    }

    /// Flip one worker's flag, returning the new enabled value.
    pub fn toggle(&mut self, worker_name: &str) -> std::result::Result<bool, UnknownWorker> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.worker.name == worker_name)
            .ok_or_else(|| UnknownWorker(worker_name.to_string()))?;
        entry.enabled = !entry.enabled;
        Ok(entry.enabled)
    }

    /// Currently disabled worker names, catalog order. Pure read.
    pub fn disabled_workers(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.enabled)
            .map(|e| e.worker.name.clone())
            .collect()
    }

    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }
}

/// Optional decryption secret for password-protected files. Hiding the
/// control keeps the typed value but makes it inapplicable: submissions
/// read the secret only through `current_secret`.
#[derive(Debug, Clone, Default)]
pub struct SecretDisclosure {
    visible: bool,
    value: String,
}

impl SecretDisclosure {
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn current_secret(&self) -> &str {
        if self.visible {
            &self.value
        } else {
            ""
        }
    }
}

/// Immutable snapshot frozen at the moment a file enters Uploading. Later
/// matrix or secret changes never reach a payload that already exists.
#[derive(Debug, Clone)]
struct SubmissionPayload {
    filename: String,
    file_bytes: Vec<u8>,
    disabled_workers: Vec<String>,
    secret: String,
    csrf_token: String,
}

/// One file in the submission queue.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub upload_id: UploadId,
    pub filename: String,
    pub size_bytes: u64,
    pub queued_at: DateTime<Utc>,
    pub state: UploadState,
    pub failure: Option<SubmitFailure>,
    pub task_id: Option<TaskId>,
}

impl UploadTask {
    /// Message to render against this task's status region, if any.
    pub fn status_message(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    UploadQueued {
        upload_id: UploadId,
        filename: String,
    },
    UploadStarted {
        upload_id: UploadId,
    },
    UploadSucceeded {
        upload_id: UploadId,
        task_id: TaskId,
    },
    UploadFailed {
        upload_id: UploadId,
        message: String,
    },
    NavigationScheduled {
        task_id: TaskId,
    },
}

struct SubmissionState {
    selection: WorkerSelectionMatrix,
    secret: SecretDisclosure,
    tasks: HashMap<UploadId, UploadTask>,
    order: Vec<UploadId>,
    uploads: Vec<JoinHandle<()>>,
}

/// Owns the per-file submission lifecycle: queueing, the local size check,
/// snapshotting the selection and secret at dispatch time, the multipart
/// upload itself, and handing accepted task identifiers to the redirect
/// scheduler. One spawned task per upload, bounded by a semaphore.
pub struct SubmissionClient {
    http: Client,
    server_url: Url,
    csrf_token: String,
    max_file_size_bytes: u64,
    upload_permits: Arc<Semaphore>,
    redirect: RedirectScheduler,
    inner: Mutex<SubmissionState>,
    events: broadcast::Sender<ClientEvent>,
}

impl SubmissionClient {
    pub fn new(settings: &Settings) -> Result<Arc<Self>> {
        Self::new_with_sink(settings, Arc::new(MissingNavigationSink))
    }

    pub fn new_with_sink(
        settings: &Settings,
        navigation: Arc<dyn NavigationSink>,
    ) -> Result<Arc<Self>> {
        let server_url = Url::parse(&settings.server_url)
            .with_context(|| format!("invalid server url '{}'", settings.server_url))?;
        let redirect =
            RedirectScheduler::new(server_url.as_str(), settings.redirect_delay(), navigation);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            http: Client::new(),
            server_url,
            csrf_token: settings.csrf_token.clone(),
            max_file_size_bytes: settings.max_file_size_mb * BYTES_PER_MEGABYTE,
            upload_permits: Arc::new(Semaphore::new(settings.max_concurrent_uploads.max(1))),
            redirect,
            inner: Mutex::new(SubmissionState {
                selection: WorkerSelectionMatrix::from_catalog(&settings.catalog()),
                secret: SecretDisclosure::default(),
                tasks: HashMap::new(),
                order: Vec::new(),
                uploads: Vec::new(),
            }),
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn toggle_worker(
        &self,
        worker_name: &str,
    ) -> std::result::Result<bool, UnknownWorker> {
        let mut inner = self.inner.lock().await;
        inner.selection.toggle(worker_name)
    }

    /// Ordered view of the selection panel.
    pub async fn worker_panel(&self) -> Vec<SelectionEntry> {
        let inner = self.inner.lock().await;
        inner.selection.entries().to_vec()
    }

    pub async fn disabled_workers(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.selection.disabled_workers()
    }

    pub async fn set_secret_visible(&self, visible: bool) {
        let mut inner = self.inner.lock().await;
        inner.secret.set_visible(visible);
    }

    pub async fn set_secret_value(&self, value: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.secret.set_value(value);
    }

    /// Queued tasks in the order they were added.
    pub async fn tasks(&self) -> Vec<UploadTask> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .cloned()
            .collect()
    }

    pub async fn task(&self, upload_id: UploadId) -> Option<UploadTask> {
        let inner = self.inner.lock().await;
        inner.tasks.get(&upload_id).cloned()
    }

    /// Accept a file into the queue. Oversize files fail immediately with
    /// the local size message and never touch the network; everything else
    /// is handed to a spawned upload task.
    pub async fn enqueue_file(
        self: &Arc<Self>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> UploadId {
        let filename = filename.into();
        let size_bytes = bytes.len() as u64;
        let upload_id = UploadId::new();
        let task = UploadTask {
            upload_id,
            filename: filename.clone(),
            size_bytes,
            queued_at: Utc::now(),
            state: UploadState::Queued,
            failure: None,
            task_id: None,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.tasks.insert(upload_id, task);
            inner.order.push(upload_id);
        }
        info!(upload_id = %upload_id, filename = %filename, size_bytes, "queued file for submission");
        let _ = self.events.send(ClientEvent::UploadQueued {
            upload_id,
            filename: filename.clone(),
        });

        if size_bytes > self.max_file_size_bytes {
            let failure = SubmitFailure::TooLarge {
                max_mb: self.max_file_size_bytes / BYTES_PER_MEGABYTE,
            };
            self.fail_task(upload_id, failure).await;
            return upload_id;
        }

        let client = Arc::clone(self);
        let handle = tokio::spawn(async move {
            client.run_upload(upload_id, filename, bytes).await;
        });
        self.inner.lock().await.uploads.push(handle);
        upload_id
    }

    /// Wait for every spawned upload to reach a terminal state. Navigation
    /// scheduled by successes may still be pending afterwards; see
    /// [`SubmissionClient::settle_redirect`].
    pub async fn join_uploads(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut inner = self.inner.lock().await;
                std::mem::take(&mut inner.uploads)
            };
            if handles.is_empty() {
                return;
            }
            futures::future::join_all(handles).await;
        }
    }

    /// Wait for a pending navigation to fire (or be superseded).
    pub async fn settle_redirect(&self) {
        self.redirect.settle().await;
    }

    async fn run_upload(self: Arc<Self>, upload_id: UploadId, filename: String, bytes: Vec<u8>) {
        let permit = match Arc::clone(&self.upload_permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let payload = self.begin_upload(upload_id, filename, bytes).await;
        let outcome = self.dispatch(payload).await;
        drop(permit);

        match outcome {
            Ok(task_id) => self.succeed_task(upload_id, task_id).await,
            Err(failure) => self.fail_task(upload_id, failure).await,
        }
    }

    /// Uploading entry point: the one place live selection and secret state
    /// are read. The returned payload is carried unchanged through the rest
    /// of the pipeline.
    async fn begin_upload(
        &self,
        upload_id: UploadId,
        filename: String,
        file_bytes: Vec<u8>,
    ) -> SubmissionPayload {
        let payload = {
            let mut inner = self.inner.lock().await;
            if let Some(task) = inner.tasks.get_mut(&upload_id) {
                task.state = UploadState::Uploading;
            }
            SubmissionPayload {
                filename,
                file_bytes,
                disabled_workers: inner.selection.disabled_workers(),
                secret: inner.secret.current_secret().to_string(),
                csrf_token: self.csrf_token.clone(),
            }
        };
        info!(
            upload_id = %upload_id,
            disabled_workers = payload.disabled_workers.len(),
            "dispatching file"
        );
        let _ = self.events.send(ClientEvent::UploadStarted { upload_id });
        payload
    }

    async fn dispatch(
        &self,
        payload: SubmissionPayload,
    ) -> std::result::Result<TaskId, SubmitFailure> {
        let file_part = multipart::Part::bytes(payload.file_bytes).file_name(payload.filename);
        let form = multipart::Form::new()
            .part(FIELD_FILE, file_part)
            .text(
                FIELD_WORKERS_DISABLED,
                encode_disabled_workers(&payload.disabled_workers),
            )
            .text(FIELD_PASSWORD, payload.secret);

        let response = match self
            .http
            .post(self.endpoint("submit"))
            .header(HEADER_CSRF_TOKEN, payload.csrf_token)
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "transport failure during submission");
                return Err(SubmitFailure::Network);
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message =
                rejection_message(&body).unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string());
            return Err(SubmitFailure::Rejected(message));
        }

        match serde_json::from_str::<SubmitResponse>(&body) {
            Ok(accepted) => Ok(accepted.task_id),
            Err(err) => {
                warn!(error = %err, "success status without a task identifier");
                let message = rejection_message(&body)
                    .unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string());
                Err(SubmitFailure::Rejected(message))
            }
        }
    }

    async fn succeed_task(&self, upload_id: UploadId, task_id: TaskId) {
        {
            let mut inner = self.inner.lock().await;
            if let Some(task) = inner.tasks.get_mut(&upload_id) {
                task.state = UploadState::Succeeded;
                task.task_id = Some(task_id.clone());
            }
        }
        info!(upload_id = %upload_id, task_id = %task_id, "submission accepted");
        let _ = self.events.send(ClientEvent::UploadSucceeded {
            upload_id,
            task_id: task_id.clone(),
        });
        self.redirect.schedule(task_id.clone()).await;
        let _ = self
            .events
            .send(ClientEvent::NavigationScheduled { task_id });
    }

    async fn fail_task(&self, upload_id: UploadId, failure: SubmitFailure) {
        let message = failure.to_string();
        {
            let mut inner = self.inner.lock().await;
            if let Some(task) = inner.tasks.get_mut(&upload_id) {
                task.state = UploadState::Failed;
                task.failure = Some(failure);
            }
        }
        warn!(upload_id = %upload_id, reason = %message, "submission failed");
        let _ = self
            .events
            .send(ClientEvent::UploadFailed { upload_id, message });
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.server_url.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

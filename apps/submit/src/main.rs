use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use client_core::{load_settings, ClientEvent, NavigationSink, SubmissionClient};
use shared::domain::{format_size, UploadState};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(about = "Submit files to the analysis service")]
struct Args {
    /// Settings file (defaults to ./submitter.toml; env overrides apply)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the service base URL
    #[arg(long)]
    server_url: Option<String>,
    /// Anti-forgery token attached to every submission
    #[arg(long)]
    csrf_token: Option<String>,
    /// Disable an analysis worker for this submission (repeatable)
    #[arg(long = "disable", value_name = "WORKER")]
    disabled_workers: Vec<String>,
    /// Decryption password for protected archives
    #[arg(long)]
    password: Option<String>,
    /// List the selectable workers and exit
    #[arg(long)]
    list_workers: bool,
    /// Files to submit
    files: Vec<PathBuf>,
}

struct PrintNavigationSink;

#[async_trait]
impl NavigationSink for PrintNavigationSink {
    async fn navigate(&self, url: &str) -> Result<()> {
        println!("analysis ready: {url}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(csrf_token) = args.csrf_token {
        settings.csrf_token = csrf_token;
    }

    if args.list_workers {
        for worker in settings.catalog().selectable() {
            println!(
                "{:<16} {} ({} replicas): {}",
                worker.name, worker.display_name, worker.replicas, worker.description
            );
        }
        return Ok(());
    }

    if args.files.is_empty() {
        bail!("no files to submit; pass one or more paths");
    }

    let client = SubmissionClient::new_with_sink(&settings, Arc::new(PrintNavigationSink))?;

    if !args.disabled_workers.is_empty() && !settings.show_worker_details {
        warn!("worker selection panel is hidden by configuration; --disable flags are ignored");
    } else {
        for name in &args.disabled_workers {
            client.toggle_worker(name).await?;
        }
    }

    if let Some(password) = args.password {
        client.set_secret_value(password).await;
        client.set_secret_visible(true).await;
    }

    let mut events = client.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::UploadSucceeded { upload_id, task_id } => {
                    println!("[{upload_id}] accepted as task {task_id}");
                }
                ClientEvent::UploadFailed { upload_id, message } => {
                    eprintln!("[{upload_id}] failed: {message}");
                }
                _ => {}
            }
        }
    });

    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        println!("submitting {filename} ({})", format_size(bytes.len() as u64));
        client.enqueue_file(filename, bytes).await;
    }

    client.join_uploads().await;
    client.settle_redirect().await;
    printer.abort();

    if client
        .tasks()
        .await
        .iter()
        .all(|task| task.state == UploadState::Failed)
    {
        bail!("all submissions failed");
    }
    Ok(())
}

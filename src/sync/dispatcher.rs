use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::auth::Credentials;
use crate::remote::{RemoteConnector, RemoteStore};
use crate::util::path as sync_path;

use super::progress::UploadProgress;
use super::resolver::FolderCache;
use super::scanner::LocalFile;

const MAX_WORKERS: usize = 4;

/// Default pool size: one less than the available parallelism, at most
/// four, at least one.
pub fn default_pool_size(available: usize) -> usize {
    available.saturating_sub(1).clamp(1, MAX_WORKERS)
}

pub fn pool_size(configured: Option<usize>) -> usize {
    match configured {
        Some(n) => n.max(1),
        None => {
            let available = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            default_pool_size(available)
        }
    }
}

/// One upload handed to a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: usize,
    pub file: LocalFile,
    /// Destination folder relative to the target root ("" for the root).
    pub folder_path: String,
    pub target_root: String,
}

#[derive(Debug)]
struct Outcome {
    id: usize,
    result: Result<String, String>,
}

/// What happened to the files of one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub uploaded: usize,
    /// `(relative path, error)` for every failed upload.
    pub failed: Vec<(String, String)>,
}

/// Fixed pool of upload workers fed from a bounded FIFO queue.
pub struct Dispatcher<C: RemoteConnector> {
    connector: Arc<C>,
    credentials: Credentials,
    folders: Arc<FolderCache>,
    workers: usize,
}

impl<C: RemoteConnector> Dispatcher<C> {
    pub fn new(
        connector: Arc<C>,
        credentials: Credentials,
        folders: Arc<FolderCache>,
        workers: usize,
    ) -> Self {
        Self {
            connector,
            credentials,
            folders,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Upload `files` under `target_root`, each into the folder named by its
    /// relative path. Waits for every file; failures are collected, not
    /// propagated, and never stop the other uploads.
    pub async fn dispatch(
        &self,
        files: Vec<LocalFile>,
        target_root: &str,
        progress: &UploadProgress,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        if files.is_empty() {
            return report;
        }

        let items: Vec<WorkItem> = files
            .into_iter()
            .enumerate()
            .map(|(id, file)| WorkItem {
                id,
                folder_path: sync_path::parent_folder(&file.relative_path).to_string(),
                target_root: target_root.to_string(),
                file,
            })
            .collect();
        let total = items.len();
        let mut pending: HashMap<usize, String> = items
            .iter()
            .map(|item| (item.id, item.file.relative_path.clone()))
            .collect();

        let (job_tx, job_rx) = mpsc::channel::<WorkItem>(self.workers * 2);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Outcome>();
        let queue = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for index in 0..self.workers.min(total) {
            workers.spawn(run_worker(
                index,
                self.connector.clone(),
                self.credentials.clone(),
                self.folders.clone(),
                queue.clone(),
                result_tx.clone(),
            ));
        }
        // Workers hold the only remaining handles.
        drop(result_tx);
        drop(queue);

        let feeder = tokio::spawn(async move {
            for item in items {
                if job_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let mut completed = 0usize;
        while let Some(outcome) = result_rx.recv().await {
            let Some(path) = pending.remove(&outcome.id) else {
                continue;
            };
            completed += 1;
            match outcome.result {
                Ok(remote_id) => {
                    report.uploaded += 1;
                    progress.suspend(|| tracing::debug!(path = %path, id = %remote_id, "uploaded"));
                    progress.update(completed, format!("Copied: {path}"));
                }
                Err(error) => {
                    progress.suspend(|| tracing::error!(path = %path, error = %error, "upload failed"));
                    progress.update(completed, format!("Failed: {path}"));
                    report.failed.push((path, error));
                }
            }
            if pending.is_empty() {
                break;
            }
        }

        // Anything left was taken by a worker that died, or never taken
        // because every worker died.
        let mut orphaned: Vec<(usize, String)> = pending.into_iter().collect();
        orphaned.sort();
        for (_, path) in orphaned {
            completed += 1;
            let error = "upload worker terminated before finishing this file".to_string();
            progress.suspend(|| tracing::error!(path = %path, error = %error, "upload failed"));
            progress.update(completed, format!("Failed: {path}"));
            report.failed.push((path, error));
        }

        if let Err(e) = feeder.await {
            tracing::warn!(error = %e, "job feeder task failed");
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "upload worker terminated abnormally");
            }
        }

        report
    }
}

/// Pull items until the queue is closed and drained.
async fn run_worker<C: RemoteConnector>(
    index: usize,
    connector: Arc<C>,
    credentials: Credentials,
    folders: Arc<FolderCache>,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    results: mpsc::UnboundedSender<Outcome>,
) {
    let store = connector.connect(credentials).map_err(|e| format!("{e:#}"));
    if let Err(e) = &store {
        tracing::error!(worker = index, error = %e, "worker could not connect");
    }

    loop {
        let next = queue.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };

        tracing::trace!(worker = index, path = %item.file.relative_path, "picked up");
        let result = match &store {
            Ok(store) => upload_one(store, &folders, &item)
                .await
                .map_err(|e| format!("{e:#}")),
            Err(e) => Err(e.clone()),
        };

        if results.send(Outcome { id: item.id, result }).is_err() {
            break;
        }
    }
    tracing::trace!(worker = index, "worker finished");
}

async fn upload_one<S: RemoteStore>(store: &S, folders: &FolderCache, item: &WorkItem) -> Result<String> {
    let parent_id = folders
        .ensure(store, &item.folder_path, &item.target_root)
        .await?;
    store
        .upload_file(&item.file.full_path, &item.file.name, &parent_id)
        .await
}

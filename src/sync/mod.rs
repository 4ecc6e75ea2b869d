pub mod dispatcher;
pub mod progress;
pub mod reconciler;
pub mod resolver;
pub mod scanner;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::auth::Credentials;
use crate::config::{CompareWith, SyncConfig};
use crate::remote::RemoteConnector;

use dispatcher::Dispatcher;
use progress::UploadProgress;
use reconciler::Reconciliation;
use resolver::FolderCache;
use scanner::LocalFile;

/// Per-folder and per-run counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Uploaded successfully.
    pub copied: usize,
    /// Already present remotely.
    pub skipped: usize,
    /// Upload attempted and failed.
    pub failed: usize,
    /// Local files considered.
    pub total: usize,
}

impl std::ops::AddAssign for SyncStats {
    fn add_assign(&mut self, other: Self) {
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.total += other.total;
    }
}

impl SyncStats {
    /// The end-of-run report, one line per count.
    pub fn summary(&self, dry_run: bool) -> String {
        let copied_label = if dry_run { "Files to copy" } else { "Files copied" };
        let mut lines = vec![
            "Sync Summary:".to_string(),
            format!("- {copied_label}: {}", self.copied),
            format!("- Files skipped: {}", self.skipped),
        ];
        if self.failed > 0 {
            lines.push(format!("- Files failed: {}", self.failed));
        }
        lines.push(format!("- Total files processed: {}", self.total));
        lines.join("\n")
    }

    pub fn print_summary(&self, dry_run: bool) {
        println!();
        println!("{}", self.summary(dry_run));
    }
}

/// Stages of one run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticating,
    ScanningSubfolders,
    SyncingRoot,
    SyncingSubfolder(usize),
    Summarizing,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Reconcile and report, upload nothing.
    pub dry_run: bool,
    /// Draw the progress bar.
    pub show_progress: bool,
}

/// Runs one upload sync of a local folder into a remote folder.
pub struct SyncEngine<C: RemoteConnector> {
    connector: Arc<C>,
    credentials: Credentials,
    config: SyncConfig,
    workers: usize,
    options: SyncOptions,
}

impl<C: RemoteConnector> SyncEngine<C> {
    pub fn new(
        connector: Arc<C>,
        credentials: Credentials,
        config: SyncConfig,
        workers: usize,
        options: SyncOptions,
    ) -> Self {
        Self {
            connector,
            credentials,
            config,
            workers,
            options,
        }
    }

    /// Sync the root folder, then each first-level subfolder in order, and
    /// return the summed stats. Only failing to connect aborts the run;
    /// a folder that fails contributes nothing.
    pub async fn run(&self) -> Result<SyncStats> {
        let mut phase = Phase::Authenticating;
        enter(&mut phase, Phase::Authenticating);
        let store = self
            .connector
            .connect(self.credentials.clone())
            .context("Failed to connect to remote store")?;

        let dispatcher = Dispatcher::new(
            self.connector.clone(),
            self.credentials.clone(),
            Arc::new(FolderCache::new()),
            self.workers,
        );
        let root = &self.config.local_folder_path;
        let target = &self.config.target_folder_id;

        enter(&mut phase, Phase::ScanningSubfolders);
        let subfolders =
            scanner::list_subfolders(root, &self.config.skip_patterns, self.config.match_mode)
                .await;
        tracing::info!(count = subfolders.len(), "found subfolders");

        enter(&mut phase, Phase::SyncingRoot);
        let mut totals = self
            .sync_folder_logged(&store, &dispatcher, root, "")
            .await;

        for (index, folder) in subfolders.iter().enumerate() {
            enter(&mut phase, Phase::SyncingSubfolder(index));
            tracing::info!(
                folder = %folder.name,
                "processing subfolder {}/{}", index + 1, subfolders.len()
            );
            totals += self
                .sync_folder_logged(&store, &dispatcher, &folder.path, &folder.name)
                .await;
        }

        enter(&mut phase, Phase::Summarizing);
        tracing::info!(
            copied = totals.copied,
            skipped = totals.skipped,
            failed = totals.failed,
            total = totals.total,
            target = %target,
            "sync finished"
        );
        enter(&mut phase, Phase::Done);
        Ok(totals)
    }

    async fn sync_folder_logged(
        &self,
        store: &C::Store,
        dispatcher: &Dispatcher<C>,
        local_folder: &Path,
        base_path: &str,
    ) -> SyncStats {
        match self
            .sync_folder(store, dispatcher, local_folder, base_path)
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(folder = %local_folder.display(), error = %format!("{e:#}"), "folder sync failed");
                SyncStats::default()
            }
        }
    }

    /// Scan, reconcile and dispatch one local folder.
    async fn sync_folder(
        &self,
        store: &C::Store,
        dispatcher: &Dispatcher<C>,
        local_folder: &Path,
        base_path: &str,
    ) -> Result<SyncStats> {
        tracing::info!(folder = %local_folder.display(), "processing folder");
        let local_files = scanner::list_files(
            local_folder,
            base_path,
            &self.config.skip_patterns,
            self.config.match_mode,
        )
        .await;
        if local_files.is_empty() {
            tracing::info!(folder = %local_folder.display(), "no files to sync in this folder");
            return Ok(SyncStats::default());
        }
        tracing::info!(count = local_files.len(), "local files to process");

        let reconciliation = self
            .reconcile_folder(store, local_files, base_path)
            .await?;
        let Reconciliation { to_sync, to_skip } = reconciliation;

        for file in &to_skip {
            tracing::info!(
                path = %file.relative_path,
                size = %format_size(file.size),
                "skipping existing file"
            );
        }

        let mut stats = SyncStats {
            skipped: to_skip.len(),
            total: to_sync.len() + to_skip.len(),
            ..SyncStats::default()
        };

        if to_sync.is_empty() {
            return Ok(stats);
        }

        if self.options.dry_run {
            for file in &to_sync {
                println!("would upload {} ({})", file.relative_path, format_size(file.size));
            }
            stats.copied = to_sync.len();
            return Ok(stats);
        }

        tracing::info!(
            count = to_sync.len(),
            workers = dispatcher.workers(),
            "uploading files"
        );
        let progress = if self.options.show_progress {
            UploadProgress::new(to_sync.len())
        } else {
            UploadProgress::hidden(to_sync.len())
        };
        let report = dispatcher
            .dispatch(to_sync, &self.config.target_folder_id, &progress)
            .await;
        progress.finish();

        stats.copied = report.uploaded;
        stats.failed = report.failed.len();
        Ok(stats)
    }

    /// By default every folder is compared against the target folder, so
    /// `photos/a.jpg` is skipped when the target holds an `a.jpg`. With
    /// `compare_with = "subfolder"` a subfolder is compared against the
    /// remote folder of the same name instead; when that does not exist yet
    /// every file is new.
    async fn reconcile_folder(
        &self,
        store: &C::Store,
        local_files: Vec<LocalFile>,
        base_path: &str,
    ) -> Result<Reconciliation> {
        let target = &self.config.target_folder_id;
        if base_path.is_empty() || self.config.compare_with == CompareWith::Root {
            return reconciler::reconcile(store, local_files, target).await;
        }

        match resolver::find_path(store, base_path, target).await? {
            Some(remote_id) => {
                tracing::debug!(folder = base_path, id = %remote_id, "remote folder exists");
                reconciler::reconcile(store, local_files, &remote_id).await
            }
            None => {
                tracing::debug!(folder = base_path, "remote folder missing, all files are new");
                Ok(Reconciliation::all_new(local_files))
            }
        }
    }
}

fn enter(current: &mut Phase, next: Phase) {
    let previous = *current;
    tracing::debug!(from = ?previous, to = ?next, "phase");
    *current = next;
}

fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

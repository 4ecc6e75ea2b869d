use std::future::Future;
use std::pin::Pin;

use anyhow::Result;

use crate::remote::{ListQuery, RemoteStore};
use crate::util::path::{self as sync_path, MatchMode};

/// A remote file found by [`walk_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub relative_path: String,
    pub id: String,
    pub size: Option<u64>,
}

/// Recursively list every file under `folder_id`, skipping matching paths.
pub fn walk_remote<'a, S: RemoteStore + ?Sized>(
    store: &'a S,
    folder_id: &'a str,
    prefix: &'a str,
    patterns: &'a [String],
    mode: MatchMode,
) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteEntry>>> + Send + 'a>> {
    Box::pin(async move {
        if !prefix.is_empty() && sync_path::matches(prefix, patterns, mode) {
            tracing::info!(path = prefix, "skipping excluded remote folder");
            return Ok(Vec::new());
        }

        let label = if prefix.is_empty() { "root" } else { prefix };
        tracing::info!(path = label, "scanning remote folder");
        let items = store.list_all(&ListQuery::children(folder_id)).await?;
        let mut entries = Vec::new();

        for item in items {
            let relative_path = sync_path::join(prefix, &item.name);
            if sync_path::matches(&relative_path, patterns, mode) {
                tracing::debug!(path = %relative_path, "excluded (remote)");
                continue;
            }

            if item.is_folder() {
                let sub = walk_remote(store, &item.id, &relative_path, patterns, mode).await?;
                entries.extend(sub);
            } else {
                entries.push(RemoteEntry {
                    relative_path,
                    id: item.id,
                    size: item.size,
                });
            }
        }

        tracing::debug!(path = label, count = entries.len(), "remote folder scanned");
        Ok(entries)
    })
}

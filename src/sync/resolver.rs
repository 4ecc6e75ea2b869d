use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::remote::{ListQuery, RemoteStore};

/// Make sure `folder_path` exists under `parent_id`, creating missing
/// segments, and return the id of the deepest folder.
///
/// An empty path is the parent itself.
pub async fn ensure_path<S: RemoteStore + ?Sized>(
    store: &S,
    folder_path: &str,
    parent_id: &str,
) -> Result<String> {
    let mut current = parent_id.to_string();
    for segment in segments(folder_path) {
        current = find_or_create(store, &current, segment).await?;
    }
    Ok(current)
}

/// Like [`ensure_path`] but never creates; `None` if any segment is missing.
pub async fn find_path<S: RemoteStore + ?Sized>(
    store: &S,
    folder_path: &str,
    parent_id: &str,
) -> Result<Option<String>> {
    let mut current = parent_id.to_string();
    for segment in segments(folder_path) {
        match find_child_folder(store, &current, segment).await? {
            Some(id) => current = id,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn segments(folder_path: &str) -> impl Iterator<Item = &str> {
    folder_path.split('/').filter(|s| !s.is_empty())
}

/// First child folder of `parent_id` named `name`. Drive allows duplicate
/// names among siblings; the first match wins.
async fn find_child_folder<S: RemoteStore + ?Sized>(
    store: &S,
    parent_id: &str,
    name: &str,
) -> Result<Option<String>> {
    let page = store
        .list_page(&ListQuery::child_folder(parent_id, name), None)
        .await
        .with_context(|| format!("Failed to look up folder '{name}' in {parent_id}"))?;
    Ok(page.items.into_iter().next().map(|item| item.id))
}

async fn find_or_create<S: RemoteStore + ?Sized>(
    store: &S,
    parent_id: &str,
    name: &str,
) -> Result<String> {
    if let Some(id) = find_child_folder(store, parent_id, name).await? {
        return Ok(id);
    }

    tracing::debug!(name, parent = parent_id, "creating remote folder");
    store
        .create_folder(name, parent_id)
        .await
        .with_context(|| format!("Failed to create folder '{name}' in {parent_id}"))
}

/// Run-scoped memo of resolved folder paths.
///
/// Each `(root, path prefix)` is resolved at most once: concurrent callers
/// for the same prefix wait on the first resolution instead of each
/// creating their own copy of the folder. A failed resolution is not
/// cached, so a later caller tries again.
#[derive(Default)]
pub struct FolderCache {
    resolved: DashMap<(String, String), Arc<OnceCell<String>>>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        folder_path: &str,
        root_id: &str,
    ) -> Result<String> {
        let mut current = root_id.to_string();
        let mut prefix = String::new();

        for segment in segments(folder_path) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            let cell = self
                .resolved
                .entry((root_id.to_string(), prefix.clone()))
                .or_default()
                .clone();
            let parent = current.clone();
            current = cell
                .get_or_try_init(|| find_or_create(store, &parent, segment))
                .await?
                .clone();
        }

        Ok(current)
    }
}

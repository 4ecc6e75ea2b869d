//! In-memory remote store for sync tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::auth::{Credentials, TokenData};
use crate::drive_api::types::FOLDER_MIME_TYPE;
use crate::remote::{ItemPage, ListQuery, RemoteConnector, RemoteItem, RemoteStore};

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub parent: String,
    pub is_folder: bool,
}

#[derive(Default)]
struct State {
    nodes: Vec<Node>,
    next_id: usize,
    list_calls: usize,
    create_calls: usize,
    uploads: Vec<String>,
    fail_uploads: HashSet<String>,
    panic_uploads: HashSet<String>,
    fail_lists: HashSet<String>,
    page_size: Option<usize>,
    create_delay: Option<Duration>,
}

/// Cloning shares the same tree.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Add an existing folder, returning its id.
    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, true)
    }

    /// Add an existing file, returning its id.
    pub fn add_file(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, false)
    }

    fn insert(&self, parent: &str, name: &str, is_folder: bool) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        state.nodes.push(Node {
            id: id.clone(),
            name: name.to_string(),
            parent: parent.to_string(),
            is_folder,
        });
        id
    }

    pub fn fail_upload_of(&self, name: &str) {
        self.state().fail_uploads.insert(name.to_string());
    }

    pub fn panic_on_upload_of(&self, name: &str) {
        self.state().panic_uploads.insert(name.to_string());
    }

    pub fn fail_listing_of(&self, parent_id: &str) {
        self.state().fail_lists.insert(parent_id.to_string());
    }

    pub fn paginate(&self, page_size: usize) {
        self.state().page_size = Some(page_size);
    }

    /// Slow down folder creation so concurrent resolvers overlap.
    pub fn delay_creates(&self, delay: Duration) {
        self.state().create_delay = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    /// Names of uploaded files, in completion order.
    pub fn uploads(&self) -> Vec<String> {
        self.state().uploads.clone()
    }

    pub fn children(&self, parent: &str) -> Vec<Node> {
        self.state()
            .nodes
            .iter()
            .filter(|n| n.parent == parent)
            .cloned()
            .collect()
    }

    /// Folders named `name` directly under `parent`.
    pub fn folders_named(&self, parent: &str, name: &str) -> Vec<Node> {
        self.children(parent)
            .into_iter()
            .filter(|n| n.is_folder && n.name == name)
            .collect()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_page(&self, query: &ListQuery, page_token: Option<&str>) -> Result<ItemPage> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.list_calls += 1;
        if state.fail_lists.contains(&query.parent_id) {
            anyhow::bail!("listing {} refused", query.parent_id);
        }

        let matching: Vec<RemoteItem> = state
            .nodes
            .iter()
            .filter(|n| n.parent == query.parent_id)
            .filter(|n| query.name.as_ref().is_none_or(|name| &n.name == name))
            .filter(|n| {
                query
                    .mime_type
                    .as_ref()
                    .is_none_or(|m| (m == FOLDER_MIME_TYPE) == n.is_folder)
            })
            .map(|n| RemoteItem {
                id: n.id.clone(),
                name: n.name.clone(),
                mime_type: if n.is_folder {
                    FOLDER_MIME_TYPE.to_string()
                } else {
                    "application/octet-stream".to_string()
                },
                size: None,
            })
            .collect();

        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let size = state.page_size.unwrap_or(usize::MAX);
        let end = start.saturating_add(size).min(matching.len());
        Ok(ItemPage {
            items: matching[start..end].to_vec(),
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let delay = {
            let mut state = self.state();
            state.create_calls += 1;
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.add_folder(parent_id, name))
    }

    async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String> {
        tokio::task::yield_now().await;
        {
            let state = self.state();
            if state.panic_uploads.contains(name) {
                drop(state);
                panic!("simulated worker crash on {name}");
            }
            if state.fail_uploads.contains(name) {
                anyhow::bail!("simulated upload failure for {name}");
            }
        }
        // The real client reads the file; make sure it is there.
        tokio::fs::metadata(local_path).await?;
        let id = self.add_file(parent_id, name);
        self.state().uploads.push(name.to_string());
        Ok(id)
    }
}

/// Hands every worker a handle onto the same fake tree.
pub struct FakeConnector {
    pub store: FakeStore,
}

impl RemoteConnector for FakeConnector {
    type Store = FakeStore;

    fn connect(&self, _credentials: Credentials) -> Result<FakeStore> {
        Ok(self.store.clone())
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "cid".into(),
        client_secret: "cs".into(),
        tokens: TokenData {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        },
    }
}

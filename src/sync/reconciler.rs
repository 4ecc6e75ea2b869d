use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::remote::{ListQuery, RemoteStore};
use crate::util::path as sync_path;

use super::scanner::LocalFile;

/// Local files split by whether the remote folder already has them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub to_sync: Vec<LocalFile>,
    pub to_skip: Vec<LocalFile>,
}

impl Reconciliation {
    /// Nothing exists remotely yet: every file needs uploading.
    pub fn all_new(local_files: Vec<LocalFile>) -> Self {
        Self {
            to_sync: local_files,
            to_skip: Vec::new(),
        }
    }
}

/// List the children of `target_folder_id` once and partition `local_files`
/// by whether a child of the same name exists.
///
/// Only the final component of each relative path is compared, by exact
/// string equality. Input order is kept within each partition.
pub async fn reconcile<S: RemoteStore + ?Sized>(
    store: &S,
    local_files: Vec<LocalFile>,
    target_folder_id: &str,
) -> Result<Reconciliation> {
    let children = store
        .list_all(&ListQuery::children(target_folder_id))
        .await
        .with_context(|| format!("Failed to list remote folder {target_folder_id}"))?;
    let existing: HashSet<String> = children.into_iter().map(|item| item.name).collect();
    tracing::debug!(
        folder = target_folder_id,
        remote = existing.len(),
        local = local_files.len(),
        "reconciling"
    );

    Ok(partition(local_files, &existing))
}

pub fn partition(local_files: Vec<LocalFile>, existing: &HashSet<String>) -> Reconciliation {
    let (to_skip, to_sync): (Vec<_>, Vec<_>) = local_files
        .into_iter()
        .partition(|file| existing.contains(sync_path::file_name(&file.relative_path)));
    Reconciliation { to_sync, to_skip }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeStore;
    use std::path::PathBuf;

    fn local(relative: &str) -> LocalFile {
        LocalFile {
            name: sync_path::file_name(relative).to_string(),
            relative_path: relative.to_string(),
            full_path: PathBuf::from("/src").join(relative),
            size: 1,
        }
    }

    fn names(files: &[LocalFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[tokio::test]
    async fn existing_names_are_skipped() {
        let store = FakeStore::new();
        store.add_file("target", "x.txt");

        let result = reconcile(&store, vec![local("x.txt"), local("y.txt")], "target")
            .await
            .unwrap();
        assert_eq!(names(&result.to_skip), ["x.txt"]);
        assert_eq!(names(&result.to_sync), ["y.txt"]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn only_base_name_is_compared() {
        let store = FakeStore::new();
        store.add_file("target", "a.txt");

        let result = reconcile(&store, vec![local("subdir/a.txt"), local("subdir/b.txt")], "target")
            .await
            .unwrap();
        assert_eq!(names(&result.to_skip), ["subdir/a.txt"]);
        assert_eq!(names(&result.to_sync), ["subdir/b.txt"]);
    }

    #[tokio::test]
    async fn comparison_is_exact() {
        let store = FakeStore::new();
        store.add_file("target", "Report.PDF");
        store.add_folder("target", "photos");

        let result = reconcile(&store, vec![local("report.pdf"), local("photos")], "target")
            .await
            .unwrap();
        assert_eq!(names(&result.to_sync), ["report.pdf"]);
        // A folder of the same name also counts as present.
        assert_eq!(names(&result.to_skip), ["photos"]);
    }

    #[tokio::test]
    async fn paginated_listing_is_read_to_the_end() {
        let store = FakeStore::new();
        store.paginate(2);
        for name in ["1", "2", "3", "4", "5"] {
            store.add_file("target", name);
        }

        let result = reconcile(&store, vec![local("5"), local("6")], "target")
            .await
            .unwrap();
        assert_eq!(names(&result.to_skip), ["5"]);
        assert_eq!(names(&result.to_sync), ["6"]);
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn listing_failure_propagates() {
        let store = FakeStore::new();
        store.fail_listing_of("target");
        let err = reconcile(&store, vec![local("a")], "target").await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to list remote folder target"));
    }

    #[test]
    fn partitions_are_exhaustive_and_disjoint() {
        let files: Vec<LocalFile> = ["a", "b", "c", "d/a", "e/f", "g"]
            .iter()
            .map(|p| local(p))
            .collect();
        let remote_sets: [&[&str]; 4] = [&[], &["a"], &["a", "f", "zzz"], &["a", "b", "c", "f", "g"]];

        for remote in remote_sets {
            let existing: HashSet<String> = remote.iter().map(|s| s.to_string()).collect();
            let result = partition(files.clone(), &existing);

            assert_eq!(result.to_sync.len() + result.to_skip.len(), files.len());
            for file in &files {
                let in_sync = result.to_sync.contains(file);
                let in_skip = result.to_skip.contains(file);
                assert!(in_sync ^ in_skip, "{} in both or neither", file.relative_path);
            }
        }
    }

    #[test]
    fn all_new_syncs_everything() {
        let result = Reconciliation::all_new(vec![local("a"), local("b")]);
        assert_eq!(names(&result.to_sync), ["a", "b"]);
        assert!(result.to_skip.is_empty());
    }
}

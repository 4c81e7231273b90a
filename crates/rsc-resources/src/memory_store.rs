//! In-memory file store
//!
//! Branch-aware, with monotonically increasing ctimes and a broadcast
//! change feed. Backs the tool executor and serves as the test store.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rsc_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::store::{
    select_metadata, ChangeFeed, FileChange, FileEntry, FileStore, ListRequest, PutOutcome,
    PutRequest, StoredFile, WatchRequest, DEFAULT_BRANCH, EXPECT_ABSENT,
};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct BranchChange {
    branch: String,
    change: FileChange,
}

#[derive(Default)]
struct Inner {
    branches: HashMap<String, BTreeMap<String, StoredFile>>,
    last_ctime: i64,
}

impl Inner {
    /// Wall-clock micros, forced strictly increasing
    fn next_ctime(&mut self) -> i64 {
        let now = Utc::now().timestamp_micros();
        self.last_ctime = now.max(self.last_ctime + 1);
        self.last_ctime
    }
}

/// Versioned file store held in memory
pub struct MemoryFileStore {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<BranchChange>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
        }
    }

    fn branch_name(branch: Option<&str>) -> String {
        branch.unwrap_or(DEFAULT_BRANCH).to_string()
    }

    fn publish(&self, branch: String, change: FileChange) {
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(BranchChange { branch, change });
    }
}

impl Default for MemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn list(&self, request: ListRequest) -> Result<BTreeMap<String, FileEntry>> {
        let inner = self.inner.read().await;
        let branch = Self::branch_name(request.branch.as_deref());
        let prefix = request.prefix.unwrap_or_default();

        let Some(files) = inner.branches.get(&branch) else {
            return Ok(BTreeMap::new());
        };

        Ok(files
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, file)| {
                (
                    path.clone(),
                    FileEntry {
                        metadata: select_metadata(&file.metadata, request.select.as_deref()),
                        ctime: file.ctime,
                        mtime: file.mtime,
                        content: request.include_content.then(|| file.content.clone()),
                    },
                )
            })
            .collect())
    }

    async fn read(&self, branch: Option<&str>, path: &str) -> Result<Option<StoredFile>> {
        let inner = self.inner.read().await;
        Ok(inner
            .branches
            .get(&Self::branch_name(branch))
            .and_then(|files| files.get(path))
            .cloned())
    }

    async fn put(&self, request: PutRequest) -> Result<PutOutcome> {
        if request.path.is_empty() {
            return Err(Error::user_input("File path must not be empty"));
        }
        let branch = Self::branch_name(request.branch.as_deref());

        let mut inner = self.inner.write().await;
        let current = inner
            .branches
            .get(&branch)
            .and_then(|files| files.get(&request.path))
            .map(|f| f.ctime);

        let conflict = match (request.expected_ctime, current) {
            (None, _) => false,
            (Some(EXPECT_ABSENT), existing) => existing.is_some(),
            (Some(expected), Some(actual)) => expected != actual,
            (Some(_), None) => true,
        };
        if conflict {
            debug!(path = %request.path, expected = ?request.expected_ctime, actual = ?current, "Rejected stale write");
            return Ok(PutOutcome {
                conflict: true,
                ctime: None,
            });
        }

        let ctime = inner.next_ctime();
        let file = StoredFile {
            path: request.path.clone(),
            content: request.content,
            metadata: request.metadata.clone(),
            ctime,
            mtime: Utc::now().timestamp_millis(),
        };
        inner
            .branches
            .entry(branch.clone())
            .or_default()
            .insert(request.path.clone(), file);
        drop(inner);

        self.publish(
            branch,
            FileChange {
                path: request.path,
                metadata: request.metadata,
                ctime,
            },
        );
        Ok(PutOutcome {
            conflict: false,
            ctime: Some(ctime),
        })
    }

    async fn delete(&self, branch: Option<&str>, path: &str) -> Result<bool> {
        let branch = Self::branch_name(branch);
        let mut inner = self.inner.write().await;
        let removed = inner
            .branches
            .get_mut(&branch)
            .and_then(|files| files.remove(path))
            .is_some();
        if !removed {
            return Ok(false);
        }
        let ctime = inner.next_ctime();
        drop(inner);

        self.publish(
            branch,
            FileChange {
                path: path.to_string(),
                metadata: Default::default(),
                ctime,
            },
        );
        Ok(true)
    }

    async fn watch(&self, request: WatchRequest) -> Result<ChangeFeed> {
        let branch = Self::branch_name(request.branch.as_deref());
        let filter = request.path_filter.clone();

        // Subscribe before the snapshot so nothing falls between the two.
        let live = BroadcastStream::new(self.changes.subscribe());

        let replay: Vec<FileChange> = match request.from_ctime {
            None => Vec::new(),
            Some(from) => {
                let inner = self.inner.read().await;
                let mut changed: Vec<FileChange> = inner
                    .branches
                    .get(&branch)
                    .map(|files| {
                        files
                            .values()
                            .filter(|f| f.ctime > from && f.path.starts_with(&filter))
                            .map(|f| FileChange {
                                path: f.path.clone(),
                                metadata: f.metadata.clone(),
                                ctime: f.ctime,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                changed.sort_by_key(|c| c.ctime);
                changed
            }
        };
        let replayed_upto = replay
            .last()
            .map(|c| c.ctime)
            .unwrap_or(request.from_ctime.unwrap_or(i64::MIN));

        let live = live.filter_map(move |item| {
            let out = match item {
                Ok(BranchChange { branch: b, change })
                    if b == branch
                        && change.path.starts_with(&filter)
                        && change.ctime > replayed_upto =>
                {
                    Some(Ok(change))
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change watcher lagged, notices dropped");
                    None
                }
            };
            futures::future::ready(out)
        });

        Ok(stream::iter(replay.into_iter().map(Ok)).chain(live).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileMetadata;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_read_delete() {
        let store = MemoryFileStore::new();
        let out = store.put(PutRequest::new("/r/a.json", "{}")).await.unwrap();
        assert!(!out.conflict);
        let file = store.read(None, "/r/a.json").await.unwrap().unwrap();
        assert_eq!(Some(file.ctime), out.ctime);
        assert!(store.delete(None, "/r/a.json").await.unwrap());
        assert!(!store.delete(None, "/r/a.json").await.unwrap());
        assert!(store.read(None, "/r/a.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ctime_strictly_increases() {
        let store = MemoryFileStore::new();
        let a = store.put(PutRequest::new("/a", "1")).await.unwrap().ctime.unwrap();
        let b = store.put(PutRequest::new("/a", "2")).await.unwrap().ctime.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_expected_ctime_preconditions() {
        let store = MemoryFileStore::new();
        let created = store
            .put(PutRequest::new("/a", "1").expect_absent())
            .await
            .unwrap();
        assert!(!created.conflict);

        let again = store.put(PutRequest::new("/a", "x").expect_absent()).await.unwrap();
        assert!(again.conflict);

        let stale = store.put(PutRequest::new("/a", "x").expect_ctime(1)).await.unwrap();
        assert!(stale.conflict);

        let fresh = store
            .put(PutRequest::new("/a", "2").expect_ctime(created.ctime.unwrap()))
            .await
            .unwrap();
        assert!(!fresh.conflict);

        let missing = store.put(PutRequest::new("/b", "x").expect_ctime(5)).await.unwrap();
        assert!(missing.conflict);
    }

    #[tokio::test]
    async fn test_concurrent_puts_one_conflicts() {
        let store = Arc::new(MemoryFileStore::new());
        let base = store.put(PutRequest::new("/c", "0")).await.unwrap().ctime.unwrap();
        // Advance the file so `base` is stale for one writer.
        let current = store
            .put(PutRequest::new("/c", "1").expect_ctime(base))
            .await
            .unwrap()
            .ctime
            .unwrap();

        let s1 = Arc::clone(&store);
        let s2 = Arc::clone(&store);
        let (a, b) = tokio::join!(
            tokio::spawn(async move { s1.put(PutRequest::new("/c", "fresh").expect_ctime(current)).await }),
            tokio::spawn(async move { s2.put(PutRequest::new("/c", "stale").expect_ctime(base)).await }),
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert!(!a.conflict);
        assert!(b.conflict);
        assert_eq!(store.read(None, "/c").await.unwrap().unwrap().content, "fresh");
    }

    #[tokio::test]
    async fn test_list_prefix_select_and_branches() {
        let store = MemoryFileStore::new();
        let md = FileMetadata::from([
            ("name".to_string(), "A".to_string()),
            ("createdBy".to_string(), "u".to_string()),
        ]);
        store.put(PutRequest::new("/r/t/a.json", "{}").metadata(md)).await.unwrap();
        store.put(PutRequest::new("/r/u/b.json", "{}")).await.unwrap();
        store
            .put(PutRequest::new("/r/t/c.json", "{}").branch(Some("dev".into())))
            .await
            .unwrap();

        let listed = store
            .list(ListRequest {
                prefix: Some("/r/t/".into()),
                select: Some(vec!["name".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        let entry = &listed["/r/t/a.json"];
        assert_eq!(entry.metadata.len(), 1);
        assert!(entry.content.is_none());

        let dev = store
            .list(ListRequest {
                branch: Some("dev".into()),
                include_content: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(dev.len(), 1);
        assert_eq!(dev["/r/t/c.json"].content.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_watch_replays_then_follows() {
        let store = Arc::new(MemoryFileStore::new());
        store.put(PutRequest::new("/w/old.json", "{}")).await.unwrap();
        store.put(PutRequest::new("/other/x.json", "{}")).await.unwrap();

        let mut feed = store
            .watch(WatchRequest {
                path_filter: "/w/".into(),
                branch: None,
                from_ctime: Some(0),
            })
            .await
            .unwrap();

        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.path, "/w/old.json");

        store.put(PutRequest::new("/other/y.json", "{}")).await.unwrap();
        store.put(PutRequest::new("/w/new.json", "{}")).await.unwrap();

        let second = tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.path, "/w/new.json");
    }
}

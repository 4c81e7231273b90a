//! File-Backed Resource Store Adapter
//!
//! Maps resource ids to `{directory}/{id}.json` and moves `StoredRecord`s
//! in and out of a `FileStore`.

use rsc_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::path::ResourcePaths;
use crate::record::StoredRecord;
use crate::store::{FileEntry, FileStore, ListRequest, PutOutcome, PutRequest, WatchRequest, ChangeFeed};

/// A stored record with the ctime it was read at
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    pub record: StoredRecord,
    pub ctime: i64,
}

/// Typed access to one resource directory of a file store
#[derive(Clone)]
pub struct ResourceStoreAdapter {
    store: Arc<dyn FileStore>,
    paths: ResourcePaths,
    branch: Option<String>,
}

impl ResourceStoreAdapter {
    pub fn new(store: Arc<dyn FileStore>, paths: ResourcePaths) -> Self {
        Self {
            store,
            paths,
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn paths(&self) -> &ResourcePaths {
        &self.paths
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Every resource file in the directory, keyed by resource id
    pub async fn list(&self, include_content: bool) -> Result<BTreeMap<String, FileEntry>> {
        let listed = self
            .store
            .list(ListRequest {
                branch: self.branch.clone(),
                prefix: Some(self.paths.prefix()),
                select: None,
                include_content,
            })
            .await?;
        Ok(listed
            .into_iter()
            .filter_map(|(path, entry)| self.paths.extract(&path).map(|id| (id, entry)))
            .collect())
    }

    pub async fn read(&self, resource_id: &str) -> Result<Option<VersionedRecord>> {
        let path = self.paths.build(resource_id);
        let Some(file) = self.store.read(self.branch.as_deref(), &path).await? else {
            return Ok(None);
        };
        let record: StoredRecord = serde_json::from_str(&file.content).map_err(|e| {
            Error::storage(format!("Corrupt resource file {}: {}", path, e))
        })?;
        Ok(Some(VersionedRecord {
            record,
            ctime: file.ctime,
        }))
    }

    /// Write a record; `expected_ctime` guards against concurrent writers
    pub async fn write(
        &self,
        resource_id: &str,
        record: &StoredRecord,
        expected_ctime: Option<i64>,
    ) -> Result<PutOutcome> {
        let path = self.paths.build(resource_id);
        let mut request = PutRequest::new(path.clone(), serde_json::to_string(record)?)
            .branch(self.branch.clone())
            .metadata(record.metadata());
        request.expected_ctime = expected_ctime;

        let outcome = self.store.put(request).await?;
        debug!(path = %path, conflict = outcome.conflict, "Wrote resource file");
        Ok(outcome)
    }

    pub async fn delete(&self, resource_id: &str) -> Result<bool> {
        self.store
            .delete(self.branch.as_deref(), &self.paths.build(resource_id))
            .await
    }

    /// Change feed scoped to this directory
    pub async fn watch(&self, branch: Option<String>, from_ctime: Option<i64>) -> Result<ChangeFeed> {
        self.store
            .watch(WatchRequest {
                path_filter: self.paths.prefix(),
                branch: branch.or_else(|| self.branch.clone()),
                from_ctime,
            })
            .await
    }
}

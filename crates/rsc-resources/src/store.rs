//! File store primitives
//!
//! A versioned, path-addressed store. Every write stamps the file with a
//! fresh `ctime`; a `PUT` carrying a stale `expectedCtime` is rejected with
//! `conflict: true` instead of overwriting. This is the only optimistic
//! concurrency check in the system.

use async_trait::async_trait;
use base64::Engine;
use futures::stream::BoxStream;
use rsc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Branch used when a request names none
pub const DEFAULT_BRANCH: &str = "main";

/// `expectedCtime` value meaning "the file must not exist yet"
pub const EXPECT_ABSENT: i64 = 0;

/// String-keyed attributes stored next to file content
pub type FileMetadata = BTreeMap<String, String>;

/// A file with its content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub metadata: FileMetadata,
    pub ctime: i64,
    pub mtime: i64,
}

/// One `LIST_FILES` result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub metadata: FileMetadata,
    pub ctime: i64,
    pub mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Metadata keys to return; all when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub include_content: bool,
}

/// Output encodings of `READ_FILE`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFormat {
    #[default]
    Text,
    Json,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub path: String,
    #[serde(default)]
    pub format: ReadFormat,
}

/// `READ_FILE` output: the file with its content in the requested encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFile {
    pub path: String,
    pub content: Value,
    #[serde(default)]
    pub metadata: FileMetadata,
    pub ctime: i64,
    pub mtime: i64,
}

impl EncodedFile {
    pub fn encode(file: StoredFile, format: ReadFormat) -> Result<Self> {
        let content = match format {
            ReadFormat::Text => Value::String(file.content),
            ReadFormat::Json => serde_json::from_str(&file.content).map_err(|e| {
                Error::user_input(format!("File {} is not JSON: {}", file.path, e))
            })?,
            ReadFormat::Base64 => Value::String(
                base64::engine::general_purpose::STANDARD.encode(file.content.as_bytes()),
            ),
        };
        Ok(Self {
            path: file.path,
            content,
            metadata: file.metadata,
            ctime: file.ctime,
            mtime: file.mtime,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub metadata: FileMetadata,
    /// Required current ctime; `EXPECT_ABSENT` for create-only writes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_ctime: Option<i64>,
}

impl PutRequest {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            branch: None,
            path: path.into(),
            content: content.into(),
            metadata: FileMetadata::new(),
            expected_ctime: None,
        }
    }

    pub fn branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn metadata(mut self, metadata: FileMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn expect_ctime(mut self, ctime: i64) -> Self {
        self.expected_ctime = Some(ctime);
        self
    }

    pub fn expect_absent(self) -> Self {
        self.expect_ctime(EXPECT_ABSENT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PutOutcome {
    #[serde(default)]
    pub conflict: bool,
    /// ctime of the written file; absent on conflict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
}

/// Parameters of a change subscription
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    #[serde(default)]
    pub path_filter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Replay files changed after this ctime before following live changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ctime: Option<i64>,
}

/// One change notice: `data: {path, metadata}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default)]
    pub metadata: FileMetadata,
    #[serde(default)]
    pub ctime: i64,
}

/// Long-lived change subscription; dropping it closes the upstream
pub type ChangeFeed = BoxStream<'static, Result<FileChange>>;

/// The four store primitives plus change watch
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Prefix scan returning path -> entry
    async fn list(&self, request: ListRequest) -> Result<BTreeMap<String, FileEntry>>;

    /// File at `path`, or None
    async fn read(&self, branch: Option<&str>, path: &str) -> Result<Option<StoredFile>>;

    /// Write with optional ctime precondition
    async fn put(&self, request: PutRequest) -> Result<PutOutcome>;

    /// Remove a file; false when nothing was there
    async fn delete(&self, branch: Option<&str>, path: &str) -> Result<bool>;

    /// Subscribe to changes under a path prefix
    async fn watch(&self, request: WatchRequest) -> Result<ChangeFeed>;
}

/// Keep only the selected metadata keys
pub fn select_metadata(metadata: &FileMetadata, select: Option<&[String]>) -> FileMetadata {
    match select {
        None => metadata.clone(),
        Some(keys) => metadata
            .iter()
            .filter(|(k, _)| keys.iter().any(|s| s == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file() -> StoredFile {
        StoredFile {
            path: "/r/a.json".into(),
            content: r#"{"x":1}"#.into(),
            metadata: FileMetadata::from([("name".to_string(), "A".to_string())]),
            ctime: 10,
            mtime: 20,
        }
    }

    #[test]
    fn test_encodings() {
        let text = EncodedFile::encode(file(), ReadFormat::Text).unwrap();
        assert_eq!(text.content, json!(r#"{"x":1}"#));
        let parsed = EncodedFile::encode(file(), ReadFormat::Json).unwrap();
        assert_eq!(parsed.content, json!({"x": 1}));
        let b64 = EncodedFile::encode(file(), ReadFormat::Base64).unwrap();
        assert_eq!(b64.content, json!("eyJ4IjoxfQ=="));
    }

    #[test]
    fn test_json_encoding_of_non_json_fails() {
        let mut f = file();
        f.content = "plain".into();
        assert!(EncodedFile::encode(f, ReadFormat::Json).is_err());
    }

    #[test]
    fn test_put_request_wire_names() {
        let v = serde_json::to_value(PutRequest::new("/p.json", "{}").expect_absent()).unwrap();
        assert_eq!(v["expectedCtime"], 0);
        assert!(v.get("branch").is_none());
    }

    #[test]
    fn test_select_metadata() {
        let md = FileMetadata::from([
            ("name".to_string(), "n".to_string()),
            ("createdBy".to_string(), "c".to_string()),
        ]);
        let keys = vec!["name".to_string()];
        let picked = select_metadata(&md, Some(&keys));
        assert_eq!(picked.len(), 1);
        assert_eq!(select_metadata(&md, None).len(), 2);
    }
}

//! The file store exposed as tools
//!
//! `LIST_FILES`, `READ_FILE`, `PUT_FILE` and `DELETE_FILE` serve any
//! `FileStore` to remote callers; `RemoteFileStore` is their client.

use rsc_binder::{implement, typed_handler, BinderSet, Implementations, ToolBinder, ToolSet};
use rsc_core::{CallContext, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::store::{
    DeleteOutcome, DeleteRequest, EncodedFile, FileEntry, FileStore, ListRequest, ReadRequest,
    PutRequest,
};

pub const LIST_FILES: &str = "LIST_FILES";
pub const READ_FILE: &str = "READ_FILE";
pub const PUT_FILE: &str = "PUT_FILE";
pub const DELETE_FILE: &str = "DELETE_FILE";

/// LIST_FILES output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOutput {
    pub files: BTreeMap<String, FileEntry>,
}

pub fn file_store_bindings() -> Result<BinderSet> {
    let branch = json!({"type": "string"});
    BinderSet::new(vec![
        ToolBinder::new(LIST_FILES)
            .description("List files under a path prefix")
            .input(json!({
                "type": "object",
                "properties": {
                    "branch": branch,
                    "prefix": {"type": "string"},
                    "select": {"type": "array", "items": {"type": "string"}},
                    "includeContent": {"type": "boolean", "default": false}
                }
            }))
            .output(json!({"type": "object", "properties": {"files": {"type": "object"}}})),
        ToolBinder::new(READ_FILE)
            .description("Read one file")
            .input(json!({
                "type": "object",
                "properties": {
                    "branch": branch,
                    "path": {"type": "string"},
                    "format": {"type": "string", "enum": ["text", "json", "base64"], "default": "text"}
                },
                "required": ["path"]
            })),
        ToolBinder::new(PUT_FILE)
            .description("Write a file, optionally guarded by its expected ctime")
            .input(json!({
                "type": "object",
                "properties": {
                    "branch": branch,
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                    "metadata": {"type": "object", "additionalProperties": {"type": "string"}},
                    "expectedCtime": {"type": "integer"}
                },
                "required": ["path", "content"]
            }))
            .output(json!({
                "type": "object",
                "properties": {"conflict": {"type": "boolean"}, "ctime": {"type": "integer"}}
            })),
        ToolBinder::new(DELETE_FILE)
            .description("Delete a file")
            .input(json!({
                "type": "object",
                "properties": {"branch": branch, "path": {"type": "string"}},
                "required": ["path"]
            }))
            .output(json!({"type": "object", "properties": {"deleted": {"type": "boolean"}}})),
    ])
}

/// Tool set serving `store`
pub fn file_store_tools(store: Arc<dyn FileStore>) -> Result<ToolSet> {
    let s = Arc::clone(&store);
    let list = typed_handler(move |_ctx: CallContext, req: ListRequest| {
        let s = Arc::clone(&s);
        async move { Ok(ListOutput { files: s.list(req).await? }) }
    });

    let s = Arc::clone(&store);
    let read = typed_handler(move |_ctx: CallContext, req: ReadRequest| {
        let s = Arc::clone(&s);
        async move {
            let file = s
                .read(req.branch.as_deref(), &req.path)
                .await?
                .ok_or_else(|| Error::not_found(format!("File {}", req.path)))?;
            EncodedFile::encode(file, req.format)
        }
    });

    let s = Arc::clone(&store);
    let put = typed_handler(move |_ctx: CallContext, req: PutRequest| {
        let s = Arc::clone(&s);
        async move { s.put(req).await }
    });

    let s = Arc::clone(&store);
    let delete = typed_handler(move |_ctx: CallContext, req: DeleteRequest| {
        let s = Arc::clone(&s);
        async move {
            let deleted = s.delete(req.branch.as_deref(), &req.path).await?;
            Ok(DeleteOutcome { deleted })
        }
    });

    implement(
        &file_store_bindings()?,
        Implementations::new()
            .with(LIST_FILES, list)
            .with(READ_FILE, read)
            .with(PUT_FILE, put)
            .with(DELETE_FILE, delete),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryFileStore;

    #[tokio::test]
    async fn test_put_read_list_delete_as_tools() {
        let tools = file_store_tools(Arc::new(MemoryFileStore::new())).unwrap();
        let ctx = CallContext::new();

        let put = tools
            .call(ctx.clone(), PUT_FILE, json!({"path": "/a/x.json", "content": "{\"v\":1}", "expectedCtime": 0}))
            .await
            .unwrap();
        assert_eq!(put["conflict"], false);
        let ctime = put["ctime"].as_i64().unwrap();

        let again = tools
            .call(ctx.clone(), PUT_FILE, json!({"path": "/a/x.json", "content": "{}", "expectedCtime": 0}))
            .await
            .unwrap();
        assert_eq!(again["conflict"], true);

        let read = tools
            .call(ctx.clone(), READ_FILE, json!({"path": "/a/x.json", "format": "json"}))
            .await
            .unwrap();
        assert_eq!(read["content"]["v"], 1);
        assert_eq!(read["ctime"], ctime);

        let listed = tools
            .call(ctx.clone(), LIST_FILES, json!({"prefix": "/a/"}))
            .await
            .unwrap();
        assert!(listed["files"].get("/a/x.json").is_some());

        let deleted = tools
            .call(ctx.clone(), DELETE_FILE, json!({"path": "/a/x.json"}))
            .await
            .unwrap();
        assert_eq!(deleted["deleted"], true);

        let err = tools
            .call(ctx, READ_FILE, json!({"path": "/a/x.json"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

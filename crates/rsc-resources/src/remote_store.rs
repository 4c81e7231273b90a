//! `FileStore` backed by a remote tool executor
//!
//! The four primitives go through an `RpcStub` as `LIST_FILES`,
//! `READ_FILE`, `PUT_FILE` and `DELETE_FILE`; change watches open
//! `GET {base}/watch` and decode the event stream.

use async_trait::async_trait;
use futures::StreamExt;
use rsc_core::{CallContext, Error, Result, CORRELATION_HEADER};
use rsc_rpc::{RpcStub, StubConfig, TransportOptions};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::sse::decode_stream;
use crate::store::{
    ChangeFeed, DeleteOutcome, EncodedFile, FileChange, FileEntry, FileStore, ListRequest,
    PutOutcome, PutRequest, ReadFormat, ReadRequest, StoredFile, WatchRequest,
};
use crate::store_tools::{file_store_bindings, ListOutput, DELETE_FILE, LIST_FILES, PUT_FILE, READ_FILE};

pub struct RemoteFileStore {
    stub: RpcStub,
    transport: TransportOptions,
    watch_client: reqwest::Client,
    ctx: CallContext,
}

impl RemoteFileStore {
    pub fn new(transport: TransportOptions) -> Result<Self> {
        let stub = RpcStub::new(file_store_bindings()?, StubConfig::direct(transport.clone()))?;
        // No request timeout: watches are long-lived.
        let watch_client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::construction(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            stub,
            transport,
            watch_client,
            ctx: CallContext::new(),
        })
    }

    /// Context whose caller, token and headers accompany every call
    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Caller identity, token and correlation id for each primitive
    fn call_ctx(&self) -> CallContext {
        self.ctx.detached()
    }

    fn token(&self) -> Option<&str> {
        self.transport.token.as_deref().or(self.ctx.token.as_deref())
    }
}

#[async_trait]
impl FileStore for RemoteFileStore {
    async fn list(&self, request: ListRequest) -> Result<BTreeMap<String, FileEntry>> {
        let out: ListOutput = self
            .stub
            .invoke_typed(&self.call_ctx(), LIST_FILES, &request)
            .await?;
        Ok(out.files)
    }

    async fn read(&self, branch: Option<&str>, path: &str) -> Result<Option<StoredFile>> {
        let request = ReadRequest {
            branch: branch.map(str::to_string),
            path: path.to_string(),
            format: ReadFormat::Text,
        };
        let file: EncodedFile = match self
            .stub
            .invoke_typed(&self.call_ctx(), READ_FILE, &request)
            .await
        {
            Ok(file) => file,
            // A missing READ_FILE tool or a bare 404 is a broken store, not an absent file
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let content = file
            .content
            .as_str()
            .ok_or_else(|| Error::protocol(format!("READ_FILE returned non-text content for {}", path)))?
            .to_string();
        Ok(Some(StoredFile {
            path: file.path,
            content,
            metadata: file.metadata,
            ctime: file.ctime,
            mtime: file.mtime,
        }))
    }

    async fn put(&self, request: PutRequest) -> Result<PutOutcome> {
        self.stub
            .invoke_typed(&self.call_ctx(), PUT_FILE, &request)
            .await
    }

    async fn delete(&self, branch: Option<&str>, path: &str) -> Result<bool> {
        let out: DeleteOutcome = self
            .stub
            .invoke_typed(
                &self.call_ctx(),
                DELETE_FILE,
                &json!({"branch": branch, "path": path}),
            )
            .await?;
        Ok(out.deleted)
    }

    async fn watch(&self, request: WatchRequest) -> Result<ChangeFeed> {
        let ctx = self.call_ctx();
        let url = format!("{}/watch", self.transport.base_url);

        let mut query: Vec<(&str, String)> = vec![("pathFilter", request.path_filter.clone())];
        if let Some(branch) = &request.branch {
            query.push(("branch", branch.clone()));
        }
        if let Some(from) = request.from_ctime {
            query.push(("fromCtime", from.to_string()));
        }
        if let Some(token) = self.token() {
            query.push(("auth-token", token.to_string()));
        }

        let mut builder = self.watch_client.get(&url).query(&query);
        for (name, value) in &self.transport.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .header(CORRELATION_HEADER, ctx.correlation_id.as_str())
            .send()
            .await
            .map_err(|e| Error::Transport {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
                correlation_id: ctx.correlation_id.clone(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport {
                status: status.as_u16(),
                message: if body.is_empty() { status.to_string() } else { body },
                correlation_id: ctx.correlation_id,
            });
        }
        debug!(url = %url, filter = %request.path_filter, "Opened remote change feed");

        let feed = decode_stream(response.bytes_stream()).filter_map(|event| async move {
            match event {
                Ok(data) => match serde_json::from_str::<FileChange>(&data) {
                    Ok(change) => Some(Ok(change)),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed change notice");
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            }
        });
        Ok(feed.boxed())
    }
}

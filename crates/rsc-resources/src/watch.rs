//! Change-Watch Bridge
//!
//! A pump task drains one upstream change feed into a bounded queue. For
//! every path change it resolves the resource URI and re-runs READ through
//! a `ResourceReader`, so watch results have the same shape as direct
//! reads. Records that fail to read are logged and skipped.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use rsc_core::{CallContext, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::path::ResourcePaths;
use crate::record::ResourceRecord;
use crate::service::ResourceService;
use crate::sse::encode_frame;
use crate::store::ChangeFeed;
use crate::uri::ResourceUri;

pub const DEFAULT_WATCH_CAPACITY: usize = 256;

/// Where a bridge starts and how much it buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub from_ctime: Option<i64>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_WATCH_CAPACITY
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            branch: None,
            from_ctime: None,
            capacity: DEFAULT_WATCH_CAPACITY,
        }
    }
}

/// One resolved change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent<T> {
    pub path: String,
    pub resource_id: String,
    pub uri: ResourceUri,
    pub data: ResourceRecord<T>,
}

/// The READ operation a bridge re-invokes per change
#[async_trait]
pub trait ResourceReader<T>: Send + Sync {
    async fn read_resource(&self, ctx: &CallContext, uri: &str) -> Result<ResourceRecord<T>>;
}

#[async_trait]
impl<T> ResourceReader<T> for ResourceService<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read_resource(&self, ctx: &CallContext, uri: &str) -> Result<ResourceRecord<T>> {
        self.read(ctx, uri).await
    }
}

/// Scope of a bridge: which URIs its paths map to
#[derive(Debug, Clone)]
pub struct WatchScope {
    pub owner_id: String,
    pub resource_type: String,
    pub paths: ResourcePaths,
}

impl WatchScope {
    pub fn new(owner_id: impl Into<String>, resource_type: impl Into<String>, paths: ResourcePaths) -> Self {
        Self {
            owner_id: owner_id.into(),
            resource_type: resource_type.into(),
            paths,
        }
    }
}

pub struct WatchBridge<T> {
    rx: mpsc::Receiver<Result<ChangeEvent<T>>>,
    pump: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl<T> WatchBridge<T>
where
    T: Send + 'static,
{
    /// Start pumping `feed` through `reader`
    pub fn open(
        feed: ChangeFeed,
        scope: WatchScope,
        reader: Arc<dyn ResourceReader<T>>,
        ctx: CallContext,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pump = tokio::spawn(pump(feed, scope, reader, ctx, tx));
        Self {
            rx,
            pump,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Close the upstream subscription; later calls do nothing
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pump.abort();
            debug!("Watch bridge closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> WatchBridge<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Bridge over a local service's own store
    pub async fn for_service(
        service: Arc<ResourceService<T>>,
        config: WatchConfig,
        ctx: CallContext,
    ) -> Result<Self> {
        let feed = service
            .adapter()
            .watch(config.branch.clone(), config.from_ctime)
            .await?;
        let scope = WatchScope::new(
            service.owner_id(),
            service.resource_type(),
            service.adapter().paths().clone(),
        );
        Ok(Self::open(feed, scope, service, ctx, config.capacity))
    }

    /// Re-expose as `data: {json}\n\n` frames; upstream errors end the feed
    pub fn into_frames(self) -> BoxStream<'static, Result<String>> {
        self.map(|event| event.and_then(|e| encode_frame(&e))).boxed()
    }
}

impl<T> Stream for WatchBridge<T> {
    type Item = Result<ChangeEvent<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for WatchBridge<T> {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pump.abort();
        }
    }
}

async fn pump<T>(
    mut feed: ChangeFeed,
    scope: WatchScope,
    reader: Arc<dyn ResourceReader<T>>,
    ctx: CallContext,
    tx: mpsc::Sender<Result<ChangeEvent<T>>>,
) {
    while let Some(item) = feed.next().await {
        let change = match item {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, "Change feed failed");
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let Some(resource_id) = scope.paths.extract(&change.path) else {
            debug!(path = %change.path, "Ignoring change outside resource layout");
            continue;
        };
        let uri = ResourceUri::new(&scope.owner_id, &scope.resource_type, &resource_id);

        match reader.read_resource(&ctx, &uri.to_string()).await {
            Ok(data) => {
                let event = ChangeEvent {
                    path: change.path,
                    resource_id,
                    uri,
                    data,
                };
                // Awaiting queue space is the backpressure.
                if tx.send(Ok(event)).await.is_err() {
                    debug!("Watch consumer went away");
                    return;
                }
            }
            Err(e) => {
                warn!(uri = %uri, error = %e, "Skipping change that failed to read");
            }
        }
    }
    debug!("Change feed ended");
}

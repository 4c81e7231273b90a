//! Typed client for one resource type's CRUD tools

use async_trait::async_trait;
use rsc_core::{CallContext, Result};
use rsc_rpc::{RpcStub, StubConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::marker::PhantomData;

use crate::bindings::{create_resource_bindings, ResourceOp};
use crate::record::ResourceRecord;
use crate::search::{SearchInput, SearchOutput};
use crate::service::DeleteOutput;
use crate::watch::ResourceReader;

pub struct ResourceClient<T> {
    stub: RpcStub,
    resource_type: String,
    _contract: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            stub: self.stub.clone(),
            resource_type: self.resource_type.clone(),
            _contract: PhantomData,
        }
    }
}

impl<T> ResourceClient<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(resource_type: impl Into<String>, data_schema: Value, config: StubConfig) -> Result<Self> {
        let resource_type = resource_type.into();
        let binders = create_resource_bindings(&resource_type, data_schema)?;
        Ok(Self {
            stub: RpcStub::new(binders, config)?,
            resource_type,
            _contract: PhantomData,
        })
    }

    pub fn stub(&self) -> &RpcStub {
        &self.stub
    }

    fn tool(&self, op: ResourceOp) -> String {
        op.tool_name(&self.resource_type)
    }

    pub async fn search(&self, ctx: &CallContext, input: &SearchInput) -> Result<SearchOutput> {
        self.stub
            .invoke_typed(ctx, &self.tool(ResourceOp::Search), input)
            .await
    }

    pub async fn read(&self, ctx: &CallContext, uri: &str) -> Result<ResourceRecord<T>> {
        self.stub
            .invoke_typed(ctx, &self.tool(ResourceOp::Read), &json!({ "uri": uri }))
            .await
    }

    pub async fn create(&self, ctx: &CallContext, data: &T) -> Result<ResourceRecord<T>> {
        self.stub
            .invoke_typed(ctx, &self.tool(ResourceOp::Create), &json!({ "data": data }))
            .await
    }

    pub async fn update(&self, ctx: &CallContext, uri: &str, data: &T) -> Result<ResourceRecord<T>> {
        self.stub
            .invoke_typed(
                ctx,
                &self.tool(ResourceOp::Update),
                &json!({ "uri": uri, "data": data }),
            )
            .await
    }

    pub async fn delete(&self, ctx: &CallContext, uri: &str) -> Result<DeleteOutput> {
        self.stub
            .invoke_typed(ctx, &self.tool(ResourceOp::Delete), &json!({ "uri": uri }))
            .await
    }
}

#[async_trait]
impl<T> ResourceReader<T> for ResourceClient<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read_resource(&self, ctx: &CallContext, uri: &str) -> Result<ResourceRecord<T>> {
        self.read(ctx, uri).await
    }
}

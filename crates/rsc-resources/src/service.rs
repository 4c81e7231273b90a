//! Resource CRUD semantics over a `ResourceStoreAdapter`
//!
//! One `ResourceService<T>` per resource type. `T` is the data contract:
//! incoming payloads that do not deserialize into `T`, or that violate the
//! type's JSON schema, are rejected as `UserInput` before any write happens.

use rsc_core::{CallContext, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use jsonschema::draft202012;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapter::ResourceStoreAdapter;
use crate::record::{ResourceRecord, StoredRecord, META_NAME};
use crate::search::{run_search, SearchInput, SearchItem, SearchOutput};
use crate::slug::derive_id;
use crate::store::EXPECT_ABSENT;
use crate::uri::ResourceUri;

/// Semantic check run after the payload parsed into `T`
pub type Validator<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadInput {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInput {
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInput {
    pub uri: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteInput {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOutput {
    pub uri: ResourceUri,
    pub deleted: bool,
}

pub struct ResourceService<T> {
    resource_type: String,
    owner_id: String,
    adapter: ResourceStoreAdapter,
    validator: Option<Validator<T>>,
    schema: Option<Arc<jsonschema::Validator>>,
    _contract: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for ResourceService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("resource_type", &self.resource_type)
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

impl<T> ResourceService<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        resource_type: impl Into<String>,
        owner_id: impl Into<String>,
        adapter: ResourceStoreAdapter,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            owner_id: owner_id.into(),
            adapter,
            validator: None,
            schema: None,
            _contract: PhantomData,
        }
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Enforce a Draft 2020-12 schema on incoming data; compiled once here
    pub fn with_schema(mut self, schema: &Value) -> Result<Self> {
        let compiled = draft202012::new(schema).map_err(|e| {
            Error::construction(format!("Invalid {} schema: {}", self.resource_type, e))
        })?;
        self.schema = Some(Arc::new(compiled));
        Ok(self)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn adapter(&self) -> &ResourceStoreAdapter {
        &self.adapter
    }

    pub fn uri_for(&self, resource_id: &str) -> ResourceUri {
        ResourceUri::new(&self.owner_id, &self.resource_type, resource_id)
    }

    /// Parse a URI and check it addresses this service's owner and type
    pub fn parse_uri(&self, uri: &str) -> Result<ResourceUri> {
        let parsed = ResourceUri::parse(uri)?;
        if parsed.owner_id != self.owner_id || parsed.resource_type != self.resource_type {
            return Err(Error::user_input(format!(
                "URI {} does not belong to rsc://{}/{}",
                uri, self.owner_id, self.resource_type
            )));
        }
        Ok(parsed)
    }

    fn validate(&self, data: Value) -> Result<T> {
        if let Some(schema) = &self.schema {
            let violations: Vec<String> = schema.iter_errors(&data).map(|e| e.to_string()).collect();
            if !violations.is_empty() {
                return Err(Error::user_input(format!(
                    "Invalid {} data: {}",
                    self.resource_type,
                    violations.join("; ")
                )));
            }
        }
        let typed: T = serde_json::from_value(data).map_err(|e| {
            Error::user_input(format!("Invalid {} data: {}", self.resource_type, e))
        })?;
        if let Some(validator) = &self.validator {
            validator(&typed)?;
        }
        Ok(typed)
    }

    fn to_resource(&self, uri: ResourceUri, record: StoredRecord) -> Result<ResourceRecord<T>> {
        let data: T = serde_json::from_value(record.data.clone()).map_err(|e| {
            Error::storage(format!("Stored {} does not match its contract: {}", uri, e))
        })?;
        Ok(record.into_resource(uri, data))
    }

    pub async fn search(&self, _ctx: &CallContext, input: SearchInput) -> Result<SearchOutput> {
        input.validate()?;
        let listed = self.adapter.list(false).await?;
        let candidates = listed
            .into_iter()
            .map(|(id, entry)| {
                let path = self.adapter.paths().build(&id);
                SearchItem::from_metadata(self.uri_for(&id), path, &entry.metadata, entry.mtime)
            })
            .collect();
        run_search(&input, candidates)
    }

    pub async fn read(&self, _ctx: &CallContext, uri: &str) -> Result<ResourceRecord<T>> {
        let uri = self.parse_uri(uri)?;
        let versioned = self
            .adapter
            .read(&uri.resource_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Resource {}", uri)))?;
        self.to_resource(uri, versioned.record)
    }

    pub async fn create(&self, ctx: &CallContext, data: Value) -> Result<ResourceRecord<T>> {
        let typed = self.validate(data)?;
        let normalized = serde_json::to_value(&typed)?;
        let resource_id = derive_id(normalized.get(META_NAME).and_then(Value::as_str));
        let uri = self.uri_for(&resource_id);

        let record = StoredRecord::created(normalized, ctx.caller_or_anonymous());
        let outcome = self
            .adapter
            .write(&resource_id, &record, Some(EXPECT_ABSENT))
            .await?;
        if outcome.conflict {
            return Err(Error::conflict(self.adapter.paths().build(&resource_id)));
        }

        info!(uri = %uri, correlation_id = %ctx.correlation_id, "Created resource");
        Ok(record.into_resource(uri, typed))
    }

    pub async fn update(&self, ctx: &CallContext, uri: &str, data: Value) -> Result<ResourceRecord<T>> {
        let uri = self.parse_uri(uri)?;
        let existing = self
            .adapter
            .read(&uri.resource_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Resource {}", uri)))?;

        let typed = self.validate(data)?;
        let record = existing
            .record
            .updated(serde_json::to_value(&typed)?, ctx.caller_or_anonymous());
        let outcome = self
            .adapter
            .write(&uri.resource_id, &record, Some(existing.ctime))
            .await?;
        if outcome.conflict {
            return Err(Error::conflict(self.adapter.paths().build(&uri.resource_id)));
        }

        debug!(uri = %uri, correlation_id = %ctx.correlation_id, "Updated resource");
        Ok(record.into_resource(uri, typed))
    }

    pub async fn delete(&self, ctx: &CallContext, uri: &str) -> Result<DeleteOutput> {
        let uri = self.parse_uri(uri)?;
        if !self.adapter.delete(&uri.resource_id).await? {
            return Err(Error::not_found(format!("Resource {}", uri)));
        }
        info!(uri = %uri, correlation_id = %ctx.correlation_id, "Deleted resource");
        Ok(DeleteOutput { uri, deleted: true })
    }
}

//! Resource Binding Generator
//!
//! Five canonical CRUD binders per resource type, and the handlers that
//! implement them on top of a `ResourceService`.

use rsc_binder::{implement, typed_handler, BinderSet, Implementations, ToolBinder, ToolSet};
use rsc_core::{CallContext, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::search::{SearchInput, MAX_PAGE_SIZE};
use crate::service::{CreateInput, DeleteInput, ReadInput, ResourceService, UpdateInput};
use crate::uri::RESOURCE_URI_PATTERN;

/// The five operations generated for every resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    Search,
    Read,
    Create,
    Update,
    Delete,
}

impl ResourceOp {
    pub const ALL: [ResourceOp; 5] = [
        ResourceOp::Search,
        ResourceOp::Read,
        ResourceOp::Create,
        ResourceOp::Update,
        ResourceOp::Delete,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            ResourceOp::Search => "SEARCH",
            ResourceOp::Read => "READ",
            ResourceOp::Create => "CREATE",
            ResourceOp::Update => "UPDATE",
            ResourceOp::Delete => "DELETE",
        }
    }

    /// SEARCH and READ must be implemented; the writes may be left out
    pub fn is_optional(&self) -> bool {
        !matches!(self, ResourceOp::Search | ResourceOp::Read)
    }

    /// `{TYPE}_{OP}`, e.g. `TEMPLATE_READ`
    pub fn tool_name(&self, resource_type: &str) -> String {
        format!("{}_{}", tool_prefix(resource_type), self.suffix())
    }
}

/// Upper-cased resource type with every non-alphanumeric mapped to `_`
pub fn tool_prefix(resource_type: &str) -> String {
    resource_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn uri_schema() -> Value {
    json!({"type": "string", "pattern": RESOURCE_URI_PATTERN})
}

fn record_schema(data_schema: &Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "uri": uri_schema(),
            "data": data_schema,
            "created_at": {"type": "string", "format": "date-time"},
            "updated_at": {"type": "string", "format": "date-time"},
            "created_by": {"type": "string"},
            "updated_by": {"type": "string"}
        },
        "required": ["uri", "data"]
    })
}

fn binder(resource_type: &str, op: ResourceOp, data_schema: &Value) -> ToolBinder {
    let name = op.tool_name(resource_type);
    let binder = match op {
        ResourceOp::Search => ToolBinder::new(name)
            .description(format!("Search {} resources", resource_type))
            .input(json!({
                "type": "object",
                "properties": {
                    "term": {"type": "string"},
                    "page": {"type": "integer", "minimum": 1, "default": 1},
                    "pageSize": {"type": "integer", "minimum": 1, "maximum": MAX_PAGE_SIZE, "default": 20},
                    "filters": {"type": "object", "additionalProperties": {"type": "array", "items": {"type": "string"}}},
                    "sortBy": {"type": "string", "enum": ["id", "name", "description", "updatedAt"]},
                    "sortOrder": {"type": "string", "enum": ["asc", "desc"], "default": "asc"}
                }
            }))
            .output(json!({
                "type": "object",
                "properties": {
                    "items": {"type": "array"},
                    "totalCount": {"type": "integer"},
                    "page": {"type": "integer"},
                    "pageSize": {"type": "integer"},
                    "totalPages": {"type": "integer"},
                    "hasNextPage": {"type": "boolean"},
                    "hasPreviousPage": {"type": "boolean"}
                }
            })),
        ResourceOp::Read => ToolBinder::new(name)
            .description(format!("Read one {} resource by URI", resource_type))
            .input(json!({
                "type": "object",
                "properties": {"uri": uri_schema()},
                "required": ["uri"]
            }))
            .output(record_schema(data_schema)),
        ResourceOp::Create => ToolBinder::new(name)
            .description(format!("Create a {} resource", resource_type))
            .input(json!({
                "type": "object",
                "properties": {"data": data_schema},
                "required": ["data"]
            }))
            .output(record_schema(data_schema)),
        ResourceOp::Update => ToolBinder::new(name)
            .description(format!("Replace the data of a {} resource", resource_type))
            .input(json!({
                "type": "object",
                "properties": {"uri": uri_schema(), "data": data_schema},
                "required": ["uri", "data"]
            }))
            .output(record_schema(data_schema)),
        ResourceOp::Delete => ToolBinder::new(name)
            .description(format!("Delete a {} resource", resource_type))
            .input(json!({
                "type": "object",
                "properties": {"uri": uri_schema()},
                "required": ["uri"]
            }))
            .output(json!({
                "type": "object",
                "properties": {"uri": uri_schema(), "deleted": {"type": "boolean"}}
            })),
    };
    if op.is_optional() {
        binder.optional()
    } else {
        binder
    }
}

/// Binder set for one resource type; `data_schema` describes the payload
pub fn create_resource_bindings(resource_type: &str, data_schema: Value) -> Result<BinderSet> {
    BinderSet::new(
        ResourceOp::ALL
            .iter()
            .map(|op| binder(resource_type, *op, &data_schema))
            .collect(),
    )
}

/// Handlers for all five operations, backed by `service`
pub fn resource_implementations<T>(service: Arc<ResourceService<T>>) -> Implementations
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let resource_type = service.resource_type().to_string();
    let name = |op: ResourceOp| op.tool_name(&resource_type);

    let svc = Arc::clone(&service);
    let search = typed_handler(move |ctx: CallContext, input: SearchInput| {
        let svc = Arc::clone(&svc);
        async move { svc.search(&ctx, input).await }
    });

    let svc = Arc::clone(&service);
    let read = typed_handler(move |ctx: CallContext, input: ReadInput| {
        let svc = Arc::clone(&svc);
        async move { svc.read(&ctx, &input.uri).await }
    });

    let svc = Arc::clone(&service);
    let create = typed_handler(move |ctx: CallContext, input: CreateInput| {
        let svc = Arc::clone(&svc);
        async move { svc.create(&ctx, input.data).await }
    });

    let svc = Arc::clone(&service);
    let update = typed_handler(move |ctx: CallContext, input: UpdateInput| {
        let svc = Arc::clone(&svc);
        async move { svc.update(&ctx, &input.uri, input.data).await }
    });

    let svc = Arc::clone(&service);
    let delete = typed_handler(move |ctx: CallContext, input: DeleteInput| {
        let svc = Arc::clone(&svc);
        async move { svc.delete(&ctx, &input.uri).await }
    });

    Implementations::new()
        .with(name(ResourceOp::Search), search)
        .with(name(ResourceOp::Read), read)
        .with(name(ResourceOp::Create), create)
        .with(name(ResourceOp::Update), update)
        .with(name(ResourceOp::Delete), delete)
}

/// Bindings plus implementations, ready to serve
pub fn resource_tools<T>(service: Arc<ResourceService<T>>, data_schema: Value) -> Result<ToolSet>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let binders = create_resource_bindings(service.resource_type(), data_schema)?;
    implement(&binders, resource_implementations(service))
}

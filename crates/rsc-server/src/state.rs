//! Application State
//!
//! Everything a request handler needs, built once at startup.

use rsc_binder::ToolSet;
use rsc_core::config::context_environment;
use rsc_core::{CallContext, Error, Result};
use rsc_resources::{
    file_store_tools, resource_tools, FileStore, MemoryFileStore, ResourcePaths,
    ResourceService, ResourceStoreAdapter,
};
use rsc_rpc::ConnectionResolver;
use rsc_workflow::{workflow_tools, SqliteRunStore, WorkflowActorConfig, WorkflowActors, WorkflowRegistry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::workflows::register_declared;

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    /// Versioned file store behind the file primitives and every resource type
    pub store: Arc<dyn FileStore>,
    /// Mounted resource types
    pub resources: HashMap<String, Arc<ResourceService<Value>>>,
    /// Workflow definitions: the declared ones, plus any registered in code
    pub registry: Arc<WorkflowRegistry>,
    pub workflows: Arc<WorkflowActors>,
    /// Every tool served at `/tools/call/:name`
    pub tools: Arc<ToolSet>,
    pub resolver: ConnectionResolver,
    /// `RSC_*` variables handed to handlers through the call context
    pub environment: Arc<HashMap<String, String>>,
}

impl AppState {
    /// State over an in-memory file store
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let store: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: ServerConfig, store: Arc<dyn FileStore>) -> Result<Self> {
        let mut tools = file_store_tools(Arc::clone(&store))?;

        let mut resources = HashMap::new();
        for resource_type in &config.resource_types {
            let adapter = ResourceStoreAdapter::new(Arc::clone(&store), ResourcePaths::for_type(resource_type));
            let schema = config.resource_schema(resource_type);
            let service = Arc::new(
                ResourceService::<Value>::new(resource_type.as_str(), config.owner_id.as_str(), adapter)
                    .with_schema(&schema)?,
            );
            tools = tools.merge(resource_tools(Arc::clone(&service), schema)?)?;
            resources.insert(resource_type.clone(), service);
        }

        let registry = Arc::new(WorkflowRegistry::new());
        let run_store = Arc::new(SqliteRunStore::new(&config.database_url).await?);
        let workflows = Arc::new(WorkflowActors::new(
            registry.clone(),
            run_store,
            WorkflowActorConfig::default(),
        ));
        let tools = Arc::new(tools.merge(workflow_tools(Arc::clone(&workflows))?)?);
        register_declared(&registry, &config.workflows, &tools).await?;
        // Runs a previous process left active
        workflows.recover(&CallContext::new()).await?;

        let resolver = match &config.tenant_base_url {
            Some(base) => ConnectionResolver::new().with_tenant_base(base.as_str()),
            None => ConnectionResolver::new(),
        };

        info!(
            tools = tools.len(),
            resource_types = ?config.resource_types,
            owner = %config.owner_id,
            "Application state ready"
        );

        Ok(Self {
            config,
            store,
            resources,
            registry,
            workflows,
            tools,
            resolver,
            environment: Arc::new(context_environment()),
        })
    }

    pub fn resource(&self, resource_type: &str) -> Result<Arc<ResourceService<Value>>> {
        self.resources
            .get(resource_type)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Resource type {}", resource_type)))
    }

    /// True when `id` names this executor as a `local-name` connection
    pub fn is_local(&self, id: &str) -> bool {
        self.config.local_connections.iter().any(|name| name == id)
    }

    /// Whether `token` may call this executor
    pub fn accepts(&self, token: Option<&str>) -> bool {
        match &self.config.auth_token {
            None => true,
            Some(expected) => token == Some(expected.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{ToolStep, WorkflowDefinition};
    use serde_json::json;

    #[tokio::test]
    async fn test_tools_for_each_resource_type() {
        let config = ServerConfig {
            resource_types: vec!["template".into(), "note".into()],
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();

        for name in [
            "LIST_FILES",
            "PUT_FILE",
            "TEMPLATE_SEARCH",
            "TEMPLATE_DELETE",
            "NOTE_CREATE",
            "WORKFLOW_START",
            "WORKFLOW_STATUS",
        ] {
            assert!(state.tools.contains(name), "missing {}", name);
        }
        assert!(state.resource("template").is_ok());
        assert!(state.resource("invoice").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clashing_resource_types_fail() {
        let config = ServerConfig {
            resource_types: vec!["mail-merge".into(), "mail_merge".into()],
            ..Default::default()
        };
        assert!(AppState::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_token_check() {
        let open = AppState::new(ServerConfig::default()).await.unwrap();
        assert!(open.accepts(None));

        let config = ServerConfig {
            auth_token: Some("s3cret".into()),
            ..Default::default()
        };
        let locked = AppState::new(config).await.unwrap();
        assert!(locked.accepts(Some("s3cret")));
        assert!(!locked.accepts(Some("other")));
        assert!(!locked.accepts(None));
    }

    #[tokio::test]
    async fn test_non_object_data_rejected() {
        let config = ServerConfig {
            resource_types: vec!["note".into()],
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();
        let err = state
            .tools
            .call(CallContext::new(), "NOTE_CREATE", json!({"data": [1, 2]}))
            .await
            .unwrap_err();
        assert!(err.is_user_input());
    }

    #[tokio::test]
    async fn test_invalid_schema_fails_startup() {
        let config = ServerConfig {
            resource_types: vec!["note".into()],
            resource_schemas: HashMap::from([("note".to_string(), json!({"type": "nonsense"}))]),
            ..Default::default()
        };
        assert!(AppState::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_declared_workflows_are_registered() {
        let config = ServerConfig {
            workflows: vec![WorkflowDefinition {
                id: "touch".into(),
                steps: vec![ToolStep {
                    tool: "PUT_FILE".into(),
                    arguments: Some(json!({"path": "/wf/touched.txt", "content": "hi"})),
                }],
            }],
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();
        assert_eq!(state.registry.list().await, vec!["touch"]);
    }
}

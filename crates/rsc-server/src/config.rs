//! Server configuration
//!
//! A JSON or YAML file (chosen by extension) with serde defaults, then
//! command-line flags on top. Defaults not covered by a flag read their
//! `RSC_*` variable.

use anyhow::{Context, Result};
use clap::Parser;
use rsc_core::config::{get_config, get_config_bool, get_config_usize};
use rsc_resources::DEFAULT_WATCH_CAPACITY;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::workflows::WorkflowDefinition;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_owner_id() -> String {
    "local".to_string()
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_watch_capacity() -> usize {
    get_config_usize("RSC_WATCH_CAPACITY", DEFAULT_WATCH_CAPACITY)
}

fn default_local_connections() -> Vec<String> {
    split_list(&get_config("RSC_LOCAL_CONNECTIONS", "self"))
}

fn default_json_logs() -> bool {
    get_config_bool("RSC_JSON_LOGS", false)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Owner segment of every resource URI this server hands out
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
    /// Workflow run storage
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_watch_capacity")]
    pub watch_capacity: usize,
    /// Resource types to mount as `{TYPE}_*` tools
    #[serde(default)]
    pub resource_types: Vec<String>,
    /// JSON schema for a type's data; types not listed accept any object
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub resource_schemas: HashMap<String, Value>,
    /// Tool-call sequences registered as workflows at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<WorkflowDefinition>,
    /// `local-name` connection ids that route back into this server
    #[serde(default = "default_local_connections")]
    pub local_connections: Vec<String>,
    /// Tenants resolve to `{tenantBaseUrl}/{tenantId}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_base_url: Option<String>,
    /// When set, tool calls and watches must present this token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            owner_id: default_owner_id(),
            database_url: default_database_url(),
            watch_capacity: default_watch_capacity(),
            resource_types: Vec::new(),
            resource_schemas: HashMap::new(),
            workflows: Vec::new(),
            local_connections: default_local_connections(),
            tenant_base_url: None,
            auth_token: None,
            json_logs: default_json_logs(),
        }
    }
}

impl ServerConfig {
    /// Data schema enforced for `resource_type`
    pub fn resource_schema(&self, resource_type: &str) -> Value {
        self.resource_schemas
            .get(resource_type)
            .cloned()
            .unwrap_or_else(|| json!({"type": "object"}))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(raw).with_context(|| format!("Invalid YAML in {}", path.display()))
        } else {
            serde_json::from_str(raw).with_context(|| format!("Invalid JSON in {}", path.display()))
        }
    }
}

/// Command-line flags
#[derive(Debug, Default, Parser)]
#[command(name = "rsc-server", version, about = "Remote tool executor")]
pub struct Cli {
    /// JSON or YAML config file
    #[arg(short, long, env = "RSC_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "RSC_BIND_ADDR")]
    pub bind: Option<String>,

    #[arg(long, env = "RSC_OWNER_ID")]
    pub owner: Option<String>,

    #[arg(long, env = "RSC_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long)]
    pub watch_capacity: Option<usize>,

    /// Resource type to mount; repeatable
    #[arg(long = "resource")]
    pub resources: Vec<String>,

    #[arg(long, env = "RSC_TENANT_BASE_URL")]
    pub tenant_base_url: Option<String>,

    #[arg(long, env = "RSC_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// File config (or defaults) with flags applied
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(owner) = self.owner {
            config.owner_id = owner;
        }
        if let Some(url) = self.database_url {
            config.database_url = url;
        }
        if let Some(capacity) = self.watch_capacity {
            config.watch_capacity = capacity;
        }
        for resource in self.resources {
            if !config.resource_types.contains(&resource) {
                config.resource_types.push(resource);
            }
        }
        if self.tenant_base_url.is_some() {
            config.tenant_base_url = self.tenant_base_url;
        }
        if self.auth_token.is_some() {
            config.auth_token = self.auth_token;
        }
        config.json_logs |= self.json_logs;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = ServerConfig::parse(r#"{"ownerId": "acme"}"#, Path::new("c.json")).unwrap();
        assert_eq!(config.owner_id, "acme");
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.watch_capacity, 256);
        assert_eq!(config.local_connections, vec!["self"]);
    }

    #[test]
    fn test_yaml_by_extension() {
        let yaml = "ownerId: acme\nresourceTypes:\n  - template\n  - note\n";
        let config = ServerConfig::parse(yaml, Path::new("server.yaml")).unwrap();
        assert_eq!(config.resource_types, vec!["template", "note"]);
    }

    #[test]
    fn test_schemas_and_workflows_from_yaml() {
        let yaml = r#"
resourceTypes: [template]
resourceSchemas:
  template:
    type: object
    required: [name]
workflows:
  - id: archive
    steps:
      - tool: LIST_FILES
        arguments: {prefix: /notes/}
"#;
        let config = ServerConfig::parse(yaml, Path::new("server.yml")).unwrap();
        assert_eq!(config.resource_schema("template")["required"], json!(["name"]));
        assert_eq!(config.resource_schema("note"), json!({"type": "object"}));
        assert_eq!(config.workflows[0].id, "archive");
        assert_eq!(config.workflows[0].steps[0].tool, "LIST_FILES");
    }

    #[test]
    fn test_json_logs_default_from_environment() {
        std::env::set_var("RSC_JSON_LOGS", "yes");
        let from_env = ServerConfig::default().json_logs;
        std::env::remove_var("RSC_JSON_LOGS");
        assert!(from_env);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" self, billing ,,"), vec!["self", "billing"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"ownerId": "file", "resourceTypes": ["note"]}}"#).unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            owner: Some("flag".into()),
            resources: vec!["note".into(), "template".into()],
            json_logs: true,
            ..Default::default()
        };
        let config = cli.into_config().unwrap();
        assert_eq!(config.owner_id, "flag");
        assert_eq!(config.resource_types, vec!["note", "template"]);
        assert!(config.json_logs);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "rsc-server",
            "--bind",
            "127.0.0.1:9000",
            "--resource",
            "template",
            "--resource",
            "note",
        ])
        .unwrap();
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.resources.len(), 2);
    }
}

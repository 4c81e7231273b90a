//! Connection descriptors and the resolver
//!
//! A `Connection` only describes how to reach a remote tool executor; it
//! never owns remote state. Callers hand a `ConnectionSource` to the stub
//! and never branch on the variant themselves.

use futures::future::BoxFuture;
use rsc_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// How to reach a remote endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Connection {
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Websocket {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    Tenant {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    LocalName {
        id: String,
    },
}

impl Connection {
    pub fn http(url: impl Into<String>) -> Self {
        Connection::Http {
            url: url.into(),
            headers: HashMap::new(),
            token: None,
        }
    }

    pub fn local(id: impl Into<String>) -> Self {
        Connection::LocalName { id: id.into() }
    }

    pub fn tenant(id: impl Into<String>, token: Option<String>) -> Self {
        Connection::Tenant { id: id.into(), token }
    }

    /// Short variant name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Connection::Http { .. } => "http",
            Connection::Sse { .. } => "sse",
            Connection::Websocket { .. } => "websocket",
            Connection::Tenant { .. } => "tenant",
            Connection::LocalName { .. } => "local-name",
        }
    }
}

/// Which registry an implicit lookup goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Tenant,
    LocalName,
}

/// Concrete transport parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedConnection {
    /// HTTP and SSE endpoints
    Http {
        url: String,
        headers: HashMap<String, String>,
        token: Option<String>,
    },
    Websocket {
        url: String,
    },
    /// Resolved by the executor's own registry
    Lookup {
        kind: LookupKind,
        id: String,
        token: Option<String>,
    },
}

/// Resolves descriptors into transport parameters
#[derive(Debug, Clone, Default)]
pub struct ConnectionResolver {
    /// Tenants are reached at `{tenant_base_url}/{tenant id}` when set
    tenant_base_url: Option<String>,
}

impl ConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant_base(mut self, base_url: impl Into<String>) -> Self {
        self.tenant_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn resolve(&self, connection: &Connection) -> ResolvedConnection {
        let resolved = match connection {
            Connection::Http { url, headers, token } | Connection::Sse { url, token, headers } => {
                ResolvedConnection::Http {
                    url: url.clone(),
                    headers: headers.clone(),
                    token: token.clone(),
                }
            }
            Connection::Websocket { url, .. } => ResolvedConnection::Websocket { url: url.clone() },
            Connection::Tenant { id, token } => match &self.tenant_base_url {
                Some(base) => ResolvedConnection::Http {
                    url: format!("{}/{}", base, id),
                    headers: HashMap::new(),
                    token: token.clone(),
                },
                None => ResolvedConnection::Lookup {
                    kind: LookupKind::Tenant,
                    id: id.clone(),
                    token: token.clone(),
                },
            },
            Connection::LocalName { id } => ResolvedConnection::Lookup {
                kind: LookupKind::LocalName,
                id: id.clone(),
                token: None,
            },
        };
        debug!(kind = connection.kind(), "Resolved connection");
        resolved
    }
}

type ProviderFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Connection>> + Send + Sync>;

/// A connection value, or an async provider evaluated per call
#[derive(Clone)]
pub enum ConnectionSource {
    Static(Connection),
    Provider(ProviderFn),
}

impl ConnectionSource {
    /// Wrap an async provider, e.g. one that refreshes a token
    pub fn provider<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Connection>> + Send + 'static,
    {
        ConnectionSource::Provider(Arc::new(move || -> BoxFuture<'static, Result<Connection>> {
            Box::pin(f())
        }))
    }

    /// Current connection value
    pub async fn connection(&self) -> Result<Connection> {
        match self {
            ConnectionSource::Static(connection) => Ok(connection.clone()),
            ConnectionSource::Provider(provider) => provider().await,
        }
    }

    pub async fn resolve(&self, resolver: &ConnectionResolver) -> Result<ResolvedConnection> {
        Ok(resolver.resolve(&self.connection().await?))
    }
}

impl From<Connection> for ConnectionSource {
    fn from(connection: Connection) -> Self {
        ConnectionSource::Static(connection)
    }
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSource::Static(c) => f.debug_tuple("Static").field(c).finish(),
            ConnectionSource::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

//! Resource records and their on-disk form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::FileMetadata;
use crate::uri::ResourceUri;

/// Metadata keys denormalized for search
pub const META_NAME: &str = "name";
pub const META_DESCRIPTION: &str = "description";
pub const META_CREATED_BY: &str = "createdBy";
pub const META_UPDATED_BY: &str = "updatedBy";

/// A resource as returned by READ/CREATE/UPDATE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord<T> {
    pub uri: ResourceUri,
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

/// File content of a stored resource; the URI is implied by the path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl StoredRecord {
    /// A record for a freshly created resource
    pub fn created(data: Value, by: &str) -> Self {
        let now = Utc::now();
        Self {
            data,
            created_at: now,
            updated_at: now,
            created_by: by.to_string(),
            updated_by: by.to_string(),
        }
    }

    /// Replace the data, keeping creation audit fields
    pub fn updated(&self, data: Value, by: &str) -> Self {
        Self {
            data,
            created_at: self.created_at,
            updated_at: Utc::now(),
            created_by: self.created_by.clone(),
            updated_by: by.to_string(),
        }
    }

    /// Search fields stored as file metadata
    pub fn metadata(&self) -> FileMetadata {
        let mut metadata = FileMetadata::new();
        for key in [META_NAME, META_DESCRIPTION] {
            if let Some(value) = self.data.get(key).and_then(Value::as_str) {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
        metadata.insert(META_CREATED_BY.to_string(), self.created_by.clone());
        metadata.insert(META_UPDATED_BY.to_string(), self.updated_by.clone());
        metadata
    }

    pub fn into_resource<T>(self, uri: ResourceUri, data: T) -> ResourceRecord<T> {
        ResourceRecord {
            uri,
            data,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
        }
    }
}

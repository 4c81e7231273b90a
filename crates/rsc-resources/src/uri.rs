//! Resource URIs: `rsc://{ownerId}/{resourceType}/{resourceId}`

use lazy_static::lazy_static;
use regex::Regex;
use rsc_core::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Shape every resource URI must match
pub const RESOURCE_URI_PATTERN: &str = r"^rsc://[^/]+/[^/]+/.+$";

lazy_static! {
    static ref URI_RE: Regex = Regex::new(r"^rsc://([^/]+)/([^/]+)/(.+)$").expect("valid uri regex");
}

/// A parsed resource URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    pub owner_id: String,
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceUri {
    pub fn new(
        owner_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Parse and validate; mismatches are `UserInput` errors
    pub fn parse(uri: &str) -> Result<Self> {
        let caps = URI_RE.captures(uri).ok_or_else(|| {
            Error::user_input(format!(
                "Invalid resource URI '{}': expected rsc://{{ownerId}}/{{resourceType}}/{{resourceId}}",
                uri
            ))
        })?;
        Ok(Self::new(&caps[1], &caps[2], &caps[3]))
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rsc://{}/{}/{}",
            self.owner_id, self.resource_type, self.resource_id
        )
    }
}

impl FromStr for ResourceUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ResourceUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

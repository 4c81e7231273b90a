//! SEARCH semantics: matching, filters, sorting, pagination
//!
//! Search runs over file metadata only, never file bodies.

use rsc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::record::{META_CREATED_BY, META_DESCRIPTION, META_NAME, META_UPDATED_BY};
use crate::store::FileMetadata;
use crate::uri::ResourceUri;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Id,
    Name,
    Description,
    #[serde(alias = "mtime", alias = "updated_at")]
    UpdatedAt,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// SEARCH input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Metadata field -> allowed values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl Default for SearchInput {
    fn default() -> Self {
        Self {
            term: None,
            page: default_page(),
            page_size: default_page_size(),
            filters: None,
            sort_by: None,
            sort_order: SortOrder::Asc,
        }
    }
}

impl SearchInput {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            ..Default::default()
        }
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(Error::user_input("page must be >= 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::user_input(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

/// One search hit, built from file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    pub uri: ResourceUri,
    pub id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// Modification time, epoch millis
    pub updated_at: i64,
}

impl SearchItem {
    pub fn from_metadata(uri: ResourceUri, path: String, metadata: &FileMetadata, mtime: i64) -> Self {
        let get = |key: &str| metadata.get(key).cloned();
        Self {
            id: uri.resource_id.clone(),
            uri,
            path,
            name: get(META_NAME),
            description: get(META_DESCRIPTION),
            created_by: get(META_CREATED_BY),
            updated_by: get(META_UPDATED_BY),
            updated_at: mtime,
        }
    }

    fn field(&self, key: &str) -> Option<&str> {
        match key {
            "id" => Some(&self.id),
            "path" => Some(&self.path),
            META_NAME => self.name.as_deref(),
            META_DESCRIPTION => self.description.as_deref(),
            META_CREATED_BY => self.created_by.as_deref(),
            META_UPDATED_BY => self.updated_by.as_deref(),
            _ => None,
        }
    }

    /// Case-insensitive substring match over id, path and search metadata
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            Some(self.id.as_str()),
            Some(self.path.as_str()),
            self.name.as_deref(),
            self.description.as_deref(),
            self.created_by.as_deref(),
            self.updated_by.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|hay| hay.to_lowercase().contains(&needle))
    }

    /// Every filter key must hold one of its allowed values
    pub fn passes(&self, filters: &HashMap<String, Vec<String>>) -> bool {
        filters.iter().all(|(key, allowed)| {
            self.field(key)
                .is_some_and(|value| allowed.iter().any(|a| a == value))
        })
    }

    fn compare(&self, other: &Self, field: SortField) -> Ordering {
        match field {
            SortField::Id => self.id.cmp(&other.id),
            SortField::Name => self.name.cmp(&other.name),
            SortField::Description => self.description.cmp(&other.description),
            SortField::UpdatedAt => self.updated_at.cmp(&other.updated_at),
        }
    }
}

/// SEARCH output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub items: Vec<SearchItem>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// Pagination figures for a result of `total_count` items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

pub fn page_info(total_count: u64, page: u32, page_size: u32) -> PageInfo {
    let size = u64::from(page_size.max(1));
    PageInfo {
        total_pages: total_count.div_ceil(size),
        has_next_page: u64::from(page) * size < total_count,
        has_previous_page: page > 1,
    }
}

/// Filter, sort and paginate candidate items
pub fn run_search(input: &SearchInput, candidates: Vec<SearchItem>) -> Result<SearchOutput> {
    input.validate()?;

    let mut hits: Vec<SearchItem> = candidates
        .into_iter()
        .filter(|item| input.term.as_deref().map_or(true, |t| item.matches(t)))
        .filter(|item| input.filters.as_ref().map_or(true, |f| item.passes(f)))
        .collect();

    if let Some(field) = input.sort_by {
        // `sort_by` is stable in both directions.
        match input.sort_order {
            SortOrder::Asc => hits.sort_by(|a, b| a.compare(b, field)),
            SortOrder::Desc => hits.sort_by(|a, b| b.compare(a, field)),
        }
    }

    let total_count = hits.len() as u64;
    let info = page_info(total_count, input.page, input.page_size);
    let start = ((input.page - 1) as usize).saturating_mul(input.page_size as usize);
    let items = hits
        .into_iter()
        .skip(start)
        .take(input.page_size as usize)
        .collect();

    Ok(SearchOutput {
        items,
        total_count,
        page: input.page,
        page_size: input.page_size,
        total_pages: info.total_pages,
        has_next_page: info.has_next_page,
        has_previous_page: info.has_previous_page,
    })
}

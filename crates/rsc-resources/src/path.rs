//! Resource id <-> file path mapping
//!
//! `{directory}/{resourceId}.json`, default directory `/resources/{resourceType}`.

use lazy_static::lazy_static;
use regex::Regex;

pub const FILE_EXTENSION: &str = ".json";

lazy_static! {
    static ref PATH_RE: Regex = Regex::new(r"^(.*)/([^/]+)\.json$").expect("valid path regex");
}

/// Default storage directory of a resource type
pub fn default_directory(resource_type: &str) -> String {
    format!("/resources/{}", resource_type)
}

/// `{directory}/{resource_id}.json`
pub fn build_path(directory: &str, resource_id: &str) -> String {
    format!(
        "{}/{}{}",
        directory.trim_end_matches('/'),
        resource_id,
        FILE_EXTENSION
    )
}

/// Inverse of `build_path` for ids without `/`
pub fn extract_path(path: &str) -> Option<(String, String)> {
    let caps = PATH_RE.captures(path)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Path mapping bound to one directory; ids may contain `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    directory: String,
}

impl ResourcePaths {
    pub fn new(directory: impl Into<String>) -> Self {
        let directory = directory.into();
        Self {
            directory: directory.trim_end_matches('/').to_string(),
        }
    }

    pub fn for_type(resource_type: &str) -> Self {
        Self::new(default_directory(resource_type))
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Prefix scanned by list and watch
    pub fn prefix(&self) -> String {
        format!("{}/", self.directory)
    }

    pub fn build(&self, resource_id: &str) -> String {
        build_path(&self.directory, resource_id)
    }

    pub fn extract(&self, path: &str) -> Option<String> {
        let id = path
            .strip_prefix(&self.prefix())?
            .strip_suffix(FILE_EXTENSION)?;
        (!id.is_empty()).then(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_extract_roundtrip() {
        let cases = [
            ("/resources/template", "invoice-template"),
            ("/a/b/c", "x.y"),
            ("", "root-level"),
            ("/resources/t", "with space"),
        ];
        for (dir, id) in cases {
            let path = build_path(dir, id);
            assert_eq!(extract_path(&path), Some((dir.to_string(), id.to_string())));
        }
    }

    #[test]
    fn test_default_directory() {
        assert_eq!(
            build_path(&default_directory("template"), "a"),
            "/resources/template/a.json"
        );
    }

    #[test]
    fn test_bound_paths_allow_nested_ids() {
        let paths = ResourcePaths::new("/resources/doc/");
        let path = paths.build("2024/report");
        assert_eq!(path, "/resources/doc/2024/report.json");
        assert_eq!(paths.extract(&path).as_deref(), Some("2024/report"));
        assert_eq!(paths.extract("/resources/other/x.json"), None);
        assert_eq!(paths.extract("/resources/doc/x.txt"), None);
        assert_eq!(paths.extract("/resources/doc/.json"), None);
    }

    #[test]
    fn test_extract_rejects_foreign_paths() {
        assert_eq!(extract_path("no-slash.json"), None);
        assert_eq!(extract_path("/dir/file.txt"), None);
    }
}

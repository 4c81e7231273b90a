//! Resource id derivation

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Lower-case, ASCII alphanumerics separated by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Random lower-case id for resources without a usable name
pub fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Slug of `name` if it yields one, else a random id
pub fn derive_id(name: Option<&str>) -> String {
    name.map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(random_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Invoice Template"), "invoice-template");
        assert_eq!(slugify("  Hello,   World!! "), "hello-world");
        assert_eq!(slugify("already-slugged"), "already-slugged");
        assert_eq!(slugify("Ünïcode only"), "n-code-only");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_derive_id_falls_back_to_random() {
        assert_eq!(derive_id(Some("A b")), "a-b");
        let random = derive_id(Some("???"));
        assert_eq!(random.len(), 12);
        assert!(random.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
        assert_ne!(derive_id(None), derive_id(None));
    }
}

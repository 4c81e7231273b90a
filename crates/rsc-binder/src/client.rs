//! Binding client - structural contract checks

use crate::binder::BinderSet;

/// Checks whether a candidate endpoint satisfies a binder contract
#[derive(Debug, Clone)]
pub struct BindingClient {
    binders: BinderSet,
}

impl BindingClient {
    pub fn new(binders: BinderSet) -> Self {
        Self { binders }
    }

    pub fn binders(&self) -> &BinderSet {
        &self.binders
    }

    /// True iff every required binder name is present among the candidates
    pub fn implements<I, S>(&self, candidate_tools: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.missing(candidate_tools).is_empty()
    }

    /// Required binder names absent from the candidates
    pub fn missing<I, S>(&self, candidate_tools: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates: Vec<S> = candidate_tools.into_iter().collect();
        self.binders
            .required_names()
            .filter(|required| !candidates.iter().any(|c| c.as_ref() == *required))
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::ToolBinder;

    #[test]
    fn test_implements_ignores_optional() {
        let client = BindingClient::new(
            BinderSet::new(vec![
                ToolBinder::new("T_SEARCH"),
                ToolBinder::new("T_READ"),
                ToolBinder::new("T_DELETE").optional(),
            ])
            .unwrap(),
        );
        assert!(client.implements(["T_READ", "T_SEARCH", "OTHER"]));
        assert!(!client.implements(["T_READ", "T_DELETE"]));
        assert_eq!(client.missing(vec!["T_READ".to_string()]), vec!["T_SEARCH"]);
    }
}

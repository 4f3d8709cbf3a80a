use std::collections::BTreeSet;

pub const SCOPE_REPORT_SUBMIT: &str = "report:submit";
pub const SCOPE_FETCHER_READ: &str = "fetcher:read";

/// Scopes granted to newly issued keys.
pub const DEFAULT_KEY_SCOPES: &[&str] = &[SCOPE_REPORT_SUBMIT, SCOPE_FETCHER_READ];

/// Named capabilities granted to one key. Blank entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn from_granted<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            granted
                .into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Required scopes that are not granted, in the order they were asked for.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|r| !r.is_empty() && !self.0.contains(**r))
            .map(|r| r.to_string())
            .collect()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_duplicate_entries_collapse() {
        let s = ScopeSet::from_granted([" report:submit ", "", "report:submit"]);
        assert_eq!(s.to_vec(), vec!["report:submit".to_string()]);
    }

    #[test]
    fn missing_lists_absent_scopes_only() {
        let s = ScopeSet::from_granted([SCOPE_REPORT_SUBMIT]);
        assert!(s.missing(&[SCOPE_REPORT_SUBMIT, ""]).is_empty());
        assert_eq!(
            s.missing(&[SCOPE_FETCHER_READ, SCOPE_REPORT_SUBMIT]),
            vec![SCOPE_FETCHER_READ.to_string()]
        );
    }
}

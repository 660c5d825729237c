//! Label maps and label selectors
//!
//! Labels are the only persistent metadata the control plane owns, so every
//! provider object exposes them as a plain string map.

use std::collections::BTreeMap;
use std::fmt;

/// Key/value labels attached to a provider object
pub type Labels = BTreeMap<String, String>;

/// A single label-selector requirement understood by list calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSelector {
    /// `key=value`
    Equals(String, String),
    /// `key` (present with any value)
    Exists(String),
}

impl LabelSelector {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        LabelSelector::Equals(key.into(), value.into())
    }

    pub fn exists(key: impl Into<String>) -> Self {
        LabelSelector::Exists(key.into())
    }

    /// Evaluate the selector against a label map
    pub fn matches(&self, labels: &Labels) -> bool {
        match self {
            LabelSelector::Equals(key, value) => labels.get(key) == Some(value),
            LabelSelector::Exists(key) => labels.contains_key(key),
        }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelSelector::Equals(key, value) => write!(f, "{}={}", key, value),
            LabelSelector::Exists(key) => write!(f, "{}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equals_selector() {
        let selector = LabelSelector::equals("owner", "ttlfleet");
        assert!(selector.matches(&labels(&[("owner", "ttlfleet")])));
        assert!(!selector.matches(&labels(&[("owner", "someone-else")])));
        assert!(!selector.matches(&labels(&[])));
        assert_eq!(selector.to_string(), "owner=ttlfleet");
    }

    #[test]
    fn test_exists_selector() {
        let selector = LabelSelector::exists("owner");
        assert!(selector.matches(&labels(&[("owner", "")])));
        assert!(!selector.matches(&labels(&[("other", "x")])));
        assert_eq!(selector.to_string(), "owner");
    }
}

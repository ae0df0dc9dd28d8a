//! Equality-based label selectors
//!
//! Supports the `key=value`, `key==value`, `key!=value` and bare `key`
//! (existence) forms joined by commas, which is all the operator emits.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
}

/// Parsed label selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector string. Empty segments are ignored.
    pub fn parse(selector: &str) -> Self {
        let requirements = selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some((k, v)) = s.split_once("!=") {
                    Requirement::NotEquals(k.trim().to_string(), v.trim().to_string())
                } else if let Some((k, v)) = s.split_once("==").or_else(|| s.split_once('=')) {
                    Requirement::Equals(k.trim().to_string(), v.trim().to_string())
                } else {
                    Requirement::Exists(s.to_string())
                }
            })
            .collect();
        Self { requirements }
    }

    /// Build a selector string from `key=value` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
        pairs.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
    }

    /// Whether the given labels satisfy every requirement
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.requirements.iter().all(|req| {
            let get = |key: &str| labels.and_then(|l| l.get(key));
            match req {
                Requirement::Equals(k, v) => get(k) == Some(v),
                Requirement::NotEquals(k, v) => get(k) != Some(v),
                Requirement::Exists(k) => get(k).is_some(),
            }
        })
    }
}

//! Tag predicates

use crate::error::{CoreError, Result};
use crate::types::Tag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Patterns held before the cache is cleared
const REGEX_CACHE_CAPACITY: usize = 1024;

/// Compiled patterns keyed by source text
static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Predicate over the tag set of a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagFilter {
    /// Exact match: tag = value
    Equals { key: String, value: String },
    /// Not equal: tag != value (also true when the tag is absent)
    NotEquals { key: String, value: String },
    /// Regex match: tag =~ /pattern/
    Regex { key: String, pattern: String },
    /// Any of values: tag IN (v1, v2, ...)
    In { key: String, values: Vec<String> },
    /// Tag exists
    Exists { key: String },
}

impl TagFilter {
    /// `key = value`
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        TagFilter::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// `key =~ /pattern/`, rejecting patterns that do not compile
    pub fn regex(key: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        compiled(&pattern)?;
        Ok(TagFilter::Regex {
            key: key.into(),
            pattern,
        })
    }

    /// Fails if the filter is a regex whose pattern does not compile
    pub fn validate(&self) -> Result<()> {
        if let TagFilter::Regex { pattern, .. } = self {
            compiled(pattern)?;
        }
        Ok(())
    }

    /// Check if a set of tags matches this filter
    pub fn matches(&self, tags: &[Tag]) -> Result<bool> {
        Ok(match self {
            TagFilter::Equals { key, value } => {
                tags.iter().any(|t| &t.key == key && &t.value == value)
            }
            TagFilter::NotEquals { key, value } => {
                !tags.iter().any(|t| &t.key == key && &t.value == value)
            }
            TagFilter::Regex { key, pattern } => {
                let re = compiled(pattern)?;
                tags.iter().any(|t| &t.key == key && re.is_match(&t.value))
            }
            TagFilter::In { key, values } => {
                tags.iter().any(|t| &t.key == key && values.contains(&t.value))
            }
            TagFilter::Exists { key } => tags.iter().any(|t| &t.key == key),
        })
    }

    /// True when every filter matches (an empty list matches everything)
    pub fn matches_all(filters: &[TagFilter], tags: &[Tag]) -> Result<bool> {
        for filter in filters {
            if !filter.matches(tags)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFilter::Equals { key, value } => write!(f, "\"{}\" = '{}'", key, value),
            TagFilter::NotEquals { key, value } => write!(f, "\"{}\" != '{}'", key, value),
            TagFilter::Regex { key, pattern } => write!(f, "\"{}\" =~ /{}/", key, pattern),
            TagFilter::In { key, values } => {
                let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
                write!(f, "\"{}\" IN ({})", key, quoted.join(", "))
            }
            TagFilter::Exists { key } => write!(f, "\"{}\" != ''", key),
        }
    }
}

fn compiled(pattern: &str) -> Result<Regex> {
    if let Some(re) = REGEX_CACHE.read().get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| CoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let mut cache = REGEX_CACHE.write();
    if cache.len() >= REGEX_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<Tag> {
        vec![Tag::new("host", "server01"), Tag::new("region", "us-west")]
    }

    #[test]
    fn test_equals_and_not_equals() {
        assert!(TagFilter::equals("host", "server01").matches(&tags()).unwrap());
        assert!(!TagFilter::equals("host", "server02").matches(&tags()).unwrap());

        let ne = TagFilter::NotEquals {
            key: "host".to_string(),
            value: "server02".to_string(),
        };
        assert!(ne.matches(&tags()).unwrap());
        assert!(ne.matches(&[]).unwrap());
    }

    #[test]
    fn test_regex_filter() {
        let filter = TagFilter::regex("region", "^us-").unwrap();
        assert!(filter.matches(&tags()).unwrap());

        let filter = TagFilter::regex("region", "^eu-").unwrap();
        assert!(!filter.matches(&tags()).unwrap());

        assert!(matches!(
            TagFilter::regex("region", "("),
            Err(CoreError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_in_and_exists() {
        let filter = TagFilter::In {
            key: "host".to_string(),
            values: vec!["server01".to_string(), "server03".to_string()],
        };
        assert!(filter.matches(&tags()).unwrap());
        assert!(TagFilter::Exists { key: "region".to_string() }.matches(&tags()).unwrap());
        assert!(!TagFilter::Exists { key: "dc".to_string() }.matches(&tags()).unwrap());
    }

    #[test]
    fn test_matches_all() {
        assert!(TagFilter::matches_all(&[], &tags()).unwrap());
        let filters = vec![
            TagFilter::equals("host", "server01"),
            TagFilter::equals("region", "eu-west"),
        ];
        assert!(!TagFilter::matches_all(&filters, &tags()).unwrap());
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let filter = TagFilter::Regex {
            key: "host".to_string(),
            pattern: "[".to_string(),
        };
        assert!(matches!(filter.validate(), Err(CoreError::InvalidPattern { .. })));
        assert!(matches!(
            filter.matches(&tags()),
            Err(CoreError::InvalidPattern { .. })
        ));
        assert!(TagFilter::matches_all(&[TagFilter::equals("host", "server01"), filter], &tags())
            .is_err());
        assert!(TagFilter::equals("host", "x").validate().is_ok());
    }

    #[test]
    fn test_regex_cache_is_bounded() {
        for i in 0..REGEX_CACHE_CAPACITY + 10 {
            compiled(&format!("^bounded-{}$", i)).unwrap();
        }
        assert!(REGEX_CACHE.read().len() <= REGEX_CACHE_CAPACITY);
        assert!(TagFilter::regex("host", "^server")
            .unwrap()
            .matches(&tags())
            .unwrap());
    }
}

//! Cache name patterns and match scoring
//!
//! A pattern is either an exact name (`app.users`) or a prefix ending in the
//! wildcard marker (`app.*`). Longer literal prefixes score higher, so the most
//! specific registration wins without needing a trie.

use crate::error::{CacheError, Result};
use std::fmt;

/// Marker that turns a pattern into a prefix match
pub const WILDCARD: char = '*';

/// A registered cache name, possibly ending in [`WILDCARD`]
///
/// Two patterns are equal iff their text is equal (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheNamePattern {
    text: String,
    has_wildcard: bool,
}

impl CacheNamePattern {
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(CacheError::InvalidArgument(
                "cache name pattern must not be empty".to_string(),
            ));
        }

        let has_wildcard = text.ends_with(WILDCARD);
        Ok(Self { text, has_wildcard })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn has_wildcard(&self) -> bool {
        self.has_wildcard
    }

    /// The pattern text without a trailing wildcard
    pub fn literal_prefix(&self) -> &str {
        if self.has_wildcard {
            &self.text[..self.text.len() - WILDCARD.len_utf8()]
        } else {
            &self.text
        }
    }

    /// Match score of `name` against this pattern; 0 means no match,
    /// except for a bare wildcard which covers every name with score 0
    pub fn score(&self, name: &str) -> usize {
        let prefix = self.literal_prefix();

        let matched = if self.has_wildcard {
            name.starts_with(prefix)
        } else {
            name == prefix
        };

        if matched {
            prefix.len()
        } else {
            0
        }
    }

    /// Whether this pattern actually matches `name`
    pub fn covers(&self, name: &str) -> bool {
        self.literal_prefix().len() <= self.score(name)
    }
}

impl fmt::Display for CacheNamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

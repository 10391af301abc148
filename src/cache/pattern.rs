//! Key pattern matching for invalidation.
//!
//! # Design Decisions
//! - `*` matches any run of characters (including none); `?` and `[` in a
//!   key are literal
//! - A pattern without `*` matches exactly one key
//! - The literal text before the first `*` doubles as a scan prefix so the
//!   store only returns candidate keys

use glob::{Pattern, PatternError};

/// A compiled invalidation pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    prefix: String,
    glob: Option<Pattern>,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let Some((prefix, _)) = pattern.split_once('*') else {
            return Ok(Self {
                raw: pattern.to_string(),
                prefix: pattern.to_string(),
                glob: None,
            });
        };

        // Runs of '*' collapse to one; glob rejects '**' inside a segment.
        let escaped: Vec<String> = pattern
            .split('*')
            .enumerate()
            .filter(|(i, part)| *i == 0 || !part.is_empty())
            .map(|(_, part)| Pattern::escape(part))
            .collect();
        let mut compiled = escaped.join("*");
        if pattern.ends_with('*') {
            compiled.push('*');
        }

        Ok(Self {
            raw: pattern.to_string(),
            prefix: prefix.to_string(),
            glob: Some(Pattern::new(&compiled)?),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_exact(&self) -> bool {
        self.glob.is_none()
    }

    /// Literal prefix every matching key must start with.
    pub fn scan_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, key: &str) -> bool {
        match &self.glob {
            Some(glob) => glob.matches(key),
            None => key == self.raw,
        }
    }
}

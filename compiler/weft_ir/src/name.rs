//! Shared string identifier.
//!
//! Variable names are manipulated by the optimizer (unrolling appends
//! `@N` suffixes, fetches prepend prefixes), so names are reference-counted
//! strings rather than interned indices. Cloning is O(1).

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Identifier for a variable, function or struct field.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    /// Create a name from anything string-like.
    pub fn new(s: impl AsRef<str>) -> Self {
        Name(Arc::from(s.as_ref()))
    }

    /// Borrow the underlying string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a derived name by appending `suffix`.
    pub fn with_suffix(&self, suffix: impl fmt::Display) -> Self {
        Name::new(format!("{}{suffix}", self.0))
    }

    /// Build a derived name by prepending `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Name::new(format!("{prefix}{}", self.0))
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name(Arc::from(s))
    }
}

#[cfg(test)]
mod tests;

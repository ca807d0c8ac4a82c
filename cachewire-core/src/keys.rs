//! Cache key tuples.
//!
//! A cached computation is addressed by an ordered tuple of arguments. The
//! values are opaque to the invalidation machinery; they only need to be
//! hashable so local caches can index by them, and serializable so they can
//! cross the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single component of a cache key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => write!(f, "null"),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Text(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyPart::Null)
    }
}

/// Ordered key tuple identifying entries of one cache.
///
/// An empty tuple is the conventional "everything under this cache" marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKeys(Vec<KeyPart>);

impl CacheKeys {
    /// Build a key tuple from its parts.
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// The empty tuple, meaning "invalidate the whole cache".
    pub fn all() -> Self {
        Self(Vec::new())
    }

    /// Single-element tuple.
    pub fn single(part: impl Into<KeyPart>) -> Self {
        Self(vec![part.into()])
    }

    /// True when this tuple addresses every entry of the cache.
    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    /// Key parts in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of key parts.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Same as [`is_all`](Self::is_all).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for CacheKeys {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<KeyPart>> for CacheKeys {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for CacheKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

//! Document identities.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// The identity value of a document: text or an integer, depending on the type.
///
/// Identities compare by their rendered form, so `Number(7)` equals
/// `Text("7")`. That keeps an identity read back out of a path equal to the
/// one that produced the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Number(u64),
    Text(String),
}

impl Identity {
    /// `0` and the empty string mean "not assigned yet"
    pub fn is_unset(&self) -> bool {
        match self {
            Identity::Number(n) => *n == 0,
            Identity::Text(s) => s.is_empty(),
        }
    }

    /// true when every character may appear in a storage path segment
    pub fn is_valid(&self) -> bool {
        match self {
            Identity::Number(n) => *n != 0,
            Identity::Text(s) => !s.is_empty() && s.chars().all(is_identity_char),
        }
    }

    /// numeric view, parsing text identities when they hold digits only
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Identity::Number(n) => Some(*n),
            Identity::Text(s) => s.parse().ok(),
        }
    }

    /// Generate a new ULID-based identity.
    pub fn generate() -> Self {
        Identity::Text(ulid::Ulid::new().to_string().to_lowercase())
    }
}

pub(crate) fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Number(n) => write!(f, "{}", n),
            Identity::Text(s) => f.write_str(s),
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Identity::Number(a), Identity::Number(b)) => a == b,
            (Identity::Text(a), Identity::Text(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Text(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Text(value)
    }
}

impl From<&String> for Identity {
    fn from(value: &String) -> Self {
        Identity::Text(value.clone())
    }
}

impl From<u64> for Identity {
    fn from(value: u64) -> Self {
        Identity::Number(value)
    }
}

impl From<u32> for Identity {
    fn from(value: u32) -> Self {
        Identity::Number(u64::from(value))
    }
}

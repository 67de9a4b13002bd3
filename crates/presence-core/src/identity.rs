//! # Identity
//!
//! The opaque token for a resolved, enrolled entity. Resolution (matching a
//! face embedding against known encodings, tolerance scoring, "first match
//! wins") happens upstream; by the time an observation reaches the tracker
//! it is either an [`Identity`] or it was dropped.
//!
//! ## Validation
//!
//! - Surrounding whitespace is trimmed.
//! - Must be non-empty after trimming.
//! - Must not contain `\n` or `\r`: the attendance log and replay streams
//!   are framed one row per line. Any other character, `,` included, is
//!   carried through unchanged.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Line terminators, which would split a log row in two.
const FORBIDDEN: [char; 2] = ['\n', '\r'];

/// A resolved identity token. Compared by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

/// The set of identities observed during one tick.
///
/// A `BTreeSet` so that iteration, and therefore emission order within a
/// tick, is deterministic.
pub type ObservedSet = BTreeSet<Identity>;

impl Identity {
    /// Create a validated identity token.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyIdentity);
        }
        if let Some(forbidden) = trimmed.chars().find(|c| FORBIDDEN.contains(c)) {
            return Err(ValidationError::IdentityForbiddenChar {
                value: trimmed.to_string(),
                forbidden,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Access the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl std::str::FromStr for Identity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

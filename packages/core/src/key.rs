//! Identity types: owner keys name a user's job directory, worker ids
//! name the process that holds a claim.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Length of a hex-encoded 128-bit identifier.
pub const KEY_LEN: usize = 32;

/// Number of leading characters shown to users for support correlation.
pub const SHORT_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("owner key must be {KEY_LEN} lowercase hex characters, got {0:?}")]
    Malformed(String),

    #[error("failed to draw random bytes: {0}")]
    Entropy(getrandom::Error),
}

/// Opaque, unguessable identifier of one user's job directory.
///
/// Always 32 lowercase hex characters (128 random bits). The queue relies
/// on this format to tell pending markers apart from claim markers, so the
/// only way to build one is through [`OwnerKey::generate`] or
/// [`OwnerKey::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerKey(String);

impl OwnerKey {
    /// Mint a fresh key from the OS random source.
    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = [0u8; KEY_LEN / 2];
        getrandom::fill(&mut bytes).map_err(KeyError::Entropy)?;
        Ok(Self(hex128(u128::from_be_bytes(bytes))))
    }

    /// Parse a key, accepting exactly `^[0-9a-f]{32}$`.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        if is_key(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(KeyError::Malformed(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated fragment safe to show to the owner.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN]
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OwnerKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OwnerKey {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if is_key(&s) {
            Ok(Self(s))
        } else {
            Err(KeyError::Malformed(s))
        }
    }
}

impl From<OwnerKey> for String {
    fn from(key: OwnerKey) -> Self {
        key.0
    }
}

/// Whether `s` has the exact shape of an owner key.
pub fn is_key(s: &str) -> bool {
    s.len() == KEY_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Globally unique identity of one worker, used as the claim-marker suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a new unique worker ID.
    pub fn new() -> Self {
        Self(hex128(Ulid::new().0))
    }

    /// Parse the suffix of a claim marker. Worker ids share the owner key
    /// shape.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        if is_key(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(KeyError::Malformed(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex128(v: u128) -> String {
    format!("{v:032x}")
}

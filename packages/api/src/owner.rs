use spool_core::{KeyError, OwnerKey};

/// Reuse the key the caller presented when it is well formed, otherwise
/// mint a fresh one.
///
/// A malformed key is treated like a missing one: the caller gets a new
/// identity rather than an error.
pub fn resolve_owner_key(presented: Option<&str>) -> Result<OwnerKey, KeyError> {
    match presented.map(OwnerKey::parse) {
        Some(Ok(key)) => Ok(key),
        Some(Err(e)) => {
            tracing::debug!("Discarding presented owner key: {}", e);
            OwnerKey::generate()
        }
        None => OwnerKey::generate(),
    }
}

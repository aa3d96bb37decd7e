//! Write-authorization policy
//!
//! Reads are always permitted, subject to the visibility restriction
//! applied by the query layer. Writes are governed by a single
//! predicate: an entity that exposes an owner is writable only by that
//! owner; an entity that resolves to a project is writable only by the
//! project's owner; anything else is denied. Membership never grants
//! write access.

use crate::error::{Error, Result};

/// The identity, if any, that governs writes to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAuthority<'a> {
    /// Entity carries its own owner (projects)
    Owner(&'a str),
    /// Entity resolves to a project; writes require the project owner
    ProjectOwner(&'a str),
    /// No resolvable owner; all writes denied
    Unowned,
}

/// Returns whether `actor` may write to an entity with the given
/// authority.
pub fn can_write(actor: &str, authority: &WriteAuthority<'_>) -> bool {
    match authority {
        WriteAuthority::Owner(owner) => *owner == actor,
        WriteAuthority::ProjectOwner(owner) => *owner == actor,
        WriteAuthority::Unowned => false,
    }
}

/// Checks [`can_write`], returning [`Error::Forbidden`] on denial.
pub fn ensure_can_write(actor: &str, authority: &WriteAuthority<'_>) -> Result<()> {
    if can_write(actor, authority) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_can_write() {
        assert!(can_write("alice", &WriteAuthority::Owner("alice")));
        assert!(can_write("alice", &WriteAuthority::ProjectOwner("alice")));
    }

    #[test]
    fn non_owner_cannot_write() {
        assert!(!can_write("bob", &WriteAuthority::Owner("alice")));
        assert!(!can_write("bob", &WriteAuthority::ProjectOwner("alice")));
    }

    #[test]
    fn unowned_denies_everyone() {
        assert!(!can_write("alice", &WriteAuthority::Unowned));
        assert!(!can_write("", &WriteAuthority::Unowned));
    }

    #[test]
    fn ensure_maps_denial_to_forbidden() {
        assert!(ensure_can_write("alice", &WriteAuthority::Owner("alice")).is_ok());
        assert!(matches!(
            ensure_can_write("bob", &WriteAuthority::Owner("alice")),
            Err(Error::Forbidden)
        ));
    }
}

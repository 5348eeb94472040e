//! # Usernaut LDAP
//!
//! Resolver over the corporate directory: look up a user record by
//! username or by email. The directory is read-only from usernaut's
//! perspective - user creation there is out of scope by design.
//!
//! "No such object" responses and empty result sets are both normalized
//! to [`LdapError::NoUserFound`], which callers treat as a domain signal
//! (user inactive), not a failure.

pub mod client;
pub mod user;

pub use client::{LdapClient, LdapResolver, LdapSettings};
pub use user::LdapUser;

/// Error from the LDAP resolver.
#[derive(Debug, thiserror::Error)]
pub enum LdapError {
    /// The directory has no entry for the requested user.
    #[error("no LDAP entries found for user")]
    NoUserFound,

    #[error("LDAP connection failed: {0}")]
    Connection(String),

    #[error("LDAP bind failed: {0}")]
    Bind(String),

    #[error("LDAP search failed: {0}")]
    Search(#[from] ldap3::LdapError),
}

impl LdapError {
    /// Whether this error means "the user does not exist" rather than a
    /// transport or protocol failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, LdapError::NoUserFound)
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

//! Fivetran backend adapter.
//!
//! Talks to the Fivetran REST API (`/v1`). Responses arrive in a
//! `{code, data}` envelope; list endpoints paginate with an opaque
//! `next_cursor`. Users created by usernaut get the Account Reviewer
//! role - pipeline permissions are granted through team membership, not
//! account-level roles.

mod client;
mod teams;
mod users;

pub use client::FivetranConnector;

/// Role assigned to every user and team usernaut creates.
pub const ACCOUNT_REVIEWER_ROLE: &str = "Account Reviewer";

//! Rover backend adapter.
//!
//! Rover is the internal directory's group-management surface. Teams are
//! directory groups keyed by name - the group name doubles as the team
//! id. Membership add/remove is per-member.
//!
//! People are not created or deleted here: the corporate directory is
//! the system of record for accounts, so `create_user` echoes the input
//! identity (username as id) and `delete_user` is a no-op. The
//! offboarding job additionally skips this backend entirely by type.

mod client;

pub use client::RoverConnector;

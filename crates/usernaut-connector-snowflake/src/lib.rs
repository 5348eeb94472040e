//! Snowflake backend adapter.
//!
//! Talks to the Snowflake `/api/v2` REST surface. Teams map to account
//! roles; membership is a role grant. Identity is case-insensitive on
//! the Snowflake side, so names are lowercased before they enter the
//! store layer.
//!
//! Listings use cursor pagination (`showLimit` + `fromName`). Long
//! result sets matter here: an account can hold far more users than
//! startup preload should swallow, so besides the map-returning
//! [`usernaut_connector::UserOps::fetch_all_users`] the adapter exposes
//! [`SnowflakeConnector::fetch_remaining_users`], an async continuation
//! that resumes from a cursor and yields users over a channel. The
//! reconciliation hot path uses only the map variants.
//!
//! Endpoints that answer `202 Accepted` are polled via their `Location`
//! header with bounded attempts.

mod client;
mod teams;
mod users;

pub use client::SnowflakeConnector;
pub use users::UserStream;

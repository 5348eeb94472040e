//! Resolved LDAP user records.

use std::collections::HashMap;

/// Attribute record for one directory user.
///
/// Holds whatever attributes the search was configured to request;
/// accessors cover the ones the engine relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapUser {
    attributes: HashMap<String, String>,
}

impl LdapUser {
    #[must_use]
    pub fn new(attributes: HashMap<String, String>) -> Self {
        Self { attributes }
    }

    fn attr(&self, name: &str) -> &str {
        self.attributes.get(name).map_or("", String::as_str)
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        self.attr("uid")
    }

    #[must_use]
    pub fn email(&self) -> &str {
        self.attr("mail")
    }

    #[must_use]
    pub fn cn(&self) -> &str {
        self.attr("cn")
    }

    #[must_use]
    pub fn sn(&self) -> &str {
        self.attr("sn")
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.attr("displayName")
    }

    /// Whether the directory returned any attribute values at all. An
    /// entry that exists but carries no data is treated as inactive by
    /// the offboarding job.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.values().all(String::is_empty)
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }
}

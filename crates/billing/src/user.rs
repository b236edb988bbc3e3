//! User subset read and written by the billing core

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Whitelist,
    Trader,
    Creator,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Whitelist => "Whitelist",
            Role::Trader => "Trader",
            Role::Creator => "Creator",
            Role::Developer => "Developer",
        }
    }

    /// Case-insensitive parse of a stored role name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(Role::User),
            "whitelist" => Some(Role::Whitelist),
            "trader" => Some(Role::Trader),
            "creator" => Some(Role::Creator),
            "developer" => Some(Role::Developer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role set that always contains [`Role::User`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl Default for RoleSet {
    fn default() -> Self {
        RoleSet(BTreeSet::from([Role::User]))
    }
}

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set: BTreeSet<Role> = roles.into_iter().collect();
        set.insert(Role::User);
        RoleSet(set)
    }

    /// Build from stored strings, dropping names that are not known roles
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let roles = names.iter().filter_map(|n| {
            let parsed = Role::parse(n.as_ref());
            if parsed.is_none() {
                tracing::debug!(role = %n.as_ref(), "Ignoring unknown stored role");
            }
            parsed
        });
        RoleSet::new(roles)
    }

    pub fn to_names(&self) -> Vec<String> {
        self.0.iter().map(|r| r.as_str().to_string()).collect()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn insert(&mut self, role: Role) {
        self.0.insert(role);
    }

    /// Remove a role. `User` cannot be removed.
    pub fn remove(&mut self, role: Role) {
        if role != Role::User {
            self.0.remove(&role);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    /// Holds a paid role
    pub fn has_paid_role(&self) -> bool {
        self.contains(Role::Trader) || self.contains(Role::Creator)
    }

    pub fn is_developer(&self) -> bool {
        self.contains(Role::Developer)
    }

    /// Developers and creators may manage coupons
    pub fn can_manage_coupons(&self) -> bool {
        self.contains(Role::Developer) || self.contains(Role::Creator)
    }
}

/// Billing-relevant fields of a user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub roles: RoleSet,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
}

impl UserAccount {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            roles: RoleSet::default(),
            subscription_expires_at: None,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = RoleSet::new(roles);
        self
    }

    pub fn with_expiry(mut self, expires_at: Option<OffsetDateTime>) -> Self {
        self.subscription_expires_at = expires_at;
        self
    }
}

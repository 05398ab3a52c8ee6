//! Object access control policies.
//!
//! A policy is attached to an object as JSON under the
//! [`ACL_POLICY_METADATA_KEY`] metadata entry. The gateway reads it on every
//! download to pick the cache scope and to authorize private reads.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::types::ObjectMeta;
use crate::constants::ACL_POLICY_METADATA_KEY;

/// Whether an object may be read by anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectVisibility {
    Public,
    Private,
}

impl ObjectVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Permission requested on, or granted for, an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectPermission {
    Read,
    Write,
}

impl ObjectPermission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    /// Write grants imply read.
    pub fn covers(self, requested: Self) -> bool {
        self == Self::Write || requested == Self::Read
    }
}

/// A set of principals a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessGroup {
    /// An explicit list of user ids.
    Users { ids: Vec<String> },
}

impl AccessGroup {
    pub fn has_member(&self, user_id: &str) -> bool {
        match self {
            Self::Users { ids } => ids.iter().any(|id| id == user_id),
        }
    }
}

/// Grants `permission` to every member of `group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAclRule {
    pub group: AccessGroup,
    pub permission: ObjectPermission,
}

/// Access policy attached to a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAclPolicy {
    pub owner: String,
    pub visibility: ObjectVisibility,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl_rules: Vec<ObjectAclRule>,
}

impl ObjectAclPolicy {
    pub fn public(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            visibility: ObjectVisibility::Public,
            acl_rules: Vec::new(),
        }
    }

    pub fn private(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            visibility: ObjectVisibility::Private,
            acl_rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, group: AccessGroup, permission: ObjectPermission) -> Self {
        self.acl_rules.push(ObjectAclRule { group, permission });
        self
    }

    pub fn is_public(&self) -> bool {
        self.visibility == ObjectVisibility::Public
    }

    pub(crate) fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize ACL policy")
    }
}

/// Reads the policy stored on an object, if any.
///
/// # Errors
///
/// Returns an error if a policy is present but not valid JSON.
pub fn policy_from_meta(meta: &ObjectMeta) -> Result<Option<ObjectAclPolicy>> {
    meta.metadata
        .get(ACL_POLICY_METADATA_KEY)
        .map(|raw| {
            serde_json::from_str(raw)
                .with_context(|| format!("Malformed ACL policy on {}", meta.location))
        })
        .transpose()
}

/// Decides whether `user_id` may perform `requested` under `policy`.
///
/// - No policy: deny.
/// - Public object and a read: allow, even anonymously.
/// - Anonymous caller otherwise: deny.
/// - Owner: allow.
/// - Otherwise: allow if any rule's group contains the user and its
///   permission covers the request.
pub fn can_access(
    user_id: Option<&str>,
    policy: Option<&ObjectAclPolicy>,
    requested: ObjectPermission,
) -> bool {
    let Some(policy) = policy else {
        return false;
    };

    if policy.is_public() && requested == ObjectPermission::Read {
        return true;
    }

    let Some(user_id) = user_id else {
        return false;
    };

    if policy.owner == user_id {
        return true;
    }

    policy
        .acl_rules
        .iter()
        .any(|rule| rule.group.has_member(user_id) && rule.permission.covers(requested))
}

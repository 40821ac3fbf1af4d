//! Local identity: which node this process runs on, and whether it is an
//! etcd member.
//!
//! Identity is resolved through an injected [`IdentityProvider`] on every
//! reconciliation, so a node name assigned after startup is picked up by the
//! next delivery.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Environment variable holding the local node name.
pub const NODE_NAME_ENV: &str = "NODE_NAME";

/// Identity this process advertises to the etcd cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    /// Member name.
    pub name: String,
    /// Advertised peer address.
    pub address: String,
}

impl MemberIdentity {
    /// Create a member identity.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Snapshot of the local identity for one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Local node name; `None` until assigned.
    pub node_name: Option<String>,
    /// Etcd member identity; `None` when this process does not run etcd.
    pub member: Option<MemberIdentity>,
}

impl LocalIdentity {
    /// Identity for a named node. An empty name stays unresolved.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: non_empty(node_name.into()),
            member: None,
        }
    }

    /// Identity with no node name yet.
    pub fn unresolved() -> Self {
        Self::default()
    }

    /// Mark this process as an etcd member.
    #[must_use]
    pub fn with_member(mut self, member: MemberIdentity) -> Self {
        self.member = Some(member);
        self
    }

    /// The resolved node name.
    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    /// Whether this process runs etcd.
    pub const fn runs_etcd(&self) -> bool {
        self.member.is_some()
    }
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

/// Source of the local identity.
pub trait IdentityProvider: Send + Sync {
    /// Resolve the current identity.
    fn resolve(&self) -> LocalIdentity;
}

/// Reads the node name from the process environment on every call.
#[derive(Debug, Clone)]
pub struct EnvIdentityProvider {
    var: String,
    member: Option<MemberIdentity>,
}

impl EnvIdentityProvider {
    /// Read the node name from `NODE_NAME`.
    pub fn new(member: Option<MemberIdentity>) -> Self {
        Self::with_var(NODE_NAME_ENV, member)
    }

    /// Read the node name from a custom variable.
    pub fn with_var(var: impl Into<String>, member: Option<MemberIdentity>) -> Self {
        Self {
            var: var.into(),
            member,
        }
    }
}

impl IdentityProvider for EnvIdentityProvider {
    fn resolve(&self) -> LocalIdentity {
        LocalIdentity {
            node_name: std::env::var(&self.var).ok().and_then(non_empty),
            member: self.member.clone(),
        }
    }
}

/// In-memory identity, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    identity: RwLock<LocalIdentity>,
}

impl StaticIdentityProvider {
    /// Create a provider returning `identity`.
    pub const fn new(identity: LocalIdentity) -> Self {
        Self {
            identity: RwLock::new(identity),
        }
    }

    /// Assign the node name; an empty name clears it.
    pub fn set_node_name(&self, node_name: impl Into<String>) {
        self.write(|identity| identity.node_name = non_empty(node_name.into()));
    }

    /// Set or clear the etcd member identity.
    pub fn set_member(&self, member: Option<MemberIdentity>) {
        self.write(|identity| identity.member = member);
    }

    fn write(&self, f: impl FnOnce(&mut LocalIdentity)) {
        let mut identity = self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut identity);
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self) -> LocalIdentity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

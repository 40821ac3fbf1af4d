//! Pure reconciliation: snapshot in, directive out.

use std::sync::Arc;
use std::time::Duration;

use nodemeta_core::Node;
use tracing::{debug, info};

use crate::identity::{IdentityProvider, LocalIdentity};
use crate::metadata::DesiredMetadata;

/// Delay before re-delivering a key while the node name is unassigned.
pub const IDENTITY_REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// What the caller should do after a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// The snapshot is already converged, or not ours to touch.
    NoAction,
    /// Submit this node as a replacement of the snapshot.
    Update(Node),
    /// Deliver the same key again after this delay.
    RequeueAfter(Duration),
}

impl Directive {
    /// Whether no write and no requeue is needed.
    pub const fn is_no_action(&self) -> bool {
        matches!(self, Self::NoAction)
    }

    /// Get a description of the directive.
    pub fn description(&self) -> String {
        match self {
            Self::NoAction => "no action".to_string(),
            Self::Update(node) => format!("update node {}", node.name),
            Self::RequeueAfter(delay) => format!("requeue after {delay:?}"),
        }
    }
}

/// Computes the convergence directive for the local node's etcd metadata.
pub struct MetadataReconciler {
    identity: Arc<dyn IdentityProvider>,
}

impl MetadataReconciler {
    /// Create a reconciler over an identity source.
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    /// Reconcile the snapshot delivered for `key`.
    ///
    /// - deleted node: [`Directive::NoAction`]
    /// - node name not yet assigned: [`Directive::RequeueAfter`] with
    ///   [`IDENTITY_REQUEUE_DELAY`]
    /// - another node: [`Directive::NoAction`]
    /// - the local node: [`Directive::Update`] unless already converged
    pub fn reconcile(&self, key: &str, snapshot: Option<&Node>) -> Directive {
        let Some(node) = snapshot else {
            return Directive::NoAction;
        };

        let identity = self.identity.resolve();
        let Some(node_name) = identity.node_name() else {
            debug!(
                key,
                "Waiting for node name to be assigned for managed etcd node metadata controller"
            );
            return Directive::RequeueAfter(IDENTITY_REQUEUE_DELAY);
        };

        if key != node_name {
            return Directive::NoAction;
        }

        Self::reconcile_self(node, &identity)
    }

    fn reconcile_self(node: &Node, identity: &LocalIdentity) -> Directive {
        let desired = DesiredMetadata::for_member(identity.member.as_ref());

        if desired.is_satisfied_by(node) {
            debug!(node = %node.name, "Etcd node metadata converged");
            return Directive::NoAction;
        }

        info!(
            node = %node.name,
            etcd = identity.runs_etcd(),
            "Converging etcd node metadata"
        );
        Directive::Update(desired.apply(node))
    }
}

//! Managed metadata keys and the desired state derived from local config.

use nodemeta_core::Node;

use crate::identity::MemberIdentity;

/// Annotation carrying the etcd member name of the node.
pub const NODE_NAME_ANNOTATION: &str = "etcd.k3s.cattle.io/node-name";

/// Annotation carrying the etcd peer address of the node.
pub const NODE_ADDRESS_ANNOTATION: &str = "etcd.k3s.cattle.io/node-address";

/// Label marking a node as an etcd member.
pub const ETCD_ROLE_LABEL: &str = "node-role.kubernetes.io/etcd";

/// Value of [`ETCD_ROLE_LABEL`] on etcd members.
pub const ETCD_ROLE_VALUE: &str = "true";

/// Target value of the three managed metadata fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredMetadata {
    /// None of the managed fields may be set.
    Absent,
    /// All managed fields set to this member's identity.
    Present {
        /// Member name for [`NODE_NAME_ANNOTATION`].
        name: String,
        /// Peer address for [`NODE_ADDRESS_ANNOTATION`].
        address: String,
    },
}

impl DesiredMetadata {
    /// Desired state for a process that is (`Some`) or is not (`None`) an etcd member.
    pub fn for_member(member: Option<&MemberIdentity>) -> Self {
        member.map_or(Self::Absent, |m| Self::Present {
            name: m.name.clone(),
            address: m.address.clone(),
        })
    }

    /// Whether `node` already carries this state.
    ///
    /// A missing key and an empty value are treated alike.
    pub fn is_satisfied_by(&self, node: &Node) -> bool {
        let name = node.annotation_value(NODE_NAME_ANNOTATION);
        let address = node.annotation_value(NODE_ADDRESS_ANNOTATION);
        let role = node.label_value(ETCD_ROLE_LABEL);

        match self {
            Self::Absent => name.is_empty() && address.is_empty() && role.is_empty(),
            Self::Present {
                name: want_name,
                address: want_address,
            } => name == want_name && address == want_address && role == ETCD_ROLE_VALUE,
        }
    }

    /// A copy of `node` converged to this state.
    ///
    /// Only the three managed keys change; unset maps are allocated first.
    pub fn apply(&self, node: &Node) -> Node {
        let mut desired = node.clone();

        match self {
            Self::Absent => {
                let annotations = desired.annotations_mut();
                annotations.remove(NODE_NAME_ANNOTATION);
                annotations.remove(NODE_ADDRESS_ANNOTATION);
                desired.labels_mut().remove(ETCD_ROLE_LABEL);
            }
            Self::Present { name, address } => {
                let annotations = desired.annotations_mut();
                annotations.insert(NODE_NAME_ANNOTATION.to_string(), name.clone());
                annotations.insert(NODE_ADDRESS_ANNOTATION.to_string(), address.clone());
                desired
                    .labels_mut()
                    .insert(ETCD_ROLE_LABEL.to_string(), ETCD_ROLE_VALUE.to_string());
            }
        }

        desired
    }
}

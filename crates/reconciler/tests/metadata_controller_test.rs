//! End-to-end tests: registry -> controller -> metadata handler -> registry.
//!
//! These tests verify that:
//! - The local node converges to the configured etcd membership
//! - Other nodes are never written
//! - Convergence does not cause repeated writes
//! - A node name assigned late is picked up by the identity requeue
//! - Failed writes are retried by the controller

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use nodemeta_core::Node;
use nodemeta_events::{ControllerConfig, InMemoryNodeRegistry, NodeClient, NodeController};
use nodemeta_reconciler::{
    register_metadata_handlers, DesiredMetadata, IdentityProvider, LocalIdentity, MemberIdentity,
    StaticIdentityProvider, ETCD_ROLE_LABEL, ETCD_ROLE_VALUE, IDENTITY_REQUEUE_DELAY,
    NODE_ADDRESS_ANNOTATION, NODE_NAME_ANNOTATION,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

struct Harness {
    registry: Arc<InMemoryNodeRegistry>,
    identity: Arc<StaticIdentityProvider>,
    stop_tx: watch::Sender<bool>,
    run: JoinHandle<nodemeta_core::Result<()>>,
}

impl Harness {
    async fn start(
        identity: LocalIdentity,
        nodes: Vec<Node>,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let registry = InMemoryNodeRegistry::new_arc();
        for node in nodes {
            registry.create(node).await?;
        }

        let client: Arc<dyn NodeClient> = registry.clone();
        let controller = Arc::new(NodeController::new(client, ControllerConfig::default()));
        let identity = Arc::new(StaticIdentityProvider::new(identity));
        let (stop_tx, stop_rx) = watch::channel(false);

        let provider: Arc<dyn IdentityProvider> = identity.clone();
        register_metadata_handlers(&controller, provider, stop_rx.clone()).await;
        let run = tokio::spawn(controller.run(stop_rx));

        Ok(Self {
            registry,
            identity,
            stop_tx,
            run,
        })
    }

    async fn node(&self, name: &str) -> Option<Node> {
        self.registry.get(name).await.ok().flatten()
    }

    /// Poll until `name` satisfies `desired`, or give up after `limit`.
    async fn wait_for(&self, name: &str, desired: &DesiredMetadata, limit: Duration) -> bool {
        timeout(limit, async {
            loop {
                if self
                    .node(name)
                    .await
                    .is_some_and(|n| desired.is_satisfied_by(&n))
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    async fn stop(self) -> TestResult {
        self.stop_tx.send(true)?;
        timeout(Duration::from_secs(2), self.run).await???;
        Ok(())
    }
}

fn member() -> MemberIdentity {
    MemberIdentity::new("m1", "10.0.0.1:2380")
}

fn annotated(name: &str) -> Node {
    Node::new(name)
        .with_annotation(NODE_NAME_ANNOTATION, "stale")
        .with_annotation(NODE_ADDRESS_ANNOTATION, "10.9.9.9:2380")
        .with_annotation("unrelated/annotation", "keep")
        .with_label(ETCD_ROLE_LABEL, ETCD_ROLE_VALUE)
        .with_label("unrelated/label", "keep")
}

/// # GIVEN
/// An etcd member running on node "n1" and a peer node "n2"
///
/// # WHEN
/// The controller runs
///
/// # THEN
/// "n1" gains the member annotations and role label with exactly one write,
/// and "n2" is left untouched
#[tokio::test]
async fn test_member_node_converges_once() -> TestResult {
    let peer = Node::new("n2").with_label("zone", "b");
    let harness = Harness::start(
        LocalIdentity::new("n1").with_member(member()),
        vec![Node::new("n1").with_label("zone", "a"), peer.clone()],
    )
    .await?;

    let desired = DesiredMetadata::for_member(Some(&member()));
    assert!(harness.wait_for("n1", &desired, Duration::from_secs(2)).await);

    // Let the change caused by our own write come back around.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.registry.write_count(), 1);

    let local = harness.node("n1").await;
    assert_eq!(
        local.as_ref().and_then(|n| n.annotation(NODE_NAME_ANNOTATION)),
        Some("m1")
    );
    assert_eq!(
        local.as_ref().and_then(|n| n.annotation(NODE_ADDRESS_ANNOTATION)),
        Some("10.0.0.1:2380")
    );
    assert_eq!(local.as_ref().and_then(|n| n.label("zone")), Some("a"));

    let untouched = harness.node("n2").await.map(|n| n.with_resource_version(0));
    assert_eq!(untouched, Some(peer));

    harness.stop().await
}

/// # GIVEN
/// A non-member process on node "n1" whose node still carries etcd metadata
///
/// # WHEN
/// The controller runs
///
/// # THEN
/// The three managed fields are removed and unrelated metadata survives
#[tokio::test]
async fn test_non_member_node_is_stripped() -> TestResult {
    let harness = Harness::start(LocalIdentity::new("n1"), vec![annotated("n1")]).await?;

    assert!(
        harness
            .wait_for("n1", &DesiredMetadata::Absent, Duration::from_secs(2))
            .await
    );

    let local = harness.node("n1").await;
    assert_eq!(
        local.as_ref().and_then(|n| n.annotation("unrelated/annotation")),
        Some("keep")
    );
    assert_eq!(
        local.as_ref().and_then(|n| n.label("unrelated/label")),
        Some("keep")
    );
    assert_eq!(harness.registry.write_count(), 1);

    harness.stop().await
}

/// # GIVEN
/// An etcd member whose node name is not assigned yet
///
/// # WHEN
/// The name is assigned after the first delivery
///
/// # THEN
/// The identity requeue re-delivers the node and it converges, no earlier
/// than the requeue delay
#[tokio::test(start_paused = true)]
async fn test_late_node_name_is_picked_up_by_requeue() -> TestResult {
    let mut identity = LocalIdentity::unresolved();
    identity.member = Some(member());
    let start = Instant::now();
    let harness = Harness::start(identity, vec![Node::new("n1")]).await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.registry.write_count(), 0);

    harness.identity.set_node_name("n1");

    let desired = DesiredMetadata::for_member(Some(&member()));
    assert!(harness.wait_for("n1", &desired, Duration::from_secs(30)).await);
    assert!(start.elapsed() >= IDENTITY_REQUEUE_DELAY);
    assert_eq!(harness.registry.write_count(), 1);

    harness.stop().await
}

/// # GIVEN
/// A registry whose next two updates fail
///
/// # WHEN
/// The controller reconciles the local member node
///
/// # THEN
/// The controller retries and the node converges with one successful write
#[tokio::test(start_paused = true)]
async fn test_failed_write_is_retried_by_controller() -> TestResult {
    let identity = LocalIdentity::new("n1").with_member(member());
    let harness = Harness::start(identity, Vec::new()).await?;
    harness.registry.inject_update_failures(2);
    harness.registry.create(Node::new("n1")).await?;

    let desired = DesiredMetadata::for_member(Some(&member()));
    assert!(harness.wait_for("n1", &desired, Duration::from_secs(30)).await);
    assert_eq!(harness.registry.write_count(), 1);

    harness.stop().await
}

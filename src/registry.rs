use std::{collections::HashMap, fmt, time::SystemTime};

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::{
    frame::Frame,
    node::{Node, NodeSnapshot},
};

/// The authoritative, concurrency-safe collection of connected nodes plus the
/// process-wide barrier flag. All mutation happens under one mutex; snapshots
/// and routes are cloned out so no socket I/O runs while the lock is held.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    nodes: HashMap<String, Node>,
    barrier_open: bool,
}

/// Delivery handle cloned out of the registry for I/O outside the lock.
#[derive(Debug, Clone)]
pub struct NodeRoute {
    pub uuid: String,
    pub is_gui: bool,
    pub outbound: mpsc::UnboundedSender<Frame>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// Another live node already registered under this UUID.
    DuplicateIdentity,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::DuplicateIdentity => f.write_str("uuid is already registered"),
        }
    }
}

impl std::error::Error for RegisterError {}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                nodes: HashMap::new(),
                barrier_open: false,
            }),
        }
    }

    pub async fn register(&self, node: Node) -> Result<(), RegisterError> {
        let mut inner = self.inner.lock().await;
        if inner.nodes.contains_key(&node.uuid) {
            return Err(RegisterError::DuplicateIdentity);
        }
        inner.nodes.insert(node.uuid.clone(), node);
        Ok(())
    }

    /// Removes a node; idempotent. Dropping the returned node's outbound
    /// sender lets its writer task shut the socket down exactly once.
    pub async fn remove(&self, uuid: &str) -> Option<Node> {
        let mut inner = self.inner.lock().await;
        let mut node = inner.nodes.remove(uuid)?;
        node.online = false;
        Some(node)
    }

    pub async fn contains(&self, uuid: &str) -> bool {
        self.inner.lock().await.nodes.contains_key(uuid)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.nodes.is_empty()
    }

    /// Stamps a liveness acknowledgment. Returns false for unknown UUIDs.
    pub async fn record_ping(&self, uuid: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.nodes.get_mut(uuid) {
            Some(node) => {
                node.last_ping = SystemTime::now();
                true
            }
            None => false,
        }
    }

    pub async fn last_ping(&self, uuid: &str) -> Option<SystemTime> {
        let inner = self.inner.lock().await;
        inner.nodes.get(uuid).map(|node| node.last_ping)
    }

    /// Applies a barrier report from one controller. The shared flag follows
    /// the most recent write. Returns `Some(true)` when the shared value
    /// changed, `Some(false)` when it was already equal, and `None` when the
    /// reporting UUID is unknown.
    pub async fn set_barrier(&self, uuid: &str, open: bool) -> Option<bool> {
        let mut inner = self.inner.lock().await;
        let node = inner.nodes.get_mut(uuid)?;
        node.barrier_open = open;
        let changed = inner.barrier_open != open;
        inner.barrier_open = open;
        Some(changed)
    }

    pub async fn barrier_open(&self) -> bool {
        self.inner.lock().await.barrier_open
    }

    /// Point-in-time view of every node, ordered by UUID so `CLIENT_DATA`
    /// payloads are stable across calls.
    pub async fn snapshot(&self) -> Vec<NodeSnapshot> {
        let inner = self.inner.lock().await;
        let mut nodes: Vec<NodeSnapshot> = inner.nodes.values().map(Node::snapshot).collect();
        nodes.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        nodes
    }

    pub async fn routes(&self) -> Vec<NodeRoute> {
        let inner = self.inner.lock().await;
        let mut routes: Vec<NodeRoute> = inner
            .nodes
            .values()
            .map(|node| NodeRoute {
                uuid: node.uuid.clone(),
                is_gui: node.is_gui,
                outbound: node.outbound.clone(),
            })
            .collect();
        routes.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        routes
    }

    pub async fn route(&self, uuid: &str) -> Option<NodeRoute> {
        let inner = self.inner.lock().await;
        inner.nodes.get(uuid).map(|node| NodeRoute {
            uuid: node.uuid.clone(),
            is_gui: node.is_gui,
            outbound: node.outbound.clone(),
        })
    }

    /// Best-effort write: enqueues the frame on the node's outbound queue. A
    /// closed queue is definitive evidence the connection died, so the node
    /// is unregistered on the spot. Returns whether the frame was enqueued.
    pub async fn deliver(&self, route: &NodeRoute, frame: Frame) -> bool {
        if route.outbound.send(frame).is_ok() {
            return true;
        }
        if self.remove(&route.uuid).await.is_some() {
            info!(uuid = %route.uuid, "client lost connection and has been unregistered");
        } else {
            warn!(uuid = %route.uuid, "delivery failed for already-removed client");
        }
        false
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

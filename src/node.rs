use std::{
    net::{IpAddr, SocketAddr},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::frame::Frame;

/// Server-side record of one connected client.
///
/// The socket write half is owned by the connection's writer task; the
/// registry holds only the `outbound` queue, so replies and probes from
/// different tasks are serialized per connection. A closed queue means the
/// writer task died on a write error, i.e. the connection is gone.
#[derive(Debug, Clone)]
pub struct Node {
    pub uuid: String,
    pub address: IpAddr,
    pub port: u16,
    pub online: bool,
    pub last_ping: SystemTime,
    pub barrier_open: bool,
    pub is_gui: bool,
    pub outbound: mpsc::UnboundedSender<Frame>,
}

impl Node {
    pub fn new(uuid: impl Into<String>, peer: SocketAddr, outbound: mpsc::UnboundedSender<Frame>) -> Self {
        let uuid = uuid.into();
        // Dashboards follow a GUI-prefixed naming convention and are exempt
        // from liveness probing.
        let is_gui = uuid.contains("GUI");
        Self {
            uuid,
            address: peer.ip(),
            port: peer.port(),
            online: true,
            last_ping: SystemTime::now(),
            barrier_open: false,
            is_gui,
            outbound,
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let last_ping_secs = self
            .last_ping
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        NodeSnapshot {
            uuid: self.uuid.clone(),
            address: self.address,
            port: self.port,
            online: self.online,
            last_ping_secs,
            barrier_open: self.barrier_open,
            is_gui: self.is_gui,
        }
    }
}

/// Serializable view of a [`Node`], carried in `CLIENT_DATA` payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub uuid: String,
    pub address: IpAddr,
    pub port: u16,
    pub online: bool,
    pub last_ping_secs: u64,
    pub barrier_open: bool,
    pub is_gui: bool,
}

use std::{sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{
    frame::{Frame, Header},
    registry::Registry,
};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(2500);

/// Periodically probes every controller node to detect dead connections.
///
/// Dashboards (`GUI` nodes) are never probed. A failed delivery is taken as
/// definitive evidence of disconnection and unregisters the node immediately;
/// there is no `last_ping` timeout. A stalled client that keeps its socket
/// open stays registered until a write to it fails.
pub struct Sweeper {
    registry: Arc<Registry>,
    period: Duration,
}

impl Sweeper {
    pub fn new(registry: Arc<Registry>, period: Duration) -> Self {
        Self { registry, period }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// One probe pass over a point-in-time route list. Socket I/O happens
    /// outside the registry lock.
    pub async fn sweep(&self) {
        for route in self.registry.routes().await {
            if route.is_gui {
                continue;
            }
            debug!(uuid = %route.uuid, "probing client");
            for header in [Header::IsAlive, Header::Status] {
                let probe = Frame::unicast(&route.uuid, header, "");
                if !self.registry.deliver(&route, probe).await {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::node::Node;

    fn test_node(uuid: &str) -> (Node, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Node::new(uuid, "127.0.0.1:4000".parse().expect("socket addr"), tx);
        (node, rx)
    }

    #[tokio::test]
    async fn probes_controllers_but_never_dashboards() {
        let registry = Arc::new(Registry::new());
        let (pi, mut rx_pi) = test_node("PI-A");
        let (gui, mut rx_gui) = test_node("GUI-1");
        registry.register(pi).await.expect("register PI-A");
        registry.register(gui).await.expect("register GUI-1");

        let sweeper = Sweeper::new(Arc::clone(&registry), DEFAULT_SWEEP_INTERVAL);
        sweeper.sweep().await;

        let first = rx_pi.try_recv().expect("controller gets IS_ALIVE");
        assert_eq!(first.header, Header::IsAlive);
        let second = rx_pi.try_recv().expect("controller gets STATUS");
        assert_eq!(second.header, Header::Status);
        assert!(rx_gui.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_connection_is_removed_without_touching_others() {
        let registry = Arc::new(Registry::new());
        let (alive, mut rx_alive) = test_node("PI-A");
        let (dead, rx_dead) = test_node("PI-B");
        registry.register(alive).await.expect("register PI-A");
        registry.register(dead).await.expect("register PI-B");
        drop(rx_dead);

        let sweeper = Sweeper::new(Arc::clone(&registry), DEFAULT_SWEEP_INTERVAL);
        sweeper.sweep().await;

        assert!(registry.contains("PI-A").await);
        assert!(!registry.contains("PI-B").await);
        assert_eq!(
            rx_alive.try_recv().expect("survivor still probed").header,
            Header::IsAlive
        );
    }
}

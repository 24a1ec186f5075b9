//! Collaborator interfaces for the operator-facing status hardware.
//!
//! Field deployments drive a 16x2 character LCD multiplexed between three
//! views by a physical selector switch. The hub only ever hands the
//! display two text lines and a lifecycle; how characters reach glass (GPIO
//! bit-banging, timing) lives behind [`StatusDisplay`] implementations.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    select,
    time::{MissedTickBehavior, interval},
};
use tracing::info;

use crate::registry::Registry;

/// Maximum characters per display line.
pub const DISPLAY_WIDTH: usize = 16;

/// Which view the operator has selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Per-controller liveness.
    NodeStatus,
    /// Water level readout.
    WaterLevel,
    /// Barrier open/closed.
    Barrier,
}

/// Two-line character display with an init/clear/shutdown lifecycle.
pub trait StatusDisplay: Send {
    fn init(&mut self);
    fn write_lines(&mut self, line1: &str, line2: &str);
    fn clear(&mut self);
    fn shutdown(&mut self);
}

/// Already-debounced view selector.
pub trait ModeSwitch: Send {
    fn mode(&self) -> DisplayMode;
}

/// Logs the display lines; stands in for the LCD on development machines.
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl StatusDisplay for ConsoleDisplay {
    fn init(&mut self) {}

    fn write_lines(&mut self, line1: &str, line2: &str) {
        info!(line1, line2, "status display");
    }

    fn clear(&mut self) {}

    fn shutdown(&mut self) {
        info!("status display shut down");
    }
}

/// Switch pinned to one view, for deployments without the physical selector.
#[derive(Debug, Clone, Copy)]
pub struct FixedSwitch(pub DisplayMode);

impl ModeSwitch for FixedSwitch {
    fn mode(&self) -> DisplayMode {
        self.0
    }
}

fn fit(text: &str) -> String {
    let mut line: String = text.chars().take(DISPLAY_WIDTH).collect();
    while line.len() < DISPLAY_WIDTH {
        line.push(' ');
    }
    line
}

/// Periodic render loop: polls the switch, formats registry state into two
/// display lines, and hands them to the display.
pub struct StatusPanel {
    registry: Arc<Registry>,
    display: Box<dyn StatusDisplay + Sync>,
    switch: Box<dyn ModeSwitch + Sync>,
    period: Duration,
}

impl StatusPanel {
    pub fn new(
        registry: Arc<Registry>,
        display: Box<dyn StatusDisplay + Sync>,
        switch: Box<dyn ModeSwitch + Sync>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            display,
            switch,
            period,
        }
    }

    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        self.display.init();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    self.display.clear();
                    self.display.shutdown();
                    break;
                }
                _ = ticker.tick() => {
                    self.render_once().await;
                }
            }
        }
    }

    pub async fn render_once(&mut self) {
        let (line1, line2) = match self.switch.mode() {
            DisplayMode::NodeStatus => self.node_status_lines().await,
            DisplayMode::WaterLevel => ("water level".to_string(), "n/a".to_string()),
            DisplayMode::Barrier => {
                let line1 = if self.registry.barrier_open().await {
                    "barrier open"
                } else {
                    "barrier closed"
                };
                (line1.to_string(), String::new())
            }
        };
        self.display.write_lines(&fit(&line1), &fit(&line2));
    }

    /// One line per controller, first two by UUID order.
    async fn node_status_lines(&self) -> (String, String) {
        let controllers: Vec<String> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|node| !node.is_gui)
            .map(|node| format!("{} online", node.uuid))
            .collect();

        let line1 = controllers.first().cloned().unwrap_or_else(|| "no controllers".into());
        let line2 = controllers.get(1).cloned().unwrap_or_default();
        (line1, line2)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::node::Node;

    /// Records writes so tests can assert on rendered lines.
    #[derive(Default)]
    struct RecordingDisplay {
        lines: std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>,
    }

    impl StatusDisplay for RecordingDisplay {
        fn init(&mut self) {}
        fn write_lines(&mut self, line1: &str, line2: &str) {
            self.lines
                .lock()
                .expect("lines mutex")
                .push((line1.to_string(), line2.to_string()));
        }
        fn clear(&mut self) {}
        fn shutdown(&mut self) {}
    }

    #[test]
    fn fit_pads_and_truncates_to_display_width() {
        assert_eq!(fit("abc").len(), DISPLAY_WIDTH);
        assert_eq!(fit("abc"), "abc             ");
        assert_eq!(fit("a very long line indeed"), "a very long line");
    }

    #[tokio::test]
    async fn barrier_view_reflects_shared_flag() {
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let node = Node::new("PI-A", "127.0.0.1:4000".parse().expect("socket addr"), tx);
        registry.register(node).await.expect("registration");
        registry.set_barrier("PI-A", true).await;

        let display = RecordingDisplay::default();
        let lines = std::sync::Arc::clone(&display.lines);
        let mut panel = StatusPanel::new(
            Arc::clone(&registry),
            Box::new(display),
            Box::new(FixedSwitch(DisplayMode::Barrier)),
            Duration::from_millis(10),
        );

        panel.render_once().await;

        let rendered = lines.lock().expect("lines mutex");
        assert_eq!(rendered[0].0.trim_end(), "barrier open");
    }

    #[tokio::test]
    async fn node_status_view_lists_controllers_not_dashboards() {
        let registry = Arc::new(Registry::new());
        let mut receivers = Vec::new();
        for uuid in ["PI-B", "PI-A", "GUI-1"] {
            let (tx, rx) = mpsc::unbounded_channel();
            receivers.push(rx);
            let node = Node::new(uuid, "127.0.0.1:4000".parse().expect("socket addr"), tx);
            registry.register(node).await.expect("registration");
        }

        let display = RecordingDisplay::default();
        let lines = std::sync::Arc::clone(&display.lines);
        let mut panel = StatusPanel::new(
            Arc::clone(&registry),
            Box::new(display),
            Box::new(FixedSwitch(DisplayMode::NodeStatus)),
            Duration::from_millis(10),
        );

        panel.render_once().await;

        let rendered = lines.lock().expect("lines mutex");
        assert_eq!(rendered[0].0.trim_end(), "PI-A online");
        assert_eq!(rendered[0].1.trim_end(), "PI-B online");
    }
}

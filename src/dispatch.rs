use serde_json::json;
use tracing::{debug, warn};

use crate::{
    frame::{BarrierReport, Frame, Header},
    registry::Registry,
};

/// Interprets one decoded frame against current registry state. Handlers are
/// keyed on the frame's origin field, which carries the sender's UUID.
///
/// Unknown headers are ignored by policy rather than by fallthrough: a frame
/// the server does not understand must never tear down the connection that
/// carried it.
pub async fn dispatch(registry: &Registry, frame: Frame) {
    match frame.header {
        Header::IsAlive | Header::Ack => {
            if !registry.record_ping(&frame.origin).await {
                warn!(origin = %frame.origin, "liveness ack from unregistered origin");
            }
        }
        Header::BarrierStatus => handle_barrier_status(registry, &frame).await,
        Header::GuiUpdateReq => handle_gui_update_req(registry, &frame.origin).await,
        Header::Uuid => {
            debug!(origin = %frame.origin, "ignoring identity announcement outside handshake");
        }
        Header::UuidReq | Header::Status | Header::RegComplete | Header::ClientData => {
            debug!(origin = %frame.origin, header = %frame.header, "ignoring server-only header");
        }
        Header::Other(ref header) => {
            debug!(origin = %frame.origin, header = %header, "ignoring unrecognized header");
        }
    }
}

async fn handle_barrier_status(registry: &Registry, frame: &Frame) {
    let report: BarrierReport = match serde_json::from_str(&frame.payload) {
        Ok(report) => report,
        Err(error) => {
            warn!(origin = %frame.origin, ?error, "dropping unparseable barrier report");
            return;
        }
    };

    match registry.set_barrier(&frame.origin, report.barrier_open).await {
        Some(true) => push_barrier_update(registry, report.barrier_open).await,
        Some(false) => {}
        None => warn!(origin = %frame.origin, "barrier report from unregistered origin"),
    }
}

/// Pushes the new shared barrier value to every dashboard so they do not
/// have to wait for their next poll.
async fn push_barrier_update(registry: &Registry, barrier_open: bool) {
    let payload = json!({ "barrier_open": barrier_open }).to_string();
    for route in registry.routes().await {
        if !route.is_gui {
            continue;
        }
        let frame = Frame::unicast(&route.uuid, Header::BarrierStatus, payload.clone());
        registry.deliver(&route, frame).await;
    }
}

async fn handle_gui_update_req(registry: &Registry, origin: &str) {
    let Some(route) = registry.route(origin).await else {
        warn!(origin, "snapshot request from unregistered origin");
        return;
    };

    let snapshot = registry.snapshot().await;
    let payload = match serde_json::to_string(&snapshot) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(?error, "failed to serialize registry snapshot");
            return;
        }
    };

    registry
        .deliver(&route, Frame::unicast(origin, Header::ClientData, payload))
        .await;
}

//! TCP hub for a small fleet of barrier controllers and GUI dashboards.
//!
//! Clients connect over a line-oriented, comma-delimited text protocol,
//! identify themselves with a client-chosen UUID, and are tracked in a
//! shared registry together with the process-wide barrier-open flag. Each
//! module focuses on one responsibility:
//!
//! - [`cli`] parses the command-line interface.
//! - [`frame`] is the wire codec: typed headers, field splitting, and
//!   newline-framed async reads and writes.
//! - [`node`] holds the per-client record and its serializable snapshot.
//! - [`registry`] is the mutex-guarded collection every task coordinates
//!   through, including the shared barrier flag.
//! - [`dispatch`] interprets decoded frames and produces replies and pushes.
//! - [`server`] accepts connections and runs the per-connection handshake,
//!   read loop, and writer task.
//! - [`sweeper`] probes controllers on a fixed period and prunes dead
//!   connections.
//! - [`display`] models the operator status display and selector switch as
//!   collaborator traits.
//!
//! Integration tests speak the real wire protocol against a hub bound to an
//! ephemeral port.

pub mod cli;
pub mod dispatch;
pub mod display;
pub mod frame;
pub mod node;
pub mod registry;
pub mod server;
pub mod sweeper;

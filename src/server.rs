use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    dispatch::dispatch,
    frame::{Frame, Header, read_frame, write_frame},
    node::Node,
    registry::{RegisterError, Registry},
};

/// Accepts fleet connections and runs one handler task per client.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(listener: TcpListener, registry: Arc<Registry>) -> Self {
        Self { listener, registry }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("hub shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, registry),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>) {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, peer, registry).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

/// Per-connection state machine: identify, register, then relay frames to
/// the dispatcher until the transport fails or the peer hangs up.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Arc<Registry>) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let uuid = match identify(&mut reader, writer).await {
        Identified::Node { uuid, writer } => {
            register_node(&registry, &uuid, peer, writer).await?;
            uuid
        }
        Identified::Aborted(reason) => {
            anyhow::bail!("identification failed: {reason}");
        }
    };

    info!(uuid = %uuid, peer = %peer, "client registered");

    let session = run_read_loop(&registry, &mut reader).await;
    if registry.remove(&uuid).await.is_some() {
        info!(uuid = %uuid, peer = %peer, "client disconnected and unregistered");
    }
    session
}

enum Identified {
    Node { uuid: String, writer: OwnedWriteHalf },
    Aborted(String),
}

/// Sends `UUID_REQ` and blocks for exactly one reply frame. Anything other
/// than a `UUID` announcement with a non-empty identity aborts the
/// connection before it ever reaches the registry.
async fn identify(reader: &mut BufReader<OwnedReadHalf>, mut writer: OwnedWriteHalf) -> Identified {
    if let Err(err) = write_frame(&mut writer, &Frame::broadcast(Header::UuidReq, "")).await {
        return Identified::Aborted(format!("failed to send identity request: {err}"));
    }

    let frame = match read_frame(reader).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Identified::Aborted("connection closed before identification".into()),
        Err(err) => return Identified::Aborted(format!("transport error during identification: {err}")),
    };

    match frame.header {
        Header::Uuid => {
            let uuid = frame.payload.trim().to_string();
            if uuid.is_empty() {
                Identified::Aborted("empty identity".into())
            } else {
                Identified::Node { uuid, writer }
            }
        }
        other => Identified::Aborted(format!("expected UUID announcement, got {other}")),
    }
}

async fn register_node(
    registry: &Registry,
    uuid: &str,
    peer: SocketAddr,
    writer: OwnedWriteHalf,
) -> Result<()> {
    let (outbound, outbox) = mpsc::unbounded_channel();
    let node = Node::new(uuid, peer, outbound.clone());

    match registry.register(node).await {
        Ok(()) => {}
        Err(RegisterError::DuplicateIdentity) => {
            anyhow::bail!("uuid '{uuid}' is already registered; rejecting connection");
        }
    }

    spawn_writer_task(uuid.to_string(), writer, outbox);

    // The queue cannot be closed yet; the writer task was just spawned.
    let _ = outbound.send(Frame::unicast(uuid, Header::RegComplete, uuid));
    Ok(())
}

/// Single writer per connection: drains the outbound queue so dispatcher
/// replies and sweeper probes can never interleave partial frames. Ends when
/// every sender is dropped (node removed) or a write fails, and shuts the
/// socket down exactly once either way.
fn spawn_writer_task(uuid: String, mut writer: OwnedWriteHalf, mut outbox: mpsc::UnboundedReceiver<Frame>) {
    tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if let Err(err) = write_frame(&mut writer, &frame).await {
                debug!(uuid = %uuid, error = ?err, "write failed; stopping writer");
                break;
            }
        }
        if let Err(err) = writer.shutdown().await {
            debug!(uuid = %uuid, error = ?err, "failed to shutdown client writer cleanly");
        }
    });
}

async fn run_read_loop(registry: &Registry, reader: &mut BufReader<OwnedReadHalf>) -> Result<()> {
    while let Some(frame) = read_frame(reader).await? {
        dispatch(registry, frame).await;
    }
    Ok(())
}

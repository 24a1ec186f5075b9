use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address the hub should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:5555")]
    pub listen: SocketAddr,

    /// Liveness probe period in milliseconds.
    #[arg(long, default_value_t = 2500)]
    pub sweep_interval_ms: u64,

    /// Status panel refresh period in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub panel_interval_ms: u64,
}

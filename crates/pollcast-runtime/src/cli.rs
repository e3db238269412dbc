//! CLI definition using clap derive.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pollcast_core::CoreConfig;
use pollcast_core::config::{
    DEFAULT_MAX_WAIT, DEFAULT_RECHECK_INTERVAL, DEFAULT_SUBSCRIBER_BUFFER, DEFAULT_WAIT,
};

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:3001";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3001";
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(10000);

#[derive(Parser)]
#[command(name = "pollcast", about = "Chat message log with push, short-poll and long-poll delivery")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP and WebSocket servers (default when no subcommand given)
    Serve(ServeOpts),
    /// Post one message over the push channel
    Send(SendOpts),
    /// Print messages as they arrive on the push channel
    Tail(TailOpts),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeOpts {
    /// HTTP listen address (POST /message, GET /messages/*)
    #[arg(long, env = "POLLCAST_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: SocketAddr,

    /// WebSocket push channel listen address
    #[arg(long, env = "POLLCAST_WS_ADDR", default_value = DEFAULT_WS_ADDR)]
    pub ws_addr: SocketAddr,

    /// Long-poll re-check interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_RECHECK_INTERVAL.as_millis() as u64)]
    pub recheck_interval_ms: u64,

    /// Long-poll wait when the request does not specify one, in milliseconds
    #[arg(long, default_value_t = DEFAULT_WAIT.as_millis() as u64)]
    pub default_wait_ms: u64,

    /// Upper bound on any long-poll wait, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_WAIT.as_millis() as u64)]
    pub max_wait_ms: u64,

    /// Queued deliveries per push client before it is disconnected
    #[arg(long, default_value_t = DEFAULT_SUBSCRIBER_BUFFER)]
    pub subscriber_buffer: usize,

    /// Maximum concurrent WebSocket connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Interval between server pings on each WebSocket, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL.as_millis() as u64)]
    pub ping_interval_ms: u64,

    /// Drop a WebSocket client silent for this long, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PING_TIMEOUT.as_millis() as u64)]
    pub ping_timeout_ms: u64,
}

impl Default for ServeOpts {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            ws_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            recheck_interval_ms: DEFAULT_RECHECK_INTERVAL.as_millis() as u64,
            default_wait_ms: DEFAULT_WAIT.as_millis() as u64,
            max_wait_ms: DEFAULT_MAX_WAIT.as_millis() as u64,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            ping_interval_ms: DEFAULT_PING_INTERVAL.as_millis() as u64,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ServeOpts {
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            recheck_interval: Duration::from_millis(self.recheck_interval_ms),
            default_wait: Duration::from_millis(self.default_wait_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
            subscriber_buffer: self.subscriber_buffer,
        }
        .normalized()
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

#[derive(clap::Args)]
pub struct SendOpts {
    /// Push channel URL
    #[arg(long, env = "POLLCAST_WS_URL", default_value = DEFAULT_WS_URL)]
    pub url: String,

    /// Message text
    pub text: String,
}

#[derive(clap::Args)]
pub struct TailOpts {
    /// Push channel URL
    #[arg(long, env = "POLLCAST_WS_URL", default_value = DEFAULT_WS_URL)]
    pub url: String,

    /// Print each new message as a JSON line
    #[arg(long)]
    pub json: bool,

    /// Skip the history delivered on connect
    #[arg(long)]
    pub new_only: bool,
}

//! §4.11 Proxy Bridge (C11): the process a client agent spawns to reach
//! the shared daemon. Relays MCP JSON-RPC frames between the parent's
//! stdio transport and a loopback connection to `toolmesh-daemon`,
//! performing the `hello`/`helloAck` handshake and heartbeat up front.

mod bridge;
mod config;
mod error;

pub use bridge::{run_stdio_bridge, DaemonSpawner};
pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};

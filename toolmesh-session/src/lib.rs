//! §4.9 Session Server: a thin per-connection MCP server that holds no
//! state beyond its own `SelectionTracker` closure — the catalog,
//! index, policy, and retriever it reads are all shared by reference
//! from whatever constructed it (a daemon session or a stdio process).

mod error;
mod session;

pub use error::{SessionError, SessionResult};
pub use session::SessionServer;

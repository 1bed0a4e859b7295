//! The five fixed-surface meta-tools a session ever exposes to a client:
//! `find_tools`, `describe_tools`, `execute`, `list_namespaces`,
//! `clear_selection_cache`. Everything else in this workspace exists to
//! feed these five handlers.

mod detail;
mod error;
mod handler;
pub mod schema;

pub use error::{ToolsError, ToolsResult};
pub use handler::MetaTools;

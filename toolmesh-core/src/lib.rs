//! Domain types and error taxonomy shared by every toolmesh crate.
//!
//! Deliberately thin: no storage, transport, or MCP wire-format
//! dependencies live here so the catalog, index, retriever, and protocol
//! crates can each depend on it without pulling in each other's stack.

pub mod error;
pub mod types;

pub use error::{ToolmeshError, ToolmeshResult};
pub use types::{
    canonical_pair, qualify, split_qualified, CatalogedTool, ConnectionStatus,
    CredentialDescriptor, DetailLevel, IndexedTool, SearchMode, ServerConnectionInfo,
    UpstreamConfig,
};

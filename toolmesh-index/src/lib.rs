//! The Index Store: the persistent catalog of tools known to this
//! server, backed by SQLite with an FTS5 projection kept in sync by
//! triggers, plus raw-byte vector embeddings and a co-occurrence table
//! for bundle suggestions.

mod error;
mod fts;
mod schema;
mod store;
mod vector;

pub use error::{IndexError, IndexResult};
pub use fts::prepare_fts_query;
pub use store::{IndexStore, RelatedTool, ScoredTool};
pub use vector::{cosine_similarity, decode_embedding, encode_embedding};

//! The persistent tool table, FTS projection, and co-occurrence store.
//!
//! Every mutation goes through `SqlitePool`'s transactional API (§5:
//! "Index mutations are atomic"). Pool sizing follows the bounded,
//! pre-warmed posture described in `hanzo-sqlite`'s
//! `OptimizedPoolConfig`, adapted to `sqlx::sqlite::SqlitePoolOptions`
//! (see SPEC_FULL's Ambient Stack note) instead of introducing a second
//! SQLite driver.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use toolmesh_core::{canonical_pair, CatalogedTool, IndexedTool};

use crate::error::IndexResult;
use crate::fts::prepare_fts_query;
use crate::schema::ensure_schema;
use crate::vector::{cosine_similarity, decode_embedding, encode_embedding};

/// One scored hit from `search`/`search_semantic`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTool {
    pub tool: IndexedTool,
    pub score: f64,
}

/// A partner tool suggested because it tends to be used alongside the
/// tools already selected.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedTool {
    pub qualified_name: String,
    pub count: i64,
    pub last_used_at: DateTime<Utc>,
}

pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Opens (creating if absent) the on-disk store at `path`, or an
    /// in-memory store when `path` is `None`. In-memory stores are
    /// pinned to a single pooled connection: SQLite's `:memory:`
    /// databases are private per-connection, so a pool of more than one
    /// would silently fan each caller out to a different empty database.
    pub async fn open(path: Option<&Path>) -> IndexResult<Self> {
        let (connect_options, max_connections) = match path {
            Some(path) => (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true),
                16,
            ),
            None => (
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .expect("static in-memory DSN parses"),
                1,
            ),
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(if path.is_some() { 2 } else { 0 })
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Pure function of the canonicalized input schema, per §4.3.
    pub fn schema_hash(input_schema: &Value) -> String {
        let canonical = canonical_json(input_schema);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn index_tool(&self, tool: &CatalogedTool) -> IndexResult<IndexedTool> {
        let mut tx = self.pool.begin().await?;
        let indexed = upsert_tool(&mut tx, tool).await?;
        tx.commit().await?;
        Ok(indexed)
    }

    pub async fn index_tools(&self, tools: &[CatalogedTool]) -> IndexResult<Vec<IndexedTool>> {
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(tools.len());
        for tool in tools {
            out.push(upsert_tool(&mut tx, tool).await?);
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn get_tool(&self, name: &str, server_key: &str) -> IndexResult<Option<IndexedTool>> {
        let row = sqlx::query(
            "SELECT id, name, description, input_schema, server_key, schema_hash, embedding, created_at, updated_at \
             FROM tools WHERE name = ? AND server_key = ?",
        )
        .bind(name)
        .bind(server_key)
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_indexed_tool).transpose()
    }

    pub async fn get_tools_for_server(&self, server_key: &str) -> IndexResult<Vec<IndexedTool>> {
        let rows = sqlx::query(
            "SELECT id, name, description, input_schema, server_key, schema_hash, embedding, created_at, updated_at \
             FROM tools WHERE server_key = ? ORDER BY name",
        )
        .bind(server_key)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_indexed_tool).collect()
    }

    pub async fn get_all_tools(&self) -> IndexResult<Vec<IndexedTool>> {
        let rows = sqlx::query(
            "SELECT id, name, description, input_schema, server_key, schema_hash, embedding, created_at, updated_at \
             FROM tools ORDER BY server_key, name",
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_indexed_tool).collect()
    }

    /// Count-first then delete, per §4.3 ("FTS sync triggers affect the
    /// naive changes counter"): `Query::execute`'s rows-affected count on
    /// a table with AFTER triggers that themselves touch another table
    /// can't be trusted, so the pre-delete row count is the return value
    /// instead.
    pub async fn remove_tools_for_server(&self, server_key: &str) -> IndexResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tools WHERE server_key = ?")
            .bind(server_key)
            .fetch_one(self.pool())
            .await?;
        sqlx::query("DELETE FROM tools WHERE server_key = ?")
            .bind(server_key)
            .execute(self.pool())
            .await?;
        Ok(count as u64)
    }

    pub async fn remove_tool(&self, name: &str, server_key: &str) -> IndexResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tools WHERE name = ? AND server_key = ?",
        )
        .bind(name)
        .bind(server_key)
        .fetch_one(self.pool())
        .await?;
        sqlx::query("DELETE FROM tools WHERE name = ? AND server_key = ?")
            .bind(name)
            .bind(server_key)
            .execute(self.pool())
            .await?;
        Ok(count as u64)
    }

    pub async fn update_embedding(
        &self,
        name: &str,
        server_key: &str,
        embedding: &[f32],
    ) -> IndexResult<u64> {
        let bytes = encode_embedding(embedding);
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE tools SET embedding = ?, updated_at = ? WHERE name = ? AND server_key = ?",
        )
        .bind(bytes)
        .bind(now.to_rfc3339())
        .bind(name)
        .bind(server_key)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_embeddings(
        &self,
        updates: &[(String, String, Vec<f32>)],
    ) -> IndexResult<u64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let mut updated = 0u64;
        for (name, server_key, embedding) in updates {
            let bytes = encode_embedding(embedding);
            let result = sqlx::query(
                "UPDATE tools SET embedding = ?, updated_at = ? WHERE name = ? AND server_key = ?",
            )
            .bind(bytes)
            .bind(&now)
            .bind(name)
            .bind(server_key)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// FTS search, preprocessed per §4.3. `None` from `prepare_fts_query`
    /// (symbol-only/empty input) short-circuits to an empty result
    /// instead of ever reaching MATCH.
    pub async fn search(&self, query: &str, limit: u32) -> IndexResult<Vec<ScoredTool>> {
        let Some(prepared) = prepare_fts_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT t.id, t.name, t.description, t.input_schema, t.server_key, t.schema_hash, \
                    t.embedding, t.created_at, t.updated_at, tools_fts.rank AS rank \
             FROM tools_fts JOIN tools t ON t.id = tools_fts.rowid \
             WHERE tools_fts MATCH ? ORDER BY rank ASC LIMIT ?",
        )
        .bind(&prepared)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let rank: f64 = row.try_get("rank").unwrap_or(0.0);
                let tool = row_to_indexed_tool(row)?;
                Ok(ScoredTool {
                    tool,
                    score: -rank,
                })
            })
            .collect()
    }

    pub async fn search_count(&self, query: &str) -> IndexResult<u64> {
        let Some(prepared) = prepare_fts_query(query) else {
            return Ok(0);
        };
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tools_fts WHERE tools_fts MATCH ?",
        )
        .bind(&prepared)
        .fetch_one(self.pool())
        .await?;
        Ok(count as u64)
    }

    /// Cosine similarity over every tool with a non-null embedding.
    /// There is no vector index here (no pack precedent for one); for
    /// the catalog sizes this server targets (hundreds to low thousands
    /// of tools, not millions) a linear scan is the right tradeoff over
    /// introducing an ANN dependency.
    pub async fn search_semantic(&self, query_vector: &[f32], limit: u32) -> IndexResult<Vec<ScoredTool>> {
        let rows = sqlx::query(
            "SELECT id, name, description, input_schema, server_key, schema_hash, embedding, created_at, updated_at \
             FROM tools WHERE embedding IS NOT NULL",
        )
        .fetch_all(self.pool())
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let tool = row_to_indexed_tool(row)?;
            let Some(embedding) = &tool.embedding else {
                continue;
            };
            let score = cosine_similarity(query_vector, embedding) as f64;
            scored.push(ScoredTool { tool, score });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    pub async fn record_cooccurrence(&self, a: &str, b: &str) -> IndexResult<()> {
        let mut tx = self.pool.begin().await?;
        upsert_cooccurrence(&mut tx, a, b).await?;
        tx.commit().await?;
        Ok(())
    }

    /// All `C(n,2)` pairs from `keys`, recorded in a single transaction
    /// (§4.3). Pairs are canonicalized at this single call site (and in
    /// `record_cooccurrence`), the only two places the invariant "no
    /// reverse duplicates" needs to be enforced.
    pub async fn record_cooccurrences(&self, keys: &[String]) -> IndexResult<()> {
        if keys.len() < 2 {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                upsert_cooccurrence(&mut tx, &keys[i], &keys[j]).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_related_tools(
        &self,
        qualified_name: &str,
        min_count: i64,
        limit: u32,
    ) -> IndexResult<Vec<RelatedTool>> {
        let rows = sqlx::query(
            "SELECT CASE WHEN tool1_key = ? THEN tool2_key ELSE tool1_key END AS partner, \
                    count, last_used_at \
             FROM tool_cooccurrences \
             WHERE (tool1_key = ? OR tool2_key = ?) AND count >= ? \
             ORDER BY count DESC LIMIT ?",
        )
        .bind(qualified_name)
        .bind(qualified_name)
        .bind(qualified_name)
        .bind(min_count)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(row_to_related_tool).collect()
    }

    /// Aggregates partner counts across every tool in `keys`, excluding
    /// any partner already present in `keys`.
    pub async fn get_suggested_bundles(
        &self,
        keys: &[String],
        min_count: i64,
        limit: u32,
    ) -> IndexResult<Vec<RelatedTool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = keys.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT partner, SUM(count) AS total_count, MAX(last_used_at) AS last_used_at FROM ( \
                SELECT CASE WHEN tool1_key IN ({placeholders}) THEN tool2_key ELSE tool1_key END AS partner, \
                       count, last_used_at \
                FROM tool_cooccurrences \
                WHERE tool1_key IN ({placeholders}) OR tool2_key IN ({placeholders}) \
             ) WHERE partner NOT IN ({placeholders}) \
             GROUP BY partner HAVING total_count >= ? ORDER BY total_count DESC LIMIT ?"
        );

        let mut q = sqlx::query(&sql);
        for _ in 0..4 {
            for k in keys {
                q = q.bind(k);
            }
        }
        q = q.bind(min_count).bind(limit as i64);

        let rows = q.fetch_all(self.pool()).await?;
        rows.into_iter()
            .map(|row| {
                let partner: String = row.try_get("partner")?;
                let count: i64 = row.try_get("total_count")?;
                let last_used_raw: String = row.try_get("last_used_at")?;
                let last_used_at = parse_timestamp(&last_used_raw);
                Ok(RelatedTool {
                    qualified_name: partner,
                    count,
                    last_used_at,
                })
            })
            .collect()
    }

    pub async fn clear_cooccurrences(&self) -> IndexResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tool_cooccurrences")
            .fetch_one(self.pool())
            .await?;
        sqlx::query("DELETE FROM tool_cooccurrences")
            .execute(self.pool())
            .await?;
        Ok(count as u64)
    }
}

async fn upsert_tool(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    tool: &CatalogedTool,
) -> IndexResult<IndexedTool> {
    let now = Utc::now();
    let schema_json = serde_json::to_string(&tool.input_schema)?;
    let schema_hash = IndexStore::schema_hash(&tool.input_schema);

    sqlx::query(
        "INSERT INTO tools (name, description, input_schema, server_key, schema_hash, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(name, server_key) DO UPDATE SET \
            description = excluded.description, \
            input_schema = excluded.input_schema, \
            schema_hash = excluded.schema_hash, \
            updated_at = excluded.updated_at",
    )
    .bind(&tool.name)
    .bind(&tool.description)
    .bind(&schema_json)
    .bind(&tool.server_key)
    .bind(&schema_hash)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query(
        "SELECT id, name, description, input_schema, server_key, schema_hash, embedding, created_at, updated_at \
         FROM tools WHERE name = ? AND server_key = ?",
    )
    .bind(&tool.name)
    .bind(&tool.server_key)
    .fetch_one(&mut **tx)
    .await?;

    row_to_indexed_tool(row)
}

async fn upsert_cooccurrence(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    a: &str,
    b: &str,
) -> IndexResult<()> {
    let (first, second) = canonical_pair(a, b);
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO tool_cooccurrences (tool1_key, tool2_key, count, last_used_at) \
         VALUES (?, ?, 1, ?) \
         ON CONFLICT(tool1_key, tool2_key) DO UPDATE SET \
            count = count + 1, last_used_at = excluded.last_used_at",
    )
    .bind(first)
    .bind(second)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn row_to_indexed_tool(row: sqlx::sqlite::SqliteRow) -> IndexResult<IndexedTool> {
    let id: i64 = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    let description: Option<String> = row.try_get("description")?;
    let schema_raw: String = row.try_get("input_schema")?;
    let input_schema: Value = serde_json::from_str(&schema_raw)?;
    let server_key: String = row.try_get("server_key")?;
    let schema_hash: String = row.try_get("schema_hash")?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(IndexedTool {
        id,
        name,
        description,
        input_schema,
        server_key,
        schema_hash,
        embedding: embedding.map(|b| decode_embedding(&b)),
        created_at: parse_timestamp(&created_raw),
        updated_at: parse_timestamp(&updated_raw),
    })
}

fn row_to_related_tool(row: sqlx::sqlite::SqliteRow) -> IndexResult<RelatedTool> {
    let qualified_name: String = row.try_get("partner")?;
    let count: i64 = row.try_get("count")?;
    let last_used_raw: String = row.try_get("last_used_at")?;
    Ok(RelatedTool {
        qualified_name,
        count,
        last_used_at: parse_timestamp(&last_used_raw),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Deterministic JSON rendering used only to feed the schema hash: keys
/// sorted, no insignificant whitespace. `serde_json::Value`'s `Map` is a
/// `BTreeMap` by default (no `preserve_order` feature enabled anywhere in
/// the workspace), so `to_string` is already key-sorted; this helper
/// exists to make that guarantee explicit at the call site rather than
/// implicit in a Cargo feature flag.
fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, server_key: &str, description: &str) -> CatalogedTool {
        CatalogedTool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: json!({"type": "object"}),
            server_key: server_key.to_string(),
        }
    }

    #[tokio::test]
    async fn indexing_is_idempotent_by_name_and_server_key() {
        let store = IndexStore::open(None).await.unwrap();
        let t = tool("read_file", "fs", "Reads a file from disk");
        let first = store.index_tool(&t).await.unwrap();
        let second = store.index_tool(&t).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.schema_hash, second.schema_hash);
    }

    #[tokio::test]
    async fn search_finds_indexed_tool_by_prefix() {
        let store = IndexStore::open(None).await.unwrap();
        store
            .index_tool(&tool("read_file", "fs", "Reads the contents of a file"))
            .await
            .unwrap();
        let results = store.search("read", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool.name, "read_file");
    }

    #[tokio::test]
    async fn empty_query_returns_no_rows_without_erroring() {
        let store = IndexStore::open(None).await.unwrap();
        store
            .index_tool(&tool("read_file", "fs", "Reads a file"))
            .await
            .unwrap();
        let results = store.search("***", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn remove_tools_for_server_returns_precount() {
        let store = IndexStore::open(None).await.unwrap();
        store.index_tool(&tool("a", "fs", "a")).await.unwrap();
        store.index_tool(&tool("b", "fs", "b")).await.unwrap();
        let removed = store.remove_tools_for_server("fs").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_all_tools().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cooccurrence_pairs_never_duplicate_in_reverse_order() {
        let store = IndexStore::open(None).await.unwrap();
        store.record_cooccurrence("fs:read_file", "github:list_issues").await.unwrap();
        store.record_cooccurrence("github:list_issues", "fs:read_file").await.unwrap();
        let related = store.get_related_tools("fs:read_file", 1, 10).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].count, 2);
    }

    #[tokio::test]
    async fn record_cooccurrences_generates_all_pairs_once() {
        let store = IndexStore::open(None).await.unwrap();
        let keys = vec!["a:x".to_string(), "b:y".to_string(), "c:z".to_string()];
        store.record_cooccurrences(&keys).await.unwrap();
        for k in &keys {
            let related = store.get_related_tools(k, 1, 10).await.unwrap();
            assert_eq!(related.len(), 2);
        }
    }

    #[tokio::test]
    async fn clear_cooccurrences_empties_store_and_reports_precount() {
        let store = IndexStore::open(None).await.unwrap();
        store.record_cooccurrence("a:x", "b:y").await.unwrap();
        let cleared = store.clear_cooccurrences().await.unwrap();
        assert_eq!(cleared, 1);
        assert!(store.get_related_tools("a:x", 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn semantic_search_ranks_by_cosine_similarity() {
        let store = IndexStore::open(None).await.unwrap();
        store.index_tool(&tool("a", "srv", "a")).await.unwrap();
        store.index_tool(&tool("b", "srv", "b")).await.unwrap();
        store.update_embedding("a", "srv", &[1.0, 0.0]).await.unwrap();
        store.update_embedding("b", "srv", &[0.0, 1.0]).await.unwrap();

        let results = store.search_semantic(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results[0].tool.name, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn suggested_bundles_exclude_input_set() {
        let store = IndexStore::open(None).await.unwrap();
        store.record_cooccurrence("a:x", "b:y").await.unwrap();
        store.record_cooccurrence("a:x", "c:z").await.unwrap();
        let bundles = store
            .get_suggested_bundles(&["a:x".to_string()], 1, 10)
            .await
            .unwrap();
        let names: Vec<_> = bundles.iter().map(|b| b.qualified_name.clone()).collect();
        assert!(names.contains(&"b:y".to_string()));
        assert!(names.contains(&"c:z".to_string()));
        assert!(!names.contains(&"a:x".to_string()));
    }
}

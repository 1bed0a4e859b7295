//! Pure detail-level shaping (§4.8, §9): L0 is name + server key, L1
//! adds description, L2 adds the input schema. `DetailLevel`'s
//! declaration order is its ordering, so this is a single comparison
//! rather than a three-way match.

use serde_json::{json, Value};

use toolmesh_core::{DetailLevel, IndexedTool};

/// `live_schema`, when given, overrides `tool.input_schema` at L2 — the
/// caller looks this up fresh from the Cataloger (§4.8) since the index
/// snapshot can lag between refresh cycles.
pub fn shape_tool(
    tool: &IndexedTool,
    detail: DetailLevel,
    requires_confirmation: bool,
    live_schema: Option<Value>,
) -> Value {
    let mut shaped = json!({
        "name": tool.name,
        "serverKey": tool.server_key,
    });

    if requires_confirmation {
        shaped["requiresConfirmation"] = json!(true);
    }
    if detail >= DetailLevel::L1 {
        shaped["description"] = json!(tool.description);
    }
    if detail >= DetailLevel::L2 {
        shaped["inputSchema"] = live_schema.unwrap_or_else(|| tool.input_schema.clone());
    }

    shaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tool() -> IndexedTool {
        IndexedTool {
            id: 1,
            name: "read_file".to_string(),
            description: Some("Reads a file".to_string()),
            input_schema: json!({"type": "object"}),
            server_key: "fs".to_string(),
            schema_hash: "abc".to_string(),
            embedding: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn l0_omits_description_and_schema() {
        let shaped = shape_tool(&tool(), DetailLevel::L0, false, None);
        assert!(shaped.get("description").is_none());
        assert!(shaped.get("inputSchema").is_none());
        assert!(shaped.get("requiresConfirmation").is_none());
    }

    #[test]
    fn l1_adds_description_only() {
        let shaped = shape_tool(&tool(), DetailLevel::L1, false, None);
        assert!(shaped.get("description").is_some());
        assert!(shaped.get("inputSchema").is_none());
    }

    #[test]
    fn l2_adds_schema_too() {
        let shaped = shape_tool(&tool(), DetailLevel::L2, true, None);
        assert!(shaped.get("description").is_some());
        assert!(shaped.get("inputSchema").is_some());
        assert_eq!(shaped["requiresConfirmation"], json!(true));
    }

    #[test]
    fn l2_prefers_live_schema_over_indexed_snapshot() {
        let shaped = shape_tool(
            &tool(),
            DetailLevel::L2,
            false,
            Some(json!({"type": "object", "properties": {"path": {"type": "string"}}})),
        );
        assert_eq!(shaped["inputSchema"]["properties"]["path"]["type"], json!("string"));
    }
}

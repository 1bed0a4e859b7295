//! Glob-based tool policy: block > confirm > allow > deny-by-default, plus
//! one-shot confirmation tokens.
//!
//! The pending-confirmation map is a `(server_key, tool_name) -> token`
//! table guarded by `parking_lot::Mutex`: every operation is O(1) pure
//! bookkeeping with no `.await` inside the critical section, so a
//! blocking mutex is the right fit and avoids a lock held across a
//! suspension point.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOKEN_TTL: Duration = Duration::from_secs(5 * 60);
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("malformed policy pattern \"{0}\": expected \"<server-glob>:<tool-glob>\"")]
    MalformedPattern(String),
}

/// One decision `evaluate_policy` can return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow { reason: String },
    Block { reason: String },
    Confirm {
        reason: String,
        confirmation_token: String,
    },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// What `get_tool_visibility` returns: whether a tool should even be
/// listed, and whether invoking it needs a confirmation round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVisibility {
    pub visible: bool,
    pub requires_confirmation: bool,
}

/// A single `<server-glob>:<tool-glob>` pattern, each side either `*` or
/// a literal. Parsed eagerly so malformed patterns are rejected once
/// instead of silently never matching inside a hot loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    server: GlobSide,
    tool: GlobSide,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GlobSide {
    Any,
    Literal(String),
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let mut parts = raw.splitn(2, ':');
        let server = parts.next().ok_or_else(|| PolicyError::MalformedPattern(raw.to_string()))?;
        let tool = parts.next().ok_or_else(|| PolicyError::MalformedPattern(raw.to_string()))?;
        if tool.contains(':') {
            return Err(PolicyError::MalformedPattern(raw.to_string()));
        }
        Ok(Self {
            server: GlobSide::from(server),
            tool: GlobSide::from(tool),
        })
    }

    fn matches(&self, server_key: &str, tool_name: &str) -> bool {
        self.server.matches(server_key) && self.tool.matches(tool_name)
    }
}

impl GlobSide {
    fn from(s: &str) -> Self {
        if s == "*" {
            GlobSide::Any
        } else {
            GlobSide::Literal(s.to_string())
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            GlobSide::Any => true,
            GlobSide::Literal(lit) => lit == value,
        }
    }
}

/// `block`/`confirm`/`allow` pattern lists, already parsed. Malformed
/// patterns in the raw config are dropped with a `tracing::warn!` at
/// construction time (per §7 "configuration error ... surfaced
/// synchronously": `PolicyConfig::parse` returns the error list so the
/// caller can decide whether to treat it as fatal).
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub block: Vec<Pattern>,
    pub confirm: Vec<Pattern>,
    pub allow: Vec<Pattern>,
}

impl PolicyConfig {
    /// Parses all three pattern lists, returning both the config that
    /// resulted from the patterns that parsed and every parse error
    /// encountered (callers decide whether any error is fatal).
    pub fn parse(
        block: &[String],
        confirm: &[String],
        allow: &[String],
    ) -> (Self, Vec<PolicyError>) {
        let mut errors = Vec::new();
        let parse_list = |raw: &[String], errors: &mut Vec<PolicyError>| -> Vec<Pattern> {
            raw.iter()
                .filter_map(|p| match Pattern::parse(p) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "dropping malformed policy pattern");
                        errors.push(e);
                        None
                    }
                })
                .collect()
        };
        let config = Self {
            block: parse_list(block, &mut errors),
            confirm: parse_list(confirm, &mut errors),
            allow: parse_list(allow, &mut errors),
        };
        (config, errors)
    }

    fn matches_any(patterns: &[Pattern], server_key: &str, tool_name: &str) -> bool {
        patterns.iter().any(|p| p.matches(server_key, tool_name))
    }
}

struct PendingEntry {
    server_key: String,
    tool_name: String,
    created_at: DateTime<Utc>,
}

impl PendingEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at)
            > chrono::Duration::from_std(TOKEN_TTL).unwrap()
    }
}

/// The policy engine: pattern lists plus the process-wide (but
/// explicitly constructed, not global) pending-confirmation map.
/// Independent instances are fully isolated, so tests can construct as
/// many as they like without interfering with each other.
pub struct PolicyEngine {
    config: PolicyConfig,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// §4.2 precedence, first-match wins: block > confirm > allow >
    /// deny-by-default.
    pub fn evaluate_policy(
        &self,
        server_key: &str,
        tool_name: &str,
        confirmation_token: Option<&str>,
    ) -> Decision {
        if PolicyConfig::matches_any(&self.config.block, server_key, tool_name) {
            return Decision::Block {
                reason: format!("tool \"{server_key}:{tool_name}\" is blocked by policy"),
            };
        }

        if PolicyConfig::matches_any(&self.config.confirm, server_key, tool_name) {
            if let Some(token) = confirmation_token {
                if self.validate_confirmation_token(token, server_key, tool_name) {
                    return Decision::Allow {
                        reason: "confirmation token validated".to_string(),
                    };
                }
            }
            let token = self.create_confirmation_token(server_key, tool_name);
            return Decision::Confirm {
                reason: format!("tool \"{server_key}:{tool_name}\" requires confirmation"),
                confirmation_token: token,
            };
        }

        if PolicyConfig::matches_any(&self.config.allow, server_key, tool_name) {
            return Decision::Allow {
                reason: "matched allow list".to_string(),
            };
        }

        Decision::Block {
            reason: format!(
                "Tool \"{server_key}:{tool_name}\" on server \"{server_key}\" is not in the allow list"
            ),
        }
    }

    /// Same precedence as `evaluate_policy`, shaped for discovery
    /// surfaces instead of execution. Never consumes or mints tokens.
    pub fn get_tool_visibility(&self, server_key: &str, tool_name: &str) -> ToolVisibility {
        if PolicyConfig::matches_any(&self.config.block, server_key, tool_name) {
            return ToolVisibility {
                visible: false,
                requires_confirmation: false,
            };
        }
        if PolicyConfig::matches_any(&self.config.confirm, server_key, tool_name) {
            return ToolVisibility {
                visible: true,
                requires_confirmation: true,
            };
        }
        if PolicyConfig::matches_any(&self.config.allow, server_key, tool_name) {
            return ToolVisibility {
                visible: true,
                requires_confirmation: false,
            };
        }
        ToolVisibility {
            visible: false,
            requires_confirmation: false,
        }
    }

    /// Mints a fresh token, inserts it, and sweeps everything older than
    /// `TOKEN_TTL` while the lock is held (cheap: O(n) over a map that is
    /// never large in practice).
    pub fn create_confirmation_token(&self, server_key: &str, tool_name: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex_encode(&bytes);

        let now = Utc::now();
        let mut pending = self.pending.lock();
        pending.retain(|_, entry| !entry.is_expired(now));
        pending.insert(
            token.clone(),
            PendingEntry {
                server_key: server_key.to_string(),
                tool_name: tool_name.to_string(),
                created_at: now,
            },
        );
        token
    }

    /// Single-use: removes the entry on a successful match so the same
    /// token never validates twice. Any mismatch (wrong key, wrong tool,
    /// expired, absent) leaves the map untouched and returns false.
    pub fn validate_confirmation_token(
        &self,
        token: &str,
        server_key: &str,
        tool_name: &str,
    ) -> bool {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        let matches = pending.get(token).is_some_and(|entry| {
            !entry.is_expired(now) && entry.server_key == server_key && entry.tool_name == tool_name
        });
        if matches {
            pending.remove(token);
        }
        matches
    }

    /// Number of unexpired pending confirmations. Test/diagnostic hook.
    pub fn pending_count(&self) -> usize {
        let now = Utc::now();
        self.pending
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(block: &[&str], confirm: &[&str], allow: &[&str]) -> PolicyEngine {
        let to_strings = |s: &[&str]| s.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let (config, errors) = PolicyConfig::parse(&to_strings(block), &to_strings(confirm), &to_strings(allow));
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        PolicyEngine::new(config)
    }

    #[test]
    fn block_wins_regardless_of_confirm_and_allow() {
        let e = engine(&["fs:write_file"], &["fs:write_file"], &["*:*"]);
        assert!(matches!(
            e.evaluate_policy("fs", "write_file", None),
            Decision::Block { .. }
        ));
    }

    #[test]
    fn deny_by_default_when_nothing_matches() {
        let e = engine(&[], &[], &[]);
        assert!(matches!(
            e.evaluate_policy("fs", "read_file", None),
            Decision::Block { .. }
        ));
    }

    #[test]
    fn deny_by_default_reason_names_server_and_tool() {
        let e = engine(&[], &[], &[]);
        let decision = e.evaluate_policy("fs", "read_file", None);
        let reason = match decision {
            Decision::Block { reason } => reason,
            other => panic!("expected Block, got {other:?}"),
        };
        assert_eq!(
            reason,
            "Tool \"fs:read_file\" on server \"fs\" is not in the allow list"
        );
    }

    #[test]
    fn allow_glob_permits() {
        let e = engine(&[], &[], &["fs:*"]);
        assert!(e.evaluate_policy("fs", "read_file", None).is_allow());
    }

    #[test]
    fn confirm_then_allow_with_token() {
        let e = engine(&[], &["fs:write_file"], &["*:*"]);
        let decision = e.evaluate_policy("fs", "write_file", None);
        let token = match decision {
            Decision::Confirm {
                confirmation_token, ..
            } => confirmation_token,
            other => panic!("expected confirm, got {other:?}"),
        };
        assert_eq!(token.len(), 64);

        let allowed = e.evaluate_policy("fs", "write_file", Some(&token));
        assert!(allowed.is_allow());

        // Single-use: re-presenting the same token re-enters confirm.
        let again = e.evaluate_policy("fs", "write_file", Some(&token));
        assert!(matches!(again, Decision::Confirm { .. }));
    }

    #[test]
    fn token_does_not_validate_for_different_tool() {
        let e = engine(&[], &[], &[]);
        let token = e.create_confirmation_token("fs", "write_file");
        assert!(!e.validate_confirmation_token(&token, "fs", "read_file"));
        assert!(!e.validate_confirmation_token(&token, "github", "write_file"));
        assert!(e.validate_confirmation_token(&token, "fs", "write_file"));
    }

    #[test]
    fn malformed_patterns_never_match() {
        let (config, errors) = PolicyConfig::parse(&[], &[], &["no-colon-here".to_string()]);
        assert_eq!(errors.len(), 1);
        let e = PolicyEngine::new(config);
        assert!(matches!(
            e.evaluate_policy("fs", "read_file", None),
            Decision::Block { .. }
        ));
    }

    #[test]
    fn visibility_mirrors_precedence() {
        let e = engine(&["fs:secret"], &["fs:write_file"], &["fs:read_file"]);
        assert_eq!(
            e.get_tool_visibility("fs", "secret"),
            ToolVisibility {
                visible: false,
                requires_confirmation: false
            }
        );
        assert_eq!(
            e.get_tool_visibility("fs", "write_file"),
            ToolVisibility {
                visible: true,
                requires_confirmation: true
            }
        );
        assert_eq!(
            e.get_tool_visibility("fs", "read_file"),
            ToolVisibility {
                visible: true,
                requires_confirmation: false
            }
        );
        assert_eq!(
            e.get_tool_visibility("fs", "unlisted"),
            ToolVisibility {
                visible: false,
                requires_confirmation: false
            }
        );
    }

    #[test]
    fn expired_tokens_never_validate() {
        let e = engine(&[], &[], &[]);
        let token = e.create_confirmation_token("fs", "write_file");
        {
            let mut pending = e.pending.lock();
            let entry = pending.get_mut(&token).unwrap();
            entry.created_at = Utc::now() - chrono::Duration::minutes(6);
        }
        assert!(!e.validate_confirmation_token(&token, "fs", "write_file"));
    }
}

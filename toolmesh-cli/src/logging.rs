//! Tracing setup. Grounded on the teacher CLI's
//! `init_simple_tracing`/`init_mcp_stdio_logging` split: stdio-transport
//! commands (`mcp`, `proxy`) must never let a log line land on stdout,
//! since stdout is reserved exclusively for MCP JSON-RPC frames, so
//! those force a stderr writer and a quieter default level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn env_filter(log_level: Option<&str>, default: &str) -> EnvFilter {
    match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| {
            eprintln!("invalid log level '{level}', falling back to '{default}'");
            EnvFilter::new(default.to_string())
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default.to_string())),
    }
}

/// For `serve`/`status`/`config`: logs to stdout at `info` by default.
pub fn init_default(log_level: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level, "info"))
        .init();
    Ok(())
}

/// For `mcp`/`proxy`: logs to stderr only, `error` by default, since
/// stdout carries the JSON-RPC stream these commands speak.
pub fn init_stdio_safe(log_level: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level, "error"))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

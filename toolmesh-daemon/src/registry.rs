//! The daemon registry file: `{daemonId, endpoint, pid, startedAt,
//! version?, configHash?, sharedSecret?}`, one JSON file per config
//! hash (or a default scope), owner-only permissions on POSIX.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DaemonError, DaemonResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(rename = "daemonId")]
    pub daemon_id: Uuid,
    pub endpoint: String,
    pub pid: u32,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "configHash")]
    pub config_hash: Option<String>,
    #[serde(default, rename = "sharedSecret")]
    pub shared_secret: Option<String>,
}

/// Ensures `daemon_dir` exists with `0700` permissions. A no-op on
/// non-Unix targets beyond the directory creation itself.
pub fn ensure_daemon_dir(daemon_dir: &str) -> DaemonResult<()> {
    std::fs::create_dir_all(daemon_dir).map_err(|source| DaemonError::DaemonDir {
        path: daemon_dir.to_string(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(daemon_dir, std::fs::Permissions::from_mode(0o700)).map_err(
            |source| DaemonError::DaemonDir {
                path: daemon_dir.to_string(),
                source,
            },
        )?;
    }

    Ok(())
}

pub fn registry_path(daemon_dir: &str, config_hash: Option<&str>) -> PathBuf {
    let file_name = match config_hash {
        Some(hash) => format!("registry-{hash}.json"),
        None => "registry.json".to_string(),
    };
    Path::new(daemon_dir).join(file_name)
}

/// Writes the registry entry, setting `0600` permissions on POSIX.
pub fn write_registry(path: &Path, entry: &RegistryEntry) -> DaemonResult<()> {
    let body = serde_json::to_string_pretty(entry)?;
    std::fs::write(path, body)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

pub fn read_registry(path: &Path) -> DaemonResult<Option<RegistryEntry>> {
    match std::fs::read_to_string(path) {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(DaemonError::Io(err)),
    }
}

pub fn delete_registry(path: &Path) -> DaemonResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(DaemonError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> RegistryEntry {
        RegistryEntry {
            daemon_id: Uuid::new_v4(),
            endpoint: "/tmp/toolmesh/daemon.sock".to_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
            version: Some("0.1.0".to_string()),
            config_hash: Some("abc123".to_string()),
            shared_secret: None,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        ensure_daemon_dir(dir.path().to_str().unwrap()).unwrap();
        let path = registry_path(dir.path().to_str().unwrap(), Some("abc123"));
        let entry = sample_entry();
        write_registry(&path, &entry).unwrap();

        let read_back = read_registry(&path).unwrap().unwrap();
        assert_eq!(read_back, entry);
    }

    #[test]
    fn missing_registry_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(dir.path().to_str().unwrap(), None);
        assert!(read_registry(&path).unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(dir.path().to_str().unwrap(), None);
        delete_registry(&path).unwrap();
        delete_registry(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn registry_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(dir.path().to_str().unwrap(), None);
        write_registry(&path, &sample_entry()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

//! `toolmesh status`: reports whether a daemon is registered for this
//! configuration and whether it's actually reachable, without disturbing
//! it.

use std::path::PathBuf;

use anyhow::Result;

use toolmesh_config::ConfigLoader;
use toolmesh_daemon::{read_registry, registry_path, Endpoint};

use crate::runtime::config_hash;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = ConfigLoader::new().load(config_path.as_ref())?;
    let hash = config_hash(&config);

    let path = registry_path(&config.daemon.daemon_dir, hash.as_deref());
    match read_registry(&path)? {
        None => {
            println!("no daemon registered at {}", path.display());
        }
        Some(entry) => {
            let endpoint = Endpoint::parse(&entry.endpoint)?;
            let reachable = endpoint.probe().await;
            println!("daemon {}", entry.daemon_id);
            println!("  endpoint:  {}", endpoint.display());
            println!("  pid:       {}", entry.pid);
            println!("  started:   {}", entry.started_at.to_rfc3339());
            println!("  version:   {}", entry.version.as_deref().unwrap_or("unknown"));
            println!("  reachable: {}", reachable);
            if !reachable {
                println!("  (registry entry looks stale; `toolmesh serve` will replace it)");
            }
        }
    }

    Ok(())
}

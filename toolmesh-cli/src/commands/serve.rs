use std::path::PathBuf;

use anyhow::Result;
use std::sync::Arc;

use toolmesh_config::ConfigLoader;
use toolmesh_daemon::DaemonServer;

use crate::runtime::{config_hash, Runtime};

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = ConfigLoader::new().load(config_path.as_ref())?;
    let hash = config_hash(&config);

    let runtime = Runtime::build(&config).await?;
    runtime.refresher.start();

    let server = Arc::new(DaemonServer::new(
        config.daemon.clone(),
        runtime.tools.clone(),
        config.find_tools.clone(),
    ));

    let result = server
        .run(hash, Some(env!("CARGO_PKG_VERSION").to_string()))
        .await;

    runtime.shutdown().await;
    result.map_err(anyhow::Error::from)
}

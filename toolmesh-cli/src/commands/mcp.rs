//! `toolmesh mcp`: a single MCP session spoken directly over stdio, with
//! no daemon in between. Grounded on the teacher's `McpServe` stdio loop
//! (read a line, dispatch, write a line) but against `SessionServer`
//! rather than the teacher's task executor.

use std::path::PathBuf;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use toolmesh_config::ConfigLoader;
use toolmesh_session::SessionServer;

use crate::runtime::Runtime;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = ConfigLoader::new().load(config_path.as_ref())?;
    let runtime = Runtime::build(&config).await?;
    let session = SessionServer::new(runtime.tools.clone(), config.find_tools.clone());

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = session.handle_line(&line).await {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    runtime.shutdown().await;
    Ok(())
}

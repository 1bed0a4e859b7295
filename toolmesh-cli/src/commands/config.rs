//! `toolmesh config`: inspection utilities that never touch a daemon or
//! an upstream connection.

use std::path::PathBuf;

use anyhow::Result;

use toolmesh_config::{ConfigLoader, ToolmeshConfig};

pub fn validate(config_path: PathBuf) -> Result<()> {
    match ConfigLoader::new().from_file(&config_path) {
        Ok(_) => {
            println!("ok");
            Ok(())
        }
        Err(err) => {
            println!("invalid: {err}");
            Err(err.into())
        }
    }
}

pub fn sample() -> Result<()> {
    print!("{}", ToolmeshConfig::generate_sample());
    Ok(())
}

// scrubscan/src/commands/container.rs
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use scrubscan_core::{connect_store, ensure_container};

use crate::cli::ContainerCommand;

pub async fn run_container(config_path: Option<&Path>, command: &ContainerCommand) -> Result<()> {
    let config = super::load_config(config_path)?;
    let object_store = connect_store(&config).await?;

    match command {
        ContainerCommand::Create { name } => {
            let container = ensure_container(&object_store, name).await?;
            info!("Container '{}' is ready in the {} store.", container.name, object_store.kind());
            println!("{}", container.name);
        }
        ContainerCommand::Remove { name } => {
            object_store
                .remove_container(name)
                .await
                .with_context(|| format!("Failed to remove container '{}'", name))?;
            info!("Removed container '{}' from the {} store.", name, object_store.kind());
        }
    }
    Ok(())
}

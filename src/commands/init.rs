use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its `channels` subdirectory and an initial `config.json` with
/// default settings. Running it against an existing home leaves its `config.json` alone.
///
/// # Arguments
/// - `translyzer_home` - The directory that will be the root of data directory, e.g.
///   `$HOME/translyzer`
///
/// # Errors
/// - Returns an error if any file operations fail, or if an existing `config.json` is invalid.
pub async fn init(translyzer_home: &Path) -> Result<Out<()>> {
    let config = Config::create(translyzer_home)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Translyzer is set up in {}. Point your workers at the mailboxes listed in {}",
        config.root().display(),
        config.config_path().display()
    )
    .into())
}

//! `tilejson`: print the TileJSON document for an archive.

use tilevault::config::ConfigFile;
use tilevault::TileJson;

use super::common::open_session;
use crate::error::CliError;

/// Run the tilejson command.
pub async fn run(source: &str, tiles_url: &str, config: &ConfigFile) -> Result<(), CliError> {
    let session = open_session(source, config).await?;
    let header = session.header().await?;
    let metadata = session.metadata().await?;

    let document = TileJson::build(session.name(), header, &metadata, tiles_url);
    let text = serde_json::to_string_pretty(&document)
        .map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

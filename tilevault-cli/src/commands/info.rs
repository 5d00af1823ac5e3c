//! `info`: print an archive's header and metadata summary.

use tilevault::archive::Header;
use tilevault::config::ConfigFile;
use tilevault::ArchiveSession;

use super::common::open_session;
use crate::error::CliError;

/// Run the info command.
pub async fn run(source: &str, config: &ConfigFile) -> Result<(), CliError> {
    let session = open_session(source, config).await?;
    let header = session.header().await?;

    println!("Archive:        {}", session.name());
    println!("State:          {}", session.state());
    print_header(header);
    println!("Root entries:   {}", session.root_entries().await?);

    print_metadata(&session).await;
    Ok(())
}

fn print_header(header: &Header) {
    let b = &header.bounds;
    let c = &header.center;
    println!("Version:        {}", header.version);
    println!("Tile type:      {}", header.tile_type.format().unwrap_or("unknown"));
    println!(
        "Compression:    tiles={} internal={}",
        header.tile_compression, header.internal_compression
    );
    println!("Zoom:           {}..={}", header.min_zoom, header.max_zoom);
    println!(
        "Bounds:         {:.6},{:.6},{:.6},{:.6}",
        b.min_lon, b.min_lat, b.max_lon, b.max_lat
    );
    println!("Center:         {:.6},{:.6} z{}", c.lon, c.lat, c.zoom);
    println!(
        "Tiles:          {} addressed, {} entries, {} unique",
        header.addressed_tiles, header.tile_entries, header.tile_contents
    );
    println!("Clustered:      {}", header.clustered);
}

async fn print_metadata(session: &ArchiveSession) {
    match session.metadata().await {
        Ok(metadata) => {
            if let Some(name) = metadata.name() {
                println!("Name:           {}", name);
            }
            if let Some(attribution) = metadata.attribution() {
                println!("Attribution:    {}", attribution);
            }
            if let Some(layers) = metadata.vector_layers() {
                let ids: Vec<&str> = layers
                    .iter()
                    .filter_map(|layer| layer.get("id").and_then(|id| id.as_str()))
                    .collect();
                println!("Vector layers:  {}", ids.join(", "));
            }
        }
        // Header-level info is still useful without metadata.
        Err(e) => {
            eprintln!("Warning: metadata unavailable: {}", e);
        }
    }
}

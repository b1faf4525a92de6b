//! Local index overview.
//!
//! Prints the alias, the name space it points at, record counts per name
//! space and the on-disk size. Used by `relidx stats` to confirm a rebuild
//! or sync actually landed.

use anyhow::Result;

use related_index_core::index_client::IndexClient;

use crate::config::Config;
use crate::sqlite_index::INDEX_FILE;

/// Run the stats command against the local index and print a summary.
pub async fn run_stats(config: &Config, index: &IndexClient) -> Result<()> {
    let engine = index.engine();
    let live = index.live_namespace().await?;
    let live_count = index.live_count().await?;
    let namespaces = engine.list_namespaces().await?;

    let db_path = config.index.dir.join(INDEX_FILE);
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Related Index: Local Index Stats");
    println!("================================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Role:        {}", config.replica.role);
    println!("  Daily slot:  {} UTC", config.replica.slot());
    println!();
    println!("  Alias:       {}", index.alias());
    println!("  Live:        {}", live.as_deref().unwrap_or("(none)"));
    println!("  Records:     {}", live_count);

    if !namespaces.is_empty() {
        println!();
        println!("  Namespaces:");
        println!("  {:<48} {:>8}", "NAME", "RECORDS");
        println!("  {}", "-".repeat(66));
        for name in &namespaces {
            let count = engine.count(name).await?;
            let marker = if live.as_deref() == Some(name.as_str()) {
                "live"
            } else {
                ""
            };
            println!("  {:<48} {:>8}   {}", name, count, marker);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}

use anyhow::{Context, Result};
use hearth_storage::{BlobStore, StoredBlob};
use std::path::Path;

use crate::cli::BlobCommands;

pub async fn handle(cmd: BlobCommands, blobs: &BlobStore) -> Result<()> {
    match cmd {
        BlobCommands::Put { file, mime } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let stored = blobs
                .store(&content, mime.as_deref(), file_name(&file))
                .await?;
            print_stored(&stored);
        }
        BlobCommands::PutImage { file } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let image = image::load_from_memory(&content)
                .with_context(|| format!("{} is not a supported image", file.display()))?;
            let stored = blobs.store_image(&image, file_name(&file)).await?;
            print_stored(&stored);
        }
        BlobCommands::Get { path, out } => {
            let content = blobs.retrieve(&path).await?;
            match out {
                Some(out) => {
                    tokio::fs::write(&out, &content)
                        .await
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    println!("✓ Wrote {} bytes to {}", content.len(), out.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&content)?;
                }
            }
        }
        BlobCommands::Rm { path } => {
            blobs.delete(&path).await?;
            println!("✓ Deleted {}", path);
        }
        BlobCommands::Stats { json } => {
            let stats = blobs.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Root:  {}", blobs.root().display());
                println!("Files: {}", stats.file_count);
                println!("Size:  {}", format_bytes(stats.total_bytes));
            }
        }
        BlobCommands::Cleanup => {
            let cleaned = blobs.cleanup_temp_files().await?;
            println!("✓ Removed {} temp file(s)", cleaned);
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn print_stored(stored: &StoredBlob) {
    if stored.was_deduplicated {
        println!("✓ Already stored: {}", stored.path);
    } else {
        println!(
            "✓ Stored {} ({})",
            stored.path,
            format_bytes(stored.byte_size)
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

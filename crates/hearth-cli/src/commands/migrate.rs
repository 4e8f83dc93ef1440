use anyhow::Result;
use hearth_storage::Storage;

pub async fn handle(storage: &Storage, status_only: bool) -> Result<()> {
    if status_only {
        return show_status(storage).await;
    }

    // Opening the storage already migrated; this reports what is left
    let report = storage.migrate().await?;
    if report.applied.is_empty() {
        println!("✓ Database is up to date ({} migrations)", report.skipped.len());
    } else {
        for id in &report.applied {
            println!("  Applied {}", id);
        }
        println!("✓ Applied {} migration(s)", report.applied.len());
    }

    Ok(())
}

async fn show_status(storage: &Storage) -> Result<()> {
    let status = storage.migration_status().await?;

    println!("Applied:");
    if status.applied.is_empty() {
        println!("  (none)");
    }
    for entry in &status.applied {
        match entry.applied_at {
            Some(at) => println!("  {}  {}", entry.identifier, at),
            None => println!("  {}  (unknown time)", entry.identifier),
        }
    }

    if !status.pending.is_empty() {
        println!("\nPending:");
        for id in &status.pending {
            println!("  {}", id);
        }
    }

    if !status.unknown.is_empty() {
        println!("\nUnknown (applied by a newer version):");
        for id in &status.unknown {
            println!("  {}", id);
        }
    }

    Ok(())
}

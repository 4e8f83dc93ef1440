use anyhow::Result;
use hearth_storage::{ResetOptions, Storage};

pub async fn handle(storage: &Storage, force: bool, clear_ledger: bool) -> Result<()> {
    if !force {
        print!("Erase all inventory data? This cannot be undone. [y/N] ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let report = storage.reset_with(ResetOptions { clear_ledger }).await?;

    println!(
        "✓ Cleared {} table(s), {} row(s) deleted",
        report.tables_cleared.len(),
        report.rows_deleted
    );
    if report.ledger_cleared {
        println!("  Migration history cleared");
    }
    println!("  Attachment files were kept; run 'hearth blob stats' to see them");

    Ok(())
}

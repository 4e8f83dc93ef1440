use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Local storage for your home inventory", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config)
    #[arg(long, global = true, env = "HEARTH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending schema migrations
    Migrate {
        /// Only show applied and pending migrations
        #[arg(long)]
        status: bool,
    },

    /// Manage stored attachments
    #[command(subcommand)]
    Blob(BlobCommands),

    /// Erase all inventory data (attachment files are kept)
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,

        /// Also forget which migrations were applied
        #[arg(long)]
        clear_ledger: bool,
    },
}

#[derive(Subcommand)]
pub enum BlobCommands {
    /// Store a file
    Put {
        /// File to store
        file: PathBuf,

        /// MIME type, used when the file name has no extension
        #[arg(long)]
        mime: Option<String>,
    },

    /// Re-encode an image as JPEG and store it
    PutImage {
        /// Image file to store
        file: PathBuf,
    },

    /// Write a stored blob to a file or stdout
    Get {
        /// Relative blob path (e.g. 2024/03/0123456789abcdef.jpg)
        path: String,

        /// Output file (defaults to stdout)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Delete a stored blob
    Rm {
        /// Relative blob path
        path: String,
    },

    /// Show file count and disk usage
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove temp files left by interrupted writes
    Cleanup,
}

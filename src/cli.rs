use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "omniscan")]
#[command(author, version, about = "Media library health scanner")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the watcher, scheduler and webhook/API server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Verify every media file in a directory once and print the summary
    Scan {
        /// Directory to scan
        #[arg(required = true)]
        dir: PathBuf,

        /// Only scan the directory itself, not its subdirectories
        #[arg(long)]
        flat: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a single media file
    Check {
        /// File to check
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Generate a random secret for webhook signature verification
    GenerateSecret,
}

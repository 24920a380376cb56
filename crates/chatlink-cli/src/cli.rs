//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Base URL of the local backend service
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub backend_url: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive chat mode
    Chat,
    /// Check backend availability and exit
    Status,
    /// List friends and exit
    Friends,
    /// Add a friend and exit
    AddFriend {
        /// Username to add
        username: String,
    },
    /// Send a single message and exit
    Send {
        /// Recipient username
        #[arg(short, long)]
        to: String,
        /// Message content
        message: String,
    },
}

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_BROWSE_LIMIT: usize = 2;

#[derive(Parser)]
#[command(name = "gator")]
#[command(about = "An RSS feed aggregator", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/gator/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new user and log in as them
    Register {
        /// Name of the user
        name: String,
    },
    /// Log in as an existing user
    Login {
        /// Name of the user
        name: String,
    },
    /// List registered users
    Users,
    /// Delete all users, feeds, follows and posts
    Reset,
    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed {
        /// Display name of the feed
        name: String,
        /// URL of the RSS feed
        url: String,
    },
    /// List all feeds
    Feeds,
    /// Follow an existing feed
    Follow {
        /// URL of the feed
        url: String,
    },
    /// Stop following a feed
    Unfollow {
        /// URL of the feed
        url: String,
    },
    /// List feeds the current user follows
    Following,
    /// Show the newest posts from followed feeds
    Browse {
        /// Number of posts to show
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: usize,
    },
    /// Poll feeds forever, one feed per interval
    #[command(alias = "agg")]
    Poll {
        /// Polling interval (e.g., "30s", "1m", "1h30m"); falls back to [poll] interval
        interval: Option<String>,
    },
}

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Rewrite HLS playlists, relay media ranges and download episodes")]
#[command(version)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "FERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "FERRY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Allow an upstream media host (repeatable, added to the configured list)
    #[arg(long = "allow-host", global = true, value_name = "HOST")]
    pub allow_hosts: Vec<String>,

    /// Proxy URL for upstream requests (http://, https:// or socks5://)
    #[arg(long, global = true, env = "FERRY_PROXY")]
    pub proxy: Option<String>,

    /// Proxy username
    #[arg(long, global = true, requires = "proxy")]
    pub proxy_username: Option<String>,

    /// Proxy password
    #[arg(long, global = true, requires = "proxy")]
    pub proxy_password: Option<String>,

    /// Override the upstream User-Agent
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a playlist and print it with relative references made absolute
    Playlist {
        /// Playlist URL
        url: String,

        /// Session cookie as name=value, or a "a=1; b=2" list (repeatable)
        #[arg(long = "cookie", value_name = "COOKIE")]
        cookies: Vec<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Relay one upstream request (optionally a byte range) to a file or stdout
    Relay {
        /// Media URL
        url: String,

        /// Range header value, e.g. bytes=0-1023
        #[arg(short, long)]
        range: Option<String>,

        /// Session cookie as name=value, or a "a=1; b=2" list (repeatable)
        #[arg(long = "cookie", value_name = "COOKIE")]
        cookies: Vec<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download one episode to the output directory
    Download {
        /// Source URL (single file or HLS playlist)
        source_url: String,

        /// Anime title, used for the file name
        #[arg(long)]
        anime: String,

        /// Anime identifier (defaults to the title)
        #[arg(long)]
        anime_id: Option<String>,

        /// Episode identifier
        #[arg(long)]
        episode_id: String,

        /// Episode title
        #[arg(long)]
        episode_title: Option<String>,

        /// Episode number
        #[arg(short = 'n', long)]
        number: Option<u32>,

        /// Session cookie as name=value, or a "a=1; b=2" list (repeatable)
        #[arg(long = "cookie", value_name = "COOKIE")]
        cookies: Vec<String>,

        /// Output directory (overrides configuration)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Serve the local HTTP API for a playback client
    Serve {
        /// Address to listen on (overrides configuration)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Maximum concurrent downloads (overrides configuration)
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,

        /// Output directory (overrides configuration)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,

        /// Write the default configuration to the config file
        #[arg(long)]
        reset: bool,
    },
}

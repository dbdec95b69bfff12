//! Command-line / environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::paths::default_transcript_root;

pub const DEFAULT_CACHE_CAPACITY: usize = 10;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_PERMISSION_TIMEOUT_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Parser)]
#[command(name = "relaydeck", version, about = "Session routing core for assistant chat views")]
pub struct Args {
    /// Address the view WebSocket endpoint listens on
    #[arg(long, env = "RELAYDECK_BIND", default_value = "127.0.0.1:4010")]
    pub bind: SocketAddr,

    /// Assistant backend WebSocket URL
    #[arg(long, env = "RELAYDECK_BACKEND_URL", default_value = "ws://127.0.0.1:3001/ws")]
    pub backend_url: String,

    /// Data directory (logs, staged attachments)
    #[arg(long, env = "RELAYDECK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Root directory of the assistant's transcript logs
    #[arg(long, env = "RELAYDECK_TRANSCRIPT_ROOT")]
    pub transcript_root: Option<PathBuf>,

    /// Maximum number of sessions kept resident in the cache
    #[arg(long, env = "RELAYDECK_CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Transcript records per page
    #[arg(long, env = "RELAYDECK_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    #[arg(
        long,
        env = "RELAYDECK_PERMISSION_TIMEOUT_SECS",
        default_value_t = DEFAULT_PERMISSION_TIMEOUT_SECS
    )]
    pub permission_timeout_secs: u64,

    #[arg(long, env = "RELAYDECK_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "RELAYDECK_RECONNECT_DELAY_SECS", default_value_t = 3)]
    pub reconnect_delay_secs: u64,

    #[arg(long, env = "RELAYDECK_REFRESH_DEBOUNCE_MS", default_value_t = 300)]
    pub refresh_debounce_ms: u64,

    #[arg(long, env = "RELAYDECK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Mirror log output to stderr
    #[arg(long, env = "RELAYDECK_LOG_STDERR")]
    pub log_stderr: bool,
}

/// Immutable runtime configuration shared by every component.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub backend_url: String,
    pub transcript_root: Option<PathBuf>,
    pub cache_capacity: usize,
    pub page_size: usize,
    pub permission_timeout: Duration,
    pub sweep_interval: Duration,
    pub reconnect_delay: Duration,
    pub refresh_debounce: Duration,
}

impl CoreConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            backend_url: args.backend_url.clone(),
            transcript_root: args
                .transcript_root
                .clone()
                .or_else(default_transcript_root),
            cache_capacity: args.cache_capacity.max(1),
            page_size: args.page_size.max(1),
            permission_timeout: Duration::from_secs(args.permission_timeout_secs),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
            reconnect_delay: Duration::from_secs(args.reconnect_delay_secs),
            refresh_debounce: Duration::from_millis(args.refresh_debounce_ms),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            backend_url: "ws://127.0.0.1:3001/ws".to_string(),
            transcript_root: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            page_size: DEFAULT_PAGE_SIZE,
            permission_timeout: Duration::from_secs(DEFAULT_PERMISSION_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(3),
            refresh_debounce: Duration::from_millis(300),
        }
    }
}

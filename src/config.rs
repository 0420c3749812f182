//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::engine::EngineSettings;

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "sleep-timer")]
#[command(about = "A durable sleep timer that pauses playback when time runs out")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// File holding the timer record and armed wakes
    #[arg(long, default_value = "sleep-timer-state.json")]
    pub state_file: PathBuf,

    /// Period of the repeating keepalive wake in seconds
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    pub keepalive_secs: u64,

    /// How long a handled expiration suppresses repeats, in seconds
    #[arg(long, default_value = "5")]
    pub dedup_window_secs: u64,

    /// MPRIS client used to find and pause players
    #[arg(long, default_value = "playerctl")]
    pub player_command: String,

    /// Program used for desktop notifications
    #[arg(long, default_value = "notify-send")]
    pub notify_command: String,

    /// Log notifications instead of showing them
    #[arg(long)]
    pub no_notify: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            keepalive_period_secs: self.keepalive_secs,
            dedup_window: Duration::from_secs(self.dedup_window_secs),
        }
    }
}

//! Command-line and environment configuration.

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    #[arg(long, env = "DATABASE_PATH", default_value = "data.db")]
    pub database_path: PathBuf,

    /// Operator log channel: numeric chat id or `@channel`
    #[arg(long, env = "LOG_CHANNEL_ID")]
    pub log_channel_id: Option<String>,

    /// Older name for `--log-channel-id`
    #[arg(long, env = "LOG_CHANNEL", hide = true)]
    pub log_channel: Option<String>,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 600)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Ratings fetched in parallel within one monitoring cycle
    #[arg(long, env = "MONITOR_CONCURRENCY", default_value_t = 4)]
    pub monitor_concurrency: usize,

    #[arg(long, env = "SUMMARY_HOUR_UTC", default_value_t = 13,
          value_parser = clap::value_parser!(u32).range(0..24))]
    pub summary_hour_utc: u32,

    #[arg(long, env = "API_BASE_URL", default_value = "https://hackerlab.pro")]
    pub api_base_url: String,

    #[arg(long, env = "PAGE_BASE_URL", default_value = "https://hackerlab.pro")]
    pub page_base_url: String,

    /// On-demand checks allowed per subscriber within the window
    #[arg(long, env = "CHECK_LIMIT", default_value_t = 5)]
    pub check_limit: usize,

    #[arg(long, env = "CHECK_WINDOW_SECS", default_value_t = 300)]
    pub check_window_secs: u64,

    /// Usernames one subscriber may monitor
    #[arg(long, env = "MAX_TRACKED", default_value_t = 10)]
    pub max_tracked: usize,
}

impl Args {
    /// The log channel, preferring `LOG_CHANNEL_ID`. Blank values count as unset.
    pub fn log_channel(&self) -> Option<String> {
        [&self.log_channel_id, &self.log_channel]
            .into_iter()
            .flatten()
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
            .map(str::to_string)
    }

    pub fn api_base(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid API_BASE_URL: {}", self.api_base_url))
    }

    pub fn page_base(&self) -> Result<Url> {
        Url::parse(&self.page_base_url)
            .with_context(|| format!("Invalid PAGE_BASE_URL: {}", self.page_base_url))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn check_window(&self) -> Duration {
        Duration::from_secs(self.check_window_secs)
    }
}

//! Rating Watch: hackerlab.pro rating monitor with Telegram notifications.
//!
//! Runs as a long-lived bot. Subscribers check ratings on demand and put
//! usernames on monitoring; a background poller reports every change to
//! the subscriber who tracks it.
//!
//! Background work:
//! - Monitoring cycle every `POLL_INTERVAL_SECS`
//! - Daily summary to the operator log channel at `SUMMARY_HOUR_UTC`

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use teloxide::Bot;
use tracing::info;

mod bot;
mod config;
mod handler;
mod limiter;
mod messages;
mod monitor;
mod notify;
mod source;
mod store;

use limiter::RateLimiter;
use monitor::stats::StatsCollector;
use notify::{ChannelLog, Notifier, TelegramNotifier};
use source::RateSource;
use store::TrackingStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing (structured logs)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rating_watch=info".into()),
        )
        .with_target(false)
        .init();

    info!("📈 Rating Watch v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let args = config::Args::parse();
    let api_base = args.api_base()?;
    let page_base = args.page_base()?;

    // ── Tracking Store ──────────────────────────────────────────────
    let store = Arc::new(
        TrackingStore::open(&args.database_path)
            .context("Failed to open tracking store")?
            .with_max_tracked(args.max_tracked),
    );
    let tracked = store.list_all_tracked().map(|e| e.len()).unwrap_or(0);
    info!(db = %args.database_path.display(), tracked, "📦 Tracking store ready");

    // ── Rating Source ───────────────────────────────────────────────
    let client = reqwest::Client::builder()
        .timeout(args.fetch_timeout())
        .user_agent(concat!("rating-watch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let source = Arc::new(RateSource::hackerlab(client, api_base, page_base.clone()));

    // ── Telegram ────────────────────────────────────────────────────
    let bot = Bot::new(&args.bot_token);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
    let log = Arc::new(ChannelLog::new(Arc::clone(&notifier), args.log_channel()));
    if !log.is_enabled() {
        info!("No log channel configured — operator log disabled");
    }

    // ── Monitor ─────────────────────────────────────────────────────
    let stats = Arc::new(StatsCollector::new());
    let monitor = Arc::new(monitor::Monitor::new(
        Arc::clone(&source),
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&log),
        Arc::clone(&stats),
        page_base.clone(),
        args.monitor_concurrency,
    ));
    tokio::spawn(monitor::run_monitor(monitor, args.poll_interval()));
    tokio::spawn(monitor::summary::run_summary(
        Arc::clone(&stats),
        Arc::clone(&log),
        args.summary_hour_utc,
    ));

    // ── On-demand Requests ──────────────────────────────────────────
    let limiter = Arc::new(RateLimiter::new(args.check_limit, args.check_window()));
    let handler = Arc::new(handler::OnDemandHandler::new(
        source,
        limiter,
        Arc::clone(&store),
        Arc::clone(&log),
        page_base,
    ));
    let state = Arc::new(bot::BotState::new(handler, store, Arc::clone(&log)));

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Rating Watch ready — all systems operational");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log.started().await;

    bot::run(bot, state).await;
    Ok(())
}

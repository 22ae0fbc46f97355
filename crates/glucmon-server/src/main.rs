use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use glucmon_alert::engine::{Analyzer, AnalyzerConfig};
use glucmon_notify::channels::chat::ChatAlertChannel;
use glucmon_notify::channels::discord::{DiscordOptions, DiscordSurface, DEFAULT_API_BASE};
use glucmon_notify::channels::memory::MemorySurface;
use glucmon_notify::manager::NotificationManager;
use glucmon_notify::surface::ChatSurface;
use glucmon_notify::NotificationChannel;
use glucmon_source::dexcom::DexcomShare;
use glucmon_source::session::ShareSession;
use glucmon_storage::EventStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use glucmon_server::api;
use glucmon_server::chart::{ChartRenderer, GrpcChartRenderer};
use glucmon_server::commands::{self, CommandHandler};
use glucmon_server::config::{Config, DiscordConfig};
use glucmon_server::display::{DisplayReconciler, DisplaySettings};
use glucmon_server::driver::Driver;
use glucmon_server::fetcher::Fetcher;
use glucmon_server::logging::init_tracing;
use glucmon_server::mutation::MutationHandler;
use glucmon_server::report::ReportGenerator;
use glucmon_server::state::AppState;

const DEFAULT_CONFIG_PATH: &str = "config/glucmon.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  glucmon-server [config.toml]                       Start the bot");
    eprintln!("  glucmon-server register-commands <config.toml>     Register slash commands with the guild");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("register-commands") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("register-commands requires <config.toml> argument")
            })?;
            run_register_commands(config_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args.get(1).map(|s| s.as_str()).unwrap_or(DEFAULT_CONFIG_PATH);
            run_server(config_path).await
        }
    }
}

fn discord_surface(config: &DiscordConfig) -> Result<DiscordSurface> {
    let surface = DiscordSurface::new(DiscordOptions {
        token: config.token.clone(),
        application_id: config.application_id.clone(),
        guild_id: config.guild_id.clone(),
        api_base: DEFAULT_API_BASE.to_string(),
        timeout: Duration::from_secs(config.timeout_secs),
    })?;
    Ok(surface)
}

async fn run_register_commands(config_path: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    init_tracing(&config.log)?;

    let discord = config
        .discord
        .as_ref()
        .context("register-commands requires a [discord] section")?;
    let count = discord_surface(discord)?
        .register_commands(&commands::definitions())
        .await?;
    tracing::info!(count, guild = %discord.guild_id, "Slash commands registered");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    init_tracing(&config.log)?;
    glucmon_common::id::init(1, 1);

    let tz = config.offset()?;
    tracing::info!(
        http_port = config.http.port,
        timezone = %tz,
        poll_interval_secs = config.poll_interval_secs,
        "glucmon-server starting"
    );

    let store = Arc::new(
        EventStore::connect(
            &config.database_url,
            Duration::from_secs(config.store_timeout_secs),
        )
        .await?,
    );

    let (surface, public_key): (Arc<dyn ChatSurface>, Option<Arc<String>>) = match &config.discord {
        Some(discord) => {
            let surface = discord_surface(discord)?;
            surface.ensure_channels(&config.channels.names()).await?;
            (
                Arc::new(surface) as Arc<dyn ChatSurface>,
                Some(Arc::new(discord.public_key.clone())),
            )
        }
        None => {
            tracing::warn!("No [discord] section configured. Running headless with an in-memory chat surface; interaction requests are not verified.");
            (Arc::new(MemorySurface::new()) as Arc<dyn ChatSurface>, None)
        }
    };

    let chart: Option<Arc<dyn ChartRenderer>> = match &config.chart {
        Some(chart) => Some(Arc::new(GrpcChartRenderer::new(
            &chart.endpoint,
            Duration::from_secs(chart.timeout_secs),
        )?)),
        None => {
            tracing::info!("No [chart] section configured, messages are sent without images");
            None
        }
    };

    let source = Arc::new(ShareSession::new(DexcomShare::new(
        &config.dexcom.share_url,
        &config.dexcom.account,
        &config.dexcom.password,
        Duration::from_secs(config.dexcom.timeout_secs),
    )?));

    let channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(ChatAlertChannel::new(
        surface.clone(),
        &config.channels.alerts,
    ))];
    let notifier = Arc::new(NotificationManager::new(channels));

    let analyzer = Analyzer::new(
        store.clone(),
        notifier,
        AnalyzerConfig {
            low: config.glucose.low,
            high: config.glucose.high,
            glucose_suppression: ChronoDuration::minutes(config.alarm.glucose_timeout_mins as i64),
            missing_dose_suppression: ChronoDuration::minutes(
                config.alarm.no_insulin_timeout_mins as i64,
            ),
            lookback: config.lookback(),
            slow_insulin_window: ChronoDuration::hours(
                config.alarm.slow_insulin_window_hours as i64,
            ),
        },
    );

    let display = Arc::new(DisplayReconciler::new(
        store.clone(),
        surface.clone(),
        chart.clone(),
        DisplaySettings {
            channel: config.channels.display.clone(),
            tz,
            lookback: config.lookback(),
            log_limit: config.display.log_limit,
        },
    ));
    let mutations = Arc::new(MutationHandler::new(
        store.clone(),
        display.clone(),
        config.lookback(),
    ));
    let reports = Arc::new(ReportGenerator::new(
        store.clone(),
        surface.clone(),
        chart,
        &config.channels.reports,
        tz,
        config.glucose.low,
        config.glucose.high,
    ));

    let driver = Driver::new(
        Fetcher::new(source, store.clone()),
        display,
        analyzer,
        config.poll_interval(),
        config.step_timeout(),
    );
    let driver_handle = tokio::spawn(async move { driver.run().await });

    let state = AppState {
        commands: Arc::new(CommandHandler::new(mutations, reports)),
        public_key,
        start_time: Utc::now(),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http.port).parse()?;
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(%http_addr, "Interaction endpoint listening");

    let served = axum::serve(http_listener, api::build_http_app(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await;

    driver_handle.abort();
    served?;
    tracing::info!("glucmon-server stopped");
    Ok(())
}

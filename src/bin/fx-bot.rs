// Forex Trading Assistant - Professional CLI
// Single entry point for live trading, status and journal operations

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

use forex_assist::{
    BrokerGateway, Config, Database, HedgeManager, HttpNewsFeed, Mt5Bridge, NewsCalendar,
    OrderManager, PartialProfitManager, PreFlightValidator, SignalProcessor, SignalStore,
    TradingFilters, TradingJournal, TradingMonitor,
};

#[derive(Parser)]
#[command(name = "fx-bot")]
#[command(version = "0.2.0")]
#[command(about = "Forex trading assistant over an MT5 bridge", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    /// SQLite database path
    #[arg(short, long, global = true, default_value = "fx-bot.db")]
    database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Init,

    /// System status and health checks
    Status {
        /// Show detailed system information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Run the live trading loop
    Trade {
        /// Execute signals automatically (overrides the config flag)
        #[arg(long)]
        auto: bool,
    },

    /// Close every open position and halt
    Emergency,

    /// Trading journal operations
    #[command(subcommand)]
    Journal(JournalCommands),
}

#[derive(Subcommand)]
enum JournalCommands {
    /// Aggregate performance statistics
    Stats,

    /// Most recent journal entries
    Recent {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Delete every journal entry
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging first (before config load so we can see config errors)
    let log_level = if cli.verbose { "debug" } else { "info" };
    std::env::set_var("RUST_LOG", log_level);
    tracing_subscriber::fmt::init();

    info!("🚀 fx-bot v0.2.0");
    info!("📁 Config: {}", cli.config);

    match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => {
            let _ = Config::load_or_create(&cli.config)?;
            let db = Database::new(&cli.database)?;
            db.run_migrations()?;
            info!("✅ Workspace initialized");
        }

        Commands::Status { detailed } => {
            let config = Config::from_file(&cli.config)?;
            show_status(detailed, config, &cli.database).await?;
        }

        Commands::Trade { auto } => {
            let mut config = Config::from_file(&cli.config)?;
            if auto {
                config.signals.auto_execute = true;
            }
            run_trading(config, &cli.database).await?;
        }

        Commands::Emergency => {
            let config = Config::from_file(&cli.config)?;
            run_emergency_stop(config, &cli.database).await?;
        }

        Commands::Journal(cmd) => {
            let db = Database::new(&cli.database)?;
            db.run_migrations()?;
            let journal = TradingJournal::new(db.get_connection());
            handle_journal_command(cmd, &journal)?;
        }
    }

    Ok(())
}

struct Services {
    gateway: Arc<dyn BrokerGateway>,
    db: Arc<Database>,
    journal: Arc<TradingJournal>,
    store: Arc<SignalStore>,
    orders: Arc<OrderManager>,
    filters: Arc<TradingFilters>,
    monitor: Arc<TradingMonitor>,
    config: Config,
}

/// Construct and wire every service; each gets its dependencies handed in
/// explicitly so nothing is shared through hidden globals.
async fn build_services(config: Config, db_path: &str) -> Result<Services, Box<dyn std::error::Error>> {
    let db = Arc::new(Database::new(db_path)?);
    db.run_migrations()?;

    let journal = Arc::new(TradingJournal::new(db.get_connection()));
    let store = Arc::new(SignalStore::new(db.get_connection()));

    let gateway: Arc<dyn BrokerGateway> = Arc::new(Mt5Bridge::new(config.bridge.clone()));

    let feed = Arc::new(HttpNewsFeed::new(
        config.filters.news_feed_url.clone(),
        config.bridge.request_timeout_secs,
    )?);
    let calendar = Arc::new(NewsCalendar::new(
        feed,
        config.filters.news_cache_ttl_secs,
        config.filters.high_impact_blackout_minutes,
        config.filters.medium_impact_blackout_minutes,
    ));
    let filters = Arc::new(TradingFilters::with_default_killzones(
        config.filters.clone(),
        calendar,
    ));

    let orders = Arc::new(OrderManager::new(
        Arc::clone(&gateway),
        config.risk.clone(),
        Arc::clone(&journal),
    ));
    let monitor = Arc::new(TradingMonitor::new(
        Arc::clone(&gateway),
        Arc::clone(&journal),
        Arc::clone(&db),
    ));

    Ok(Services {
        gateway,
        db,
        journal,
        store,
        orders,
        filters,
        monitor,
        config,
    })
}

async fn run_trading(config: Config, db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(config, db_path).await?;

    if let Err(e) = services.gateway.connect().await {
        error!("bridge connection failed: {e}");
        return Err(e.into());
    }

    let validator = PreFlightValidator::new(
        services.config.clone(),
        Arc::clone(&services.gateway),
        Arc::clone(&services.db),
        Arc::clone(&services.journal),
    );
    let validation = validator.validate_all(chrono::Utc::now()).await;
    validation.display();
    if !validation.passed {
        return Err("pre-flight validation failed".into());
    }

    let processor = Arc::new(SignalProcessor::new(
        Arc::clone(&services.gateway),
        Arc::clone(&services.filters),
        Arc::clone(&services.store),
        Arc::clone(&services.orders),
        services.config.signals.clone(),
    ));
    let partial = Arc::new(PartialProfitManager::new(
        Arc::clone(&services.gateway),
        services.config.partial_profit.clone(),
    ));
    let hedge = Arc::new(HedgeManager::new(
        Arc::clone(&services.gateway),
        Arc::clone(&services.orders),
        services.config.hedge.clone(),
    ));

    info!(
        auto_execute = services.config.signals.auto_execute,
        pairs = ?services.config.signals.enabled_pairs,
        "trading loop starting"
    );

    let mut tasks = tokio::task::JoinSet::new();
    {
        let processor = Arc::clone(&processor);
        tasks.spawn(async move { processor.run().await });
    }
    {
        let partial = Arc::clone(&partial);
        tasks.spawn(async move { partial.run().await });
    }
    {
        let hedge = Arc::clone(&hedge);
        tasks.spawn(async move { hedge.run().await });
    }
    {
        let monitor = Arc::clone(&services.monitor);
        tasks.spawn(async move { monitor.run().await });
    }

    tokio::signal::ctrl_c().await?;
    warn!("shutdown requested, stopping background tasks");
    tasks.shutdown().await;
    info!("✅ trading loop stopped");
    Ok(())
}

async fn run_emergency_stop(config: Config, db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(config, db_path).await?;
    services.gateway.connect().await?;

    let report = services.orders.emergency_stop().await;
    info!("closed {} position(s)", report.succeeded.len());
    if !report.failed.is_empty() {
        for (ticket, reason) in &report.failed {
            error!(ticket = *ticket, reason = %reason, "position could not be closed");
        }
        return Err("emergency stop left positions open".into());
    }
    Ok(())
}

async fn show_status(detailed: bool, config: Config, db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(config, db_path).await?;

    if let Err(e) = services.gateway.connect().await {
        warn!("bridge unreachable: {e}");
    }

    let report = services.monitor.report(chrono::Utc::now()).await;
    match &report.account {
        Some(account) => {
            info!(
                "💰 Balance {:.2} {} | equity {:.2} | free margin {:.2}",
                account.balance, account.currency, account.equity, account.free_margin
            );
            info!(
                "📊 Open positions: {} | floating PnL {:.2} | realized today {:.2}",
                report.open_positions, report.floating_pnl, report.realized_pnl_today
            );
        }
        None => warn!("no account snapshot available"),
    }

    if detailed {
        let validator = PreFlightValidator::new(
            services.config.clone(),
            Arc::clone(&services.gateway),
            Arc::clone(&services.db),
            Arc::clone(&services.journal),
        );
        validator.validate_all(chrono::Utc::now()).await.display();

        for anomaly in report.recent_anomalies {
            info!(
                "⚠️  [{}] {} {}",
                anomaly.level.as_str(),
                anomaly.message,
                anomaly.context
            );
        }
    }
    Ok(())
}

fn handle_journal_command(
    cmd: JournalCommands,
    journal: &TradingJournal,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        JournalCommands::Stats => {
            let stats = journal.statistics()?;
            info!("📒 Trades: {} | wins {} | losses {}", stats.total_trades, stats.wins, stats.losses);
            info!(
                "   Win rate {:.1}% | expectancy {:.2} | profit factor {:.2}",
                stats.win_rate * 100.0,
                stats.expectancy,
                stats.profit_factor
            );
            info!(
                "   Total PnL {:.2} | best streak {} | worst streak {}",
                stats.total_pnl, stats.best_win_streak, stats.worst_loss_streak
            );
        }
        JournalCommands::Recent { limit } => {
            for entry in journal.recent_entries(limit)? {
                info!(
                    "#{} {} {} {:.2} lots @ {:.5} [{}] pnl {}",
                    entry.ticket,
                    entry.symbol,
                    entry.direction.as_str(),
                    entry.volume,
                    entry.entry_price,
                    entry.status.as_str(),
                    entry
                        .pnl
                        .map(|p| format!("{p:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        JournalCommands::Clear { yes } => {
            if !yes {
                warn!("refusing to clear the journal without --yes");
                return Ok(());
            }
            let removed = journal.clear()?;
            info!("🗑️  {} journal entries removed", removed);
        }
    }
    Ok(())
}

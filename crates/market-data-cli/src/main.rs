mod commands;
mod composition;
mod config;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use time_service::TimeMode;

use composition::Context;
use config::EngineConfig;

#[derive(Parser)]
#[command(name = "market-data-cli", about = "Market data ingestion, storage, and replay engine")]
struct Cli {
    #[arg(long, env = "MARKET_DATA_CONFIG", default_value = "engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Symbol catalog operations: list, info, quality, delete.
    Symbol {
        #[command(subcommand)]
        action: SymbolCommand,
    },
    /// Import/export/aggregate stored data.
    Data {
        #[command(subcommand)]
        action: DataCommand,
    },
    /// Session-aware and historical aggregate queries.
    Query {
        #[command(subcommand)]
        action: QueryCommand,
    },
    /// Run a backtest session over the configured symbols and window.
    Backtest {
        #[arg(long)]
        speed: Option<f64>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Trading calendar and clock queries.
    Time {
        #[command(subcommand)]
        action: TimeCommand,
    },
}

#[derive(Subcommand)]
enum SymbolCommand {
    List,
    Info { symbol: String },
    Quality { symbol: String, interval: String },
    Delete(DeleteArgs),
    DeleteAll { symbol: String, #[arg(long)] confirm: bool },
}

#[derive(Args)]
struct DeleteArgs {
    symbol: String,
    #[arg(long)]
    interval: Option<String>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long)]
    confirm: bool,
}

#[derive(Subcommand)]
enum DataCommand {
    ImportFile {
        path: PathBuf,
        symbol: String,
        interval: String,
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    ImportApi {
        data_type: String,
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Export {
        data_type: String,
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        out: PathBuf,
    },
    Aggregate {
        symbol: String,
        from_interval: String,
        to_interval: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[derive(Subcommand)]
enum QueryCommand {
    SessionVolume { symbol: String, interval: String },
    SessionHighLow { symbol: String, interval: String },
    HistoricalHighLow { symbol: String, interval: String, start: DateTime<Utc>, end: DateTime<Utc> },
    AverageVolume { symbol: String, interval: String, start: DateTime<Utc>, end: DateTime<Utc> },
    DeltaCursor { symbol: String, interval: String },
}

#[derive(Subcommand)]
enum TimeCommand {
    Now,
    Session { date: NaiveDate },
    NextTradingDate { from: NaiveDate, #[arg(default_value_t = 1)] n: u32 },
    PreviousTradingDate { from: NaiveDate, #[arg(default_value_t = 1)] n: u32 },
    CountTradingDays { start: NaiveDate, end: NaiveDate },
    CacheStats,
    InvalidateCache,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "market_data_cli=info,session_coordinator=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", cli.config.display()))?;
    let config: EngineConfig = toml::from_str(&raw).map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", cli.config.display()))?;

    let mode = match &cli.command {
        Command::Backtest { .. } => TimeMode::Backtest,
        _ => TimeMode::Live,
    };
    let ctx = Context::build(config, mode)?;

    let output = match cli.command {
        Command::Symbol { action } => match action {
            SymbolCommand::List => commands::symbol::list(&ctx),
            SymbolCommand::Info { symbol } => commands::symbol::info(&ctx, &symbol),
            SymbolCommand::Quality { symbol, interval } => commands::symbol::quality_report(&ctx, &symbol, &interval),
            SymbolCommand::Delete(args) => commands::symbol::delete(&ctx, &args.symbol, args.interval.as_deref(), args.start, args.end, args.confirm),
            SymbolCommand::DeleteAll { symbol, confirm } => commands::symbol::delete_all(&ctx, &symbol, confirm),
        },
        Command::Data { action } => match action {
            DataCommand::ImportFile { path, symbol, interval, start, end } => commands::data::import_file(&ctx, &path, &symbol, &interval, start, end),
            DataCommand::ImportApi { data_type, symbol, start, end } => commands::data::import_api(&ctx, &data_type, &symbol, start, end),
            DataCommand::Export { data_type, symbol, start, end, out } => commands::data::export_csv(&ctx, &data_type, &symbol, start, end, &out),
            DataCommand::Aggregate { symbol, from_interval, to_interval, start, end } => commands::data::aggregate(&ctx, &symbol, &from_interval, &to_interval, start, end),
        },
        Command::Query { action } => match action {
            QueryCommand::SessionVolume { symbol, interval } => commands::query::session_volume(&ctx, &symbol, &interval),
            QueryCommand::SessionHighLow { symbol, interval } => commands::query::session_high_low(&ctx, &symbol, &interval),
            QueryCommand::HistoricalHighLow { symbol, interval, start, end } => commands::query::historical_high_low(&ctx, &symbol, &interval, start, end),
            QueryCommand::AverageVolume { symbol, interval, start, end } => commands::query::average_volume(&ctx, &symbol, &interval, start, end),
            QueryCommand::DeltaCursor { symbol, interval } => commands::query::delta_cursor(&ctx, &symbol, &interval),
        },
        Command::Backtest { speed, start, end } => commands::backtest::run(&ctx, speed, start, end),
        Command::Time { action } => match action {
            TimeCommand::Now => commands::time_cmds::current_time(&ctx),
            TimeCommand::Session { date } => commands::time_cmds::trading_session(&ctx, date),
            TimeCommand::NextTradingDate { from, n } => commands::time_cmds::next_trading_date(&ctx, from, n),
            TimeCommand::PreviousTradingDate { from, n } => commands::time_cmds::previous_trading_date(&ctx, from, n),
            TimeCommand::CountTradingDays { start, end } => commands::time_cmds::count_trading_days(&ctx, start, end),
            TimeCommand::CacheStats => commands::time_cmds::cache_stats(&ctx),
            TimeCommand::InvalidateCache => commands::time_cmds::invalidate_cache(&ctx),
        },
    };

    let failed = !output.success;
    output.print();
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tca_cache::{DistributedCache, MemoryBackend};
use tca_engine::{
    models::{ChunkingPeriod, TradeOrderKind},
    pipeline::{Pipeline, VwapBenchmark},
    tz::parse_date_or_ts_to_utc,
};
use tca_orchestrator::{
    RequestOverrides, TcaConfig, TcaService,
    demo::{DemoSummary, SyntheticSpec, synthetic_source},
    load_config_path,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Transaction cost analysis runner")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the standard pipeline over synthetic data and print a JSON summary.
    Demo(DemoArgs),
}

#[derive(Args)]
struct DemoArgs {
    #[arg(long, default_value = "EURUSD")]
    ticker: String,
    #[arg(long, value_parser = parse_ts)]
    start: DateTime<Utc>,
    #[arg(long, value_parser = parse_ts)]
    finish: DateTime<Utc>,
    #[arg(long, default_value = "month")]
    period: ChunkingPeriod,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Run children one after another instead of in parallel.
    #[arg(long)]
    sequential: bool,
    /// Pass sub-results back through the cache as handles.
    #[arg(long)]
    handles: bool,
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    parse_date_or_ts_to_utc(s).map_err(|e| e.to_string())
}

async fn run_demo(config: TcaConfig, args: DemoArgs) -> Result<()> {
    let spec = SyntheticSpec::new(&args.ticker, args.start, args.finish, args.seed);
    let source = Arc::new(synthetic_source(&spec));
    let cache = Arc::new(DistributedCache::new(Arc::new(MemoryBackend::new()), config.cache.clone()));
    let service = TcaService::new(source, Some(cache.clone()), config);

    let pipeline = Pipeline::standard().with_benchmark(VwapBenchmark::new(
        chrono::Duration::minutes(5),
        chrono::Duration::minutes(5),
    ));
    let request = service
        .request(&args.ticker, args.start, args.finish, Arc::new(pipeline))
        .with_chunking_period(args.period)
        .with_kinds(vec![TradeOrderKind::Trade, TradeOrderKind::Order]);
    let overrides = RequestOverrides {
        use_parallel: args.sequential.then_some(false),
        return_cache_handles: args.handles.then_some(true),
        ..RequestOverrides::default()
    };

    let holder = service
        .compute_with(request, &overrides)
        .await
        .context("TCA computation failed")?;
    let summary = DemoSummary::from_holder(&holder, Some(cache.stats()));
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_path(path)?,
        None => TcaConfig::default(),
    }
    .with_env_overrides()?;

    match cli.cmd {
        Cmd::Demo(args) => run_demo(config, args).await,
    }
}

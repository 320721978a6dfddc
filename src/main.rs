use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use job_relay::config;
use job_relay::pipeline::Pipeline;

#[derive(Debug, Parser)]
#[command(author, version, about = "Relay new job postings to Trello and Slack")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print an example config file and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pipeline = Pipeline::from_config(&cfg)?;
    info!(
        store = %cfg.processed_jobs_path().display(),
        min_interval_ms = cfg.slack.rate_limit.min_interval().as_millis() as u64,
        "starting run"
    );
    let report = pipeline.run().await;
    info!(
        swept = report.swept,
        archived = report.archive.map(|a| a.closed).unwrap_or(0),
        fetched = report.fetched,
        already_seen = report.already_seen,
        carded = report.carded.len(),
        board_failures = report.board_failures,
        notified = report.dispatch.delivered,
        rate_limited = report.dispatch.rate_limited,
        dropped = report.dispatch.dropped,
        persisted = report.persisted,
        "finished"
    );
    Ok(())
}

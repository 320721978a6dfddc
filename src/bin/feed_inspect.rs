use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use job_relay::categorizer::Categorizer;
use job_relay::config;
use job_relay::feed::{parse_rss, FeedSource, RssFeed};

/// Print what the relay would see in the feed, without touching any sink.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Read RSS from a local file instead of the configured URL
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let categorizer = Categorizer::from_config(&cfg.categories);

    let jobs = match &args.file {
        Some(path) => parse_rss(&fs::read_to_string(path)?)?,
        None => RssFeed::from_config(&cfg).fetch_jobs().await?,
    };

    println!("{} postings", jobs.len());
    for job in &jobs {
        let (category, priority) = categorizer.categorize(job);
        println!(
            "[{:<6}] {:<15} {:>10}  {}",
            priority.as_str(),
            category.label(),
            job.budget_display(),
            job.title
        );
        println!(
            "         id: {}  verified: {}  spent: ${}",
            job.id, job.client_verified, job.client_spent
        );
    }
    Ok(())
}

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dora_metrics::cache::{MetricCache, NoCache, SqliteCache};
use dora_metrics::config::Config;
use dora_metrics::fetch::HttpFetcher;
use dora_metrics::metrics::{Metric, MetricsEngine};
use dora_metrics::storage::MetricsDb;

#[derive(Parser)]
#[command(
    name = "dora-metrics",
    version,
    about = "Compute DORA delivery metrics and KPIs"
)]
struct Cli {
    /// Log requests, cache activity and intermediate samples to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the value cache and always recompute
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a template config file to fill in
    Init,

    /// Single value of a saved Metabase question
    Kpi {
        /// Metabase question (card) id
        question_id: String,
        /// Reference date, YYYY-MM-DD (default: today)
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Median lead time in business days over the trailing 30 days
    LeadTime {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Share of done issues linked to the configured epic
    EpicCoverage {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Uptime percentage across monitored checks
    Uptime {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Mean time to recovery in minutes
    RecoveryTime {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Production deployments in the month of the reference date
    Deployments {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Bugs created in a month of the current year
    Bugs {
        /// Three-letter month abbreviation, e.g. APR (default: this month)
        month: Option<String>,
    },

    /// Bugs per production deployment in a month of the current year
    ChangeFailureRate {
        /// Three-letter month abbreviation (default: this month)
        month: Option<String>,
    },

    /// Show recorded monthly deployment counts
    History,

    /// Remove expired cache entries
    PurgeCache,
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dora_metrics=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => return cmd_init(),
        Commands::History => return cmd_history(),
        Commands::PurgeCache => return cmd_purge_cache(),
        _ => {}
    }

    let today = Local::now().date_naive();
    let engine = build_engine(cli.no_cache)?;

    match cli.command {
        Commands::Kpi { question_id, date } => {
            let value = engine.kpi(&question_id, date.unwrap_or(today)).await?;
            print_value(Metric::Kpi, value);
        }
        Commands::LeadTime { date } => {
            let value = engine.lead_time(date.unwrap_or(today)).await?;
            print_value(Metric::LeadTime, value);
        }
        Commands::EpicCoverage { date } => {
            let value = engine.epic_coverage(date.unwrap_or(today)).await?;
            print_value(Metric::EpicCoverage, value);
        }
        Commands::Uptime { date } => {
            let value = engine.uptime(date.unwrap_or(today)).await?;
            print_value(Metric::Uptime, value);
        }
        Commands::RecoveryTime { date } => {
            let value = engine.recovery_time(date.unwrap_or(today)).await?;
            print_value(Metric::RecoveryTime, value);
        }
        Commands::Deployments { date } => {
            let result = engine.deployments(date.unwrap_or(today)).await?;
            println!(
                "Deployments {:04}-{:02}: {}",
                result.year, result.month, result.count
            );
        }
        Commands::Bugs { month } => {
            let count = engine.bug_count(month.as_deref(), today).await?;
            println!("{}: {count}", Metric::BugCount);
        }
        Commands::ChangeFailureRate { month } => {
            let value = engine.change_failure_rate(month.as_deref(), today).await?;
            print_value(Metric::ChangeFailureRate, value);
        }
        Commands::Init | Commands::History | Commands::PurgeCache => {}
    }

    Ok(())
}

fn build_engine(no_cache: bool) -> Result<MetricsEngine> {
    let config = Config::load()?;
    let db = Arc::new(MetricsDb::open()?);

    let cache: Arc<dyn MetricCache> = if config.cache.enabled && !no_cache {
        Arc::new(SqliteCache::new(db.clone()))
    } else {
        Arc::new(NoCache)
    };
    let fetcher =
        HttpFetcher::new(config.http.timeout()).context("Failed to build HTTP client")?;

    Ok(MetricsEngine::new(config, Arc::new(fetcher), cache, db))
}

fn print_value(metric: Metric, value: f64) {
    let unit = metric.unit();
    if unit.is_empty() {
        println!("{metric}: {value}");
    } else if unit == "%" {
        println!("{metric}: {value}%");
    } else {
        println!("{metric}: {value} {unit}");
    }
}

fn cmd_init() -> Result<()> {
    let path = Config::config_file();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    Config::template()
        .save()
        .context("Failed to save config")?;
    println!("Config written to {}", path.display());
    println!("Fill in credentials, then try:");
    println!("  dora-metrics lead-time");
    println!("  dora-metrics uptime 2024-03-31");
    println!("  dora-metrics bugs APR");
    Ok(())
}

fn cmd_history() -> Result<()> {
    let config = Config::load()?;
    let db = MetricsDb::open()?;
    let sheet = &config.bitbucket.sheet_name;
    let rows = db.monthly_rows(sheet)?;

    if rows.is_empty() {
        println!("No deployment counts recorded yet.");
        return Ok(());
    }

    let header = db
        .sheet_header(sheet)?
        .unwrap_or_else(|| vec!["Year".into(), "Month".into(), "Value".into()]);
    let title = |idx: usize| header.get(idx).map_or("", String::as_str).to_uppercase();

    println!("{sheet}");
    println!("{:<6}  {:<6}  {:<16}", title(0), title(1), title(2));
    for row in &rows {
        println!("{:<6}  {:<6}  {:<16}", row.year, row.month, row.value);
    }
    Ok(())
}

fn cmd_purge_cache() -> Result<()> {
    let db = MetricsDb::open()?;
    let removed = db.purge_expired(chrono::Utc::now().timestamp_millis())?;
    println!("Removed {removed} expired cache entries.");
    Ok(())
}

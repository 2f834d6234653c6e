use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "incidentd",
    about = "Automated incident-response orchestrator",
    version,
    long_about = None
)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "incidentd.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (webhook ingestion + API server)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print MTTR statistics for recent incidents
    Stats {
        /// Lookback window in days
        #[arg(long, default_value = "30")]
        days: i64,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = incidentd::config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting incidentd daemon");
            incidentd::serve(config).await?;
        }
        Commands::Stats { days, json } => {
            let pool = incidentd::storage::open_pool(&config.storage.path)?;
            let store = incidentd::storage::Store::new(pool);
            let report = incidentd::stats::MttrEngine::new(store).report(days).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let fmt = |avg: &Option<String>| avg.clone().unwrap_or_else(|| "N/A".into());
                println!("\nIncident MTTR Report (last {} days)", report.period_days);
                println!(
                    "Total: {}  Resolved: {}  Active: {}",
                    report.total_incidents, report.resolved, report.active
                );
                println!("Overall MTTR:  {}", fmt(&report.mttr.average));
                println!("Last 24 hours: {}", fmt(&report.last_24h.average));
                println!("Last 7 days:   {}", fmt(&report.last_7d.average));
                if !report.by_severity.is_empty() {
                    println!("\n{:<10} | {:<10} | MTTR", "Severity", "Resolved");
                    println!("{:-<10}-|-{:-<10}-|-{:-<12}", "", "", "");
                    for (severity, stats) in &report.by_severity {
                        println!(
                            "{:<10} | {:<10} | {}",
                            severity, stats.count, stats.average
                        );
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}

use std::path::PathBuf;
use anyhow::Result;
use clap::{Parser, Subcommand};

use functest::config::PanelConfig;
use functest::panel::display::{self, IndicatorLevel};

#[derive(Parser)]
#[command(
    name = "functest",
    about = "Mechanism status and command backend for hardware functional-test panels",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Without it, FUNCTEST_CONFIG, then the system path, then defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API for front ends and the automation interface)
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show the status/command rows for the configured initial state
    Status {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the test history table, newest first
    History {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Show every run instead of the visible table rows
        #[arg(long)]
        all: bool,
    },

    /// Print the display configuration
    Layout {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(config: &PanelConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PanelConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(bind = ?bind, "Starting functest daemon");
            functest::serve(config, bind.as_deref()).await?;
        }
        Commands::Status { json } => {
            let state = functest::inspect_state(&config)?;
            let rows = display::status_rows(&config.display, &state.panel.mechanisms());
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("\n{}", config.display.title);
                println!("{}", config.display.navigation.join(" | "));
                println!();
                println!("{:<25} | {:<14} | Command", "Status", "Indicator");
                println!("{:-<25}-|-{:-<14}-|-{:-<20}", "", "", "");
                for row in rows {
                    let level = match row.indicator.level {
                        IndicatorLevel::Active => "ACTIVE",
                        IndicatorLevel::Inactive => "-",
                        IndicatorLevel::Pending => "PENDING",
                        IndicatorLevel::Unknown => "UNKNOWN",
                    };
                    println!(
                        "{:<25} | {} {:<12} | {}",
                        row.status_label, row.indicator.symbol, level, row.command_label
                    );
                }
                println!();
            }
        }
        Commands::History { json, all } => {
            let state = functest::inspect_state(&config)?;
            let records = state.panel.list_runs();
            let limit = if all {
                records.len()
            } else {
                config.display.history_rows
            };
            let rows = display::history_rows(&records, limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No test runs recorded.");
            } else {
                let cols = &config.display.history_columns;
                let col = |i: usize| cols.get(i).map(String::as_str).unwrap_or("");
                println!("{:<16} | {:<12} | {:<12} | {}", col(0), col(1), col(2), col(3));
                println!("{:-<16}-|-{:-<12}-|-{:-<12}-|-{:-<20}", "", "", "", "");
                for r in rows {
                    println!(
                        "{:<16} | {:<12} | {:<12} | {}",
                        r.start_time, r.elapsed, r.status, r.test_name
                    );
                }
            }
        }
        Commands::Layout { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.display)?);
            } else {
                print!("{}", toml::to_string_pretty(&config.display)?);
            }
        }
    }

    Ok(())
}

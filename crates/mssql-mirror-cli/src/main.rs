//! mssql-mirror CLI - copy every table of one SQL Server database into another.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use mssql_mirror::{
    Config, ConnectionConfig, LogProgress, MigrateError, Migrator, MssqlProvider, ProgressSink,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-mirror")]
#[command(about = "Copy every table of one SQL Server database into another")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Source connection string, overriding the config file's `source`
    #[arg(long)]
    source_conn: Option<String>,

    /// Target connection string, overriding the config file's `target`
    #[arg(long)]
    target_conn: Option<String>,

    /// Log format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "info")]
    verbosity: Verbosity,

    /// Print progress events to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy all source tables into the target
    Run {
        /// Override source schema
        #[arg(long)]
        source_schema: Option<String>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Compare row counts between source and target
    Validate,

    /// Write a DELETE + INSERT backup script of one database
    Backup {
        /// Database to snapshot
        #[arg(long, value_enum, default_value = "target")]
        from: Side,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Test database connections
    HealthCheck,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Verbosity {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Verbosity> for Level {
    fn from(v: Verbosity) -> Self {
        match v {
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Info => Level::INFO,
            Verbosity::Warn => Level::WARN,
            Verbosity::Error => Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Side {
    Source,
    Target,
}

/// Progress sink for `--progress`.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    setup_logging(cli.verbosity, cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    apply_connection_overrides(
        &mut config,
        cli.source_conn.as_deref(),
        cli.target_conn.as_deref(),
    )?;

    let cancel_token = setup_signal_handler()?;
    let migrator = Migrator::new(Arc::new(MssqlProvider::new()))
        .with_options(config.migration.clone())
        .with_cancellation(cancel_token);

    match cli.command {
        Commands::Run {
            source_schema,
            target_schema,
        } => {
            if let Some(schema) = source_schema {
                config.source.schema = schema;
            }
            if let Some(schema) = target_schema {
                config.target.schema = schema;
            }

            let mut stderr_sink = StderrProgress;
            let mut log_sink = LogProgress;
            let sink: &mut dyn ProgressSink = if cli.progress {
                &mut stderr_sink
            } else {
                &mut log_sink
            };

            let result = migrator
                .migrate(&config.source, &config.target, Some(sink))
                .await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!(
                    "\n{}",
                    if result.success { "Migration completed!" } else { "Migration failed!" }
                );
                println!("  Run ID: {}", result.run_id);
                println!("  Message: {}", result.message);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}/{}", result.tables.len(), result.tables_count);
                println!("  Rows: {}", result.rows_migrated);
                if let Some(ref table) = result.failed_table {
                    println!("  Failed table: {}", table);
                }
                for warning in &result.warnings {
                    println!("  Warning: {}", warning);
                }
            }

            return Ok(result.exit_code);
        }

        Commands::Validate => {
            let parity = migrator.validate(&config.source, &config.target).await?;
            let mismatches = parity.iter().filter(|p| !p.matches()).count();

            if cli.output_json {
                let rows: Vec<serde_json::Value> = parity
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "table": p.table.to_string(),
                            "source_count": p.source_count,
                            "target_count": p.target_count,
                            "matches": p.matches(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("Row count validation:");
                for p in &parity {
                    println!(
                        "  {}: source={} target={}{}",
                        p.table,
                        p.source_count,
                        p.target_count,
                        if p.matches() { "" } else { " (MISMATCH)" }
                    );
                }
                println!(
                    "\n  {} tables, {} mismatches",
                    parity.len(),
                    mismatches
                );
            }
        }

        Commands::Backup { from, output } => {
            let conn: &ConnectionConfig = match from {
                Side::Source => &config.source,
                Side::Target => &config.target,
            };
            let script = migrator.backup(conn).await;

            match output {
                Some(path) => {
                    std::fs::write(&path, &script)?;
                    info!("Backup of {} written to {:?}", conn.endpoint(), path);
                }
                None => print!("{}", script),
            }
        }

        Commands::HealthCheck => {
            let result = migrator.health_check(&config.source, &config.target).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    config.source.endpoint(),
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    config.target.endpoint(),
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let endpoint = if result.source_connected {
                    config.target.endpoint()
                } else {
                    config.source.endpoint()
                };
                return Err(MigrateError::ConnectionUnreachable { endpoint });
            }
        }
    }

    Ok(0)
}

/// Replace `source`/`target` with parsed connection strings, keeping each side's schema.
fn apply_connection_overrides(
    config: &mut Config,
    source: Option<&str>,
    target: Option<&str>,
) -> Result<(), MigrateError> {
    if source.is_none() && target.is_none() {
        return Ok(());
    }
    if let Some(s) = source {
        let schema = std::mem::take(&mut config.source.schema);
        config.source = ConnectionConfig::from_connection_string(s)?;
        config.source.schema = schema;
    }
    if let Some(s) = target {
        let schema = std::mem::take(&mut config.target.schema);
        config.target = ConnectionConfig::from_connection_string(s)?;
        config.target.schema = schema;
    }
    config.validate()
}

fn setup_logging(verbosity: Verbosity, format: LogFormat) {
    // Logs go to stderr so --output-json and backup scripts stay clean on stdout.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::from(verbosity))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Cancellation takes effect at the next table boundary.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let token = cancel_token.clone();

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping after the current table...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current table...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}

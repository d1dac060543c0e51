//! filmq - movie analytics client
//!
//! Uploads the movies, ratings and credits datasets to the aggregation
//! server, collects the query results and optionally hands them to the
//! results validator.

use clap::Parser;
use colored::Colorize;
use filmq_client::{ClientConfig, QueryReport, Session, SessionReport, Shutdown};
use filmq_protocol::{QueryId, QuerySelection};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filmq")]
#[command(about = "Client for the filmq movie analytics service")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "CLI_CONFIG")]
    config: Option<PathBuf>,

    /// Aggregation server address
    #[arg(short, long)]
    server: Option<String>,

    /// Results validator address
    #[arg(long)]
    validator: Option<String>,

    /// Query to run (0 = all, 1-5 = a single query)
    #[arg(short, long)]
    query: Option<u8>,

    /// Client identity
    #[arg(long)]
    id: Option<String>,

    /// Maximum records per batch
    #[arg(long)]
    batch_max_amount: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(server) = &self.server {
            config.server_addr = server.clone();
        }
        if let Some(validator) = &self.validator {
            config.validator_addr = Some(validator.clone());
        }
        if let Some(query) = self.query {
            config.query = query;
        }
        if let Some(id) = &self.id {
            config.id = Some(id.clone());
        }
        if let Some(amount) = self.batch_max_amount {
            config.batch.max_records = amount;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ClientConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Failed to load config".red(), e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let settings = match config.session_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let selection = settings.query;

    tracing::info!("Starting filmq client {}", settings.client_id);
    tracing::info!("  Server: {}", config.server_addr);
    tracing::info!("  Query: {}", selection);
    tracing::info!(
        "  Batch limits: {} records, {} bytes",
        settings.max_records,
        settings.max_bytes
    );
    match &settings.validator_addr {
        Some(addr) => tracing::info!("  Validator: {}", addr),
        None => tracing::info!("  Validator: disabled"),
    }

    let sources = match config.datasets.open_sources() {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!("Failed to open datasets: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Spawn shutdown signal handler
    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, finishing session...");
        signal.trigger();
    });

    let session = match Session::connect(&config.server_addr, settings, sources, shutdown).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = session.run().await;
    print_report(&report, selection);

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &SessionReport, selection: QuerySelection) {
    for query in selection.queries() {
        println!("{}", format!("=== {} ===", query).bold());
        match report.document.get(&query.key()) {
            Some(text) => print_query(query, text),
            None => println!("{}", "(incomplete)".yellow()),
        }
    }

    if let Some(failure) = &report.failure {
        eprintln!(
            "{}: {} phase: {}",
            "Session failed".red(),
            failure.phase,
            failure.error
        );
    }
    if report.cancelled {
        eprintln!("{}", "Session cancelled".yellow());
    }
    if let Some(verdict) = report.validation {
        if verdict.result {
            println!("{}", "Validation passed".green());
        } else {
            println!("{}", "Validation failed".red());
        }
    }
}

fn print_query(query: QueryId, text: &str) {
    let entries = QueryReport::parse(query, text).len();
    if text.is_empty() {
        println!("{}", "(no results)".dimmed());
    } else {
        println!("{}", text);
    }
    println!("{}", format!("{} entries", entries).dimmed());
}

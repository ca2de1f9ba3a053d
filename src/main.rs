//! csvjobs - Main Entry Point

use clap::{Parser, Subcommand};
use csvjobs::config::ServiceConfig;
use csvjobs::lifecycle_span;
use csvjobs::observability::logging::{init_default_logging, init_logging, LogFormat};
use csvjobs::processing::TransformPipeline;
use csvjobs::transport;
use csvjobs::JobService;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Instrument, Level};

/// Default configuration file locations, tried in order
const DEFAULT_CONFIG_PATHS: &[&str] = &["csvjobs.toml", "config/csvjobs.toml"];

/// Optional env file read at startup
const ENV_FILE: &str = ".env";

/// Asynchronous CSV processing service
#[derive(Parser)]
#[command(name = "csvjobs")]
#[command(about = "Flags CSV rows that contain email addresses, as a service or one-shot")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Process a local file synchronously
    Process {
        /// CSV file to read
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Where to write the processed CSV
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Before logging init so LOG_LEVEL and friends can come from the file
    let env_file = ServiceConfig::load_env_file(Path::new(ENV_FILE));

    // Initialize observability system
    match cli.verbose {
        0 => init_default_logging(),
        verbose => {
            let level = if verbose == 1 { Level::DEBUG } else { Level::TRACE };
            let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
            init_logging(level, LogFormat::parse(&format), false);
        }
    }

    info!("Starting csvjobs v{}", env!("CARGO_PKG_VERSION"));

    match env_file {
        Ok(true) => info!("Loaded environment from {}", ENV_FILE),
        Ok(false) => {}
        Err(e) => {
            error!("Failed to load {}: {}", ENV_FILE, e);
            process::exit(1);
        }
    }

    // Load configuration
    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Serve => {
            let span = lifecycle_span!(event = "serve", port = config.server.port);
            run_service(config).instrument(span).await
        }
        Commands::Process { input, output } => process_file(input, output).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ServiceConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ServiceConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults and environment");
    Ok(ServiceConfig::load(None)?)
}

async fn run_service(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = Arc::new(JobService::from_config(&config)?);

    let reaper = config.jobs.retention().map(|retention| {
        info!(
            retention_secs = retention.as_secs(),
            interval_secs = config.jobs.reap_interval_secs,
            "Job reaper started"
        );
        service.spawn_reaper(retention, config.jobs.reap_interval())
    });

    transport::serve(
        Arc::clone(&service),
        config.server.port,
        config.max_upload_bytes(),
        shutdown_signal(),
    )
    .await;

    if let Some(reaper) = reaper {
        reaper.abort();
    }

    let counts = service.jobs().count_by_status();
    if counts.in_progress > 0 {
        warn!(
            in_progress = counts.in_progress,
            "Shutting down with jobs still in progress"
        );
    }

    Ok(())
}

async fn process_file(input: PathBuf, output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!(input = %input.display(), output = %output.display(), "Processing file");

    let stats = tokio::task::spawn_blocking(move || {
        let reader = BufReader::new(File::open(&input)?);
        let writer = BufWriter::new(File::create(&output)?);
        TransformPipeline::default().run(reader, writer)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn handle_config_command(
    config: &ServiceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

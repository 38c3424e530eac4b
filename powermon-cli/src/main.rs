//! CLI for the powermon power telemetry collector.
//!
//! Provides continuous monitoring to CSV and a one-shot connection test.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use powermon::export::{CsvFileSink, ExporterConfig};
use powermon::monitor::{MonitorConfig, run_monitor, test_connection};
use powermon::poller::PollerConfig;
use powermon::redfish::{DEFAULT_SYSTEM_ID, RedfishClient, RedfishConfig};

/// powermon — High-frequency Redfish power monitoring to CSV.
#[derive(Parser)]
#[command(name = "powermon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Connection options shared by all commands.
#[derive(Args)]
struct ConnectionArgs {
    /// BMC/iDRAC hostname or IP address.
    #[arg(long)]
    host: String,

    /// Redfish username.
    #[arg(long)]
    username: String,

    /// Redfish password.
    #[arg(long)]
    password: String,

    /// System resource identifier.
    #[arg(long, default_value = DEFAULT_SYSTEM_ID)]
    system_id: String,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Verify TLS certificates (off by default — iDRACs commonly use
    /// self-signed certificates).
    #[arg(long)]
    verify_ssl: bool,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Continuously sample power draw and append rows to a CSV file.
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Output interval between CSV rows in seconds.
        #[arg(short = 'i', long, default_value = "0.1")]
        interval: f64,

        /// Total monitoring duration in seconds (0 = run until interrupted).
        #[arg(short = 'd', long, default_value = "0")]
        duration: f64,

        /// Output CSV file.
        #[arg(short = 'o', long, default_value = "system_power_data.csv")]
        output: PathBuf,

        /// Rows buffered in memory before each flush to disk.
        #[arg(short = 'b', long, default_value = "1000")]
        buffer_size: usize,

        /// Ring capacity: how many recent samples are kept in memory.
        #[arg(long, default_value = "1000")]
        capacity: usize,
    },

    /// Perform one power fetch and one supply fetch, report, and exit.
    Test {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            connection,
            interval,
            duration,
            output,
            buffer_size,
            capacity,
        } => cmd_run(&connection, interval, duration, &output, buffer_size, capacity),
        Commands::Test { connection } => cmd_test(&connection),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Builds a Redfish client from the shared connection arguments.
fn build_client(args: &ConnectionArgs) -> Result<RedfishClient, Box<dyn std::error::Error>> {
    let config = RedfishConfig::new(&args.host, &args.username, &args.password)
        .with_system_id(&args.system_id)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_verify_ssl(args.verify_ssl);
    Ok(RedfishClient::new(config)?)
}

/// Implements `powermon run`.
fn cmd_run(
    connection: &ConnectionArgs,
    interval: f64,
    duration: f64,
    output: &PathBuf,
    buffer_size: usize,
    capacity: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if interval <= 0.0 {
        return Err("interval must be positive".into());
    }
    if duration < 0.0 {
        return Err("duration must not be negative".into());
    }
    if buffer_size == 0 {
        return Err("buffer size must be at least 1".into());
    }

    let client = build_client(connection)?;
    let mut sink = CsvFileSink::create(output)?;

    let config = MonitorConfig {
        capacity,
        poller: PollerConfig::default(),
        exporter: ExporterConfig {
            interval: Duration::from_secs_f64(interval),
            duration: (duration > 0.0).then(|| Duration::from_secs_f64(duration)),
            flush_threshold: buffer_size,
            ..ExporterConfig::default()
        },
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    println!("Starting power monitoring of {}.", connection.host);
    println!("Data will be saved to {}.", output.display());
    println!("Press Ctrl+C to stop.");

    let summary = run_monitor(Box::new(client), &mut sink, config, &stop)?;

    println!();
    println!("Monitoring complete.");
    println!(
        "Collected {} rows over {:.2} seconds ({:.2} rows/second).",
        summary.rows_written,
        summary.elapsed.as_secs_f64(),
        summary.average_rate,
    );
    println!("Data saved to {}.", output.display());

    Ok(())
}

/// Implements `powermon test`.
fn cmd_test(connection: &ConnectionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = build_client(connection)?;
    let report = test_connection(&mut client)?;

    println!("Successfully connected to the Redfish endpoint.");
    println!("Current power consumption: {} Watts", report.power_watts);
    println!("Found {} power supplies", report.supplies.len());

    for ps in &report.supplies {
        let output = ps
            .output_watts
            .map_or_else(|| "?".to_string(), |w| format!("{w} W"));
        let state = ps.state.as_deref().unwrap_or("unknown");
        println!("  - Power supply {}: output {output}, state {state}", ps.id);
    }

    Ok(())
}

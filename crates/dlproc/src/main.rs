//! dlproc binary.
//!
//! Runs one property file and records its audit trail.

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dlproc_core::driver::{EXIT_OK, EXIT_USAGE};
use dlproc_core::{DlprocConfig, DlprocError, FlowDriver};

#[derive(Parser, Debug)]
#[command(name = "dlproc")]
#[command(version, about = "Run the SQL steps of a property file and audit each step", long_about = None)]
struct Cli {
    /// Property file name, resolved under DLPROC_PROPERTY_ROOT
    #[arg(value_name = "PROPERTY_FILE")]
    property_file: String,
}

/// What to do after reading the command line.
#[derive(Debug)]
enum Invocation {
    Run(Cli),
    Exit(u8),
}

/// Parse arguments; wrong usage prints the usage line to stdout.
fn parse_args<I, T>(args: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Invocation::Run(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            if let Err(print_err) = e.print() {
                tracing::warn!(error = %print_err, "Failed to print help");
            }
            Invocation::Exit(EXIT_OK)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Invalid arguments");
            let usage = DlprocError::Usage(Cli::command().render_usage().to_string());
            println!("{}", usage);
            Invocation::Exit(EXIT_USAGE)
        }
    }
}

async fn run(cli: Cli, config: Result<DlprocConfig, DlprocError>) -> Result<u8> {
    let config = config.context("Failed to load configuration")?;
    tracing::info!(
        property_root = %config.property_root.display(),
        audit_sink = %config.audit_sink,
        audit_table = %config.audit_table,
        "Configuration loaded"
    );

    let driver = FlowDriver::new(config);
    let session = driver
        .connect(&cli.property_file)
        .await
        .context("Failed to open flow session")?;

    let report = driver.run(&cli.property_file, session).await;

    tracing::info!(
        flow = %report.flow_name,
        context_id = %report.execution_context_id,
        records = report.records.len(),
        exit_code = report.exit_code(),
        "Flow finished"
    );

    Ok(report.exit_code())
}

/// Run the flow and map setup failures to the usage exit code.
async fn exit_code(cli: Cli, config: Result<DlprocConfig, DlprocError>) -> u8 {
    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "dlproc failed");
            EXIT_USAGE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dlproc=debug,dlproc_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = match parse_args(std::env::args_os()) {
        Invocation::Run(cli) => cli,
        Invocation::Exit(code) => return ExitCode::from(code),
    };

    ExitCode::from(exit_code(cli, DlprocConfig::from_env()).await)
}

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use salvage::application::{RecoveryError, RecoverySession};
use salvage::domain::entities::{CancellationToken, RecoveryCatalog};
use salvage::domain::repositories::BlockDeviceReader;
use salvage::domain::services::FormatDetector;
use salvage::infrastructure::block_device::BlockDevice;
use salvage::presentation::cli::{
    Cli, Commands, ProgressReporter, ScanArgs, print_detection, print_records, print_volume,
};

fn init_logging(cli: &Cli) -> Result<()> {
    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logger: {err}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("warning: {:#}", err);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Detect { device } => run_detect(&device),
        Commands::Info { device, json } => run_info(&device, json),
        Commands::Scan(args) => run_scan(&args),
    }
}

fn run_detect(path: &str) -> Result<()> {
    let device = BlockDevice::open(path).map_err(|source| RecoveryError::Open {
        path: path.to_string(),
        source,
    })?;
    let info = device.device_info()?;
    let matches = FormatDetector::new().detect_all(&device);
    print_detection(&info, &matches);
    device.close()?;
    Ok(())
}

fn run_info(path: &str, json: bool) -> Result<()> {
    let session = RecoverySession::open(path)?;
    let volume = session.volume_info()?;
    print_volume(session.device_info(), session.filesystem(), &volume, json)?;
    session.close()?;
    Ok(())
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let session = RecoverySession::open(&args.device)?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install the Ctrl-C handler")?;

    let reporter = if args.json {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::for_scan(0)
    };

    let catalog = RecoveryCatalog::new();
    let report = session.run(
        &catalog,
        &args.scan_options(),
        &cancel,
        Some(reporter.scan_callback()),
    )?;
    reporter.clear();

    print_records(&catalog, &report, args.deleted_only, args.json)?;
    session.close()?;
    Ok(())
}

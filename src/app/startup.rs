//! Application startup
//!
//! Parses the command line, initialises logging, loads the configuration and
//! drives one batch from the image provider through the scanner and back.

use crate::app::cli::Args;
use crate::config::Config;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, level_for_verbosity};
use crate::core::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::core::version::long_version;
use crate::provider::{FileImageProvider, ImageProvider, Location, ProviderResult};
use crate::scanner::api::{run_batch, BatchOutcome, ScanSession};
use clap::Parser;
use std::io::IsTerminal;

/// Run the application and return the process exit code
pub async fn startup() -> i32 {
    let args = Args::parse();

    let use_color = args.use_color(std::io::stderr().is_terminal());
    colored::control::set_override(use_color);
    let level = level_for_verbosity(
        args.log_level.as_deref().unwrap_or("info"),
        args.verbosity(),
    );
    if let Err(e) = init_logging(
        Some(level),
        args.log_format.as_deref(),
        args.log_file_path().as_deref(),
        use_color,
    ) {
        eprintln!("FATAL: Failed to initialise logging: {}", e);
        return 1;
    }

    log::info!("imagegate {} starting", long_version());

    let config = match Config::load(args.config_file.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            log_error_with_context(&e, "Loading configuration");
            return 1;
        }
    };
    log::info!("Configuration: {}", config);

    let session = match ScanSession::from_config(&config).await {
        Ok(session) => session,
        Err(e) => {
            log_error_with_context(&e, "Constructing scan engines");
            return 1;
        }
    };

    let coordinator = ShutdownCoordinator::new();
    coordinator.install_signal_handlers();

    let mut provider = FileImageProvider::new(
        Location::from_arg(Some(&args.images)),
        Location::from_arg(Some(&args.output)),
        config.delete_failed_images,
    );

    match scan_and_deliver(&session, &mut provider, coordinator.signal()).await {
        Ok(outcome) => {
            if let Some(error) = &outcome.error {
                log::warn!("Partial results delivered: {}", error);
            }
            0
        }
        Err(e) => {
            log_error_with_context(&e, "Exchanging images with the provider");
            1
        }
    }
}

/// Receive a batch, scan it and deliver the partitions
///
/// A batch cut short by its budget or by shutdown is still delivered; only
/// provider failures are returned as errors.
pub async fn scan_and_deliver<P>(
    session: &ScanSession,
    provider: &mut P,
    shutdown: ShutdownSignal,
) -> ProviderResult<BatchOutcome>
where
    P: ImageProvider + ?Sized,
{
    let images = provider.receive_images().await?;
    let outcome = run_batch(session, &images, shutdown).await;
    provider
        .send_images(&outcome.non_compliant, &outcome.failed)
        .await?;
    provider.finish().await?;
    Ok(outcome)
}

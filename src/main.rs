//! KScan - standalone camera barcode scanner
//!
//! Opens the scanner window, waits for a result and prints it.
//!
//! # Overview
//!
//! The binary initializes:
//! - Configuration ([`ConfigManager`]) from `kscan.yaml` plus `KSCAN__*` environment overrides
//! - Logging infrastructure (daily file rotation + console output)
//! - Tokio runtime for the camera event pump
//! - Camera backend (still images or native webcam)
//! - Scanner controller (bridges the Slint window with the scanning session)
//!
//! Threads:
//! - **Main thread**: Slint event loop; every result is delivered here
//! - **Camera worker**: grabs frames, applies zoom, decodes
//! - **Tokio workers**: pump camera events toward the UI
//! - **Session listener**: background std::thread for reactive UI updates
//!
//! # Usage
//!
//! ```text
//! kscan [CONFIG_DIR]
//! ```
//!
//! `CONFIG_DIR` defaults to the current directory.
//!
//! # Exit status
//!
//! - `0`: a barcode was scanned and printed as `<format>\t<payload>`
//! - `1`: scanning failed (camera or analyzer error)
//! - `2`: the user cancelled or closed the window

use anyhow::Result;
use kscan::models::ResultKind;
use kscan::services::camera_backend;
use kscan::ui::ScannerController;
use kscan::{APP_NAME, BarcodeResult, ConfigManager, ScanMetrics, VERSION};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

fn main() -> Result<ExitCode> {
    let config_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    // Config first: it decides where and how to log
    let config_manager = ConfigManager::new(&config_dir)?;
    let config = config_manager.load_config()?;

    // Hold the guard until exit so buffered log lines are flushed
    let _log_guard = kscan::logging::setup_logging(&config.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Config: {} ({:?} camera)", config_manager.config_path(), config.camera.source);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("kscan-worker")
        .build()?;

    let metrics = Arc::new(ScanMetrics::new());
    let backend = camera_backend(&config.camera, Arc::clone(&metrics))?;

    // Last terminal or accepted result, read after the event loop exits
    let outcome: Arc<Mutex<Option<BarcodeResult>>> = Arc::new(Mutex::new(None));
    let outcome_clone = Arc::clone(&outcome);
    let close_on_result = config.scanner.close_on_result;

    let controller = ScannerController::new(
        &config,
        backend,
        Arc::clone(&metrics),
        runtime.handle().clone(),
        move |result| {
            let close = match &result {
                BarcodeResult::Success(barcode) => {
                    println!("{}\t{}", barcode.format, barcode.data);
                    close_on_result
                }
                BarcodeResult::Failed(_) | BarcodeResult::Canceled => true,
            };

            *outcome_clone.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);

            if close {
                if let Err(e) = slint::quit_event_loop() {
                    tracing::warn!("Failed to quit event loop: {:?}", e);
                }
            }
        },
    )?;

    tracing::info!("Scanner initialized, launching window");

    // Blocks until a result closes the window or the user closes it
    let run_result = controller.run();

    tracing::info!("Scanner closed, releasing camera");
    controller.dispose();
    drop(controller);

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    metrics.log_summary();

    run_result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })?;

    let outcome = outcome.lock().unwrap_or_else(|e| e.into_inner()).take();
    let code = match outcome.as_ref().map(BarcodeResult::kind) {
        Some(ResultKind::Success) => ExitCode::SUCCESS,
        Some(ResultKind::Failed) => {
            if let Some(BarcodeResult::Failed(error)) = &outcome {
                eprintln!("scan failed: {}", error);
            }
            ExitCode::from(1)
        }
        Some(ResultKind::Canceled) | None => ExitCode::from(2),
    };

    tracing::info!("Application shutdown complete");
    Ok(code)
}

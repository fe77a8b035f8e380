// KScan - Camera barcode scanner with live preview, torch, zoom and multi-code selection
//
// This is the library crate containing the scanning session, camera plumbing and UI.
// The binary crate (main.rs) runs a standalone scanner window and prints the result.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::ScanMetrics;
pub use models::{Barcode, BarcodeFormat, BarcodeResult, ScanError, ScanState, ScannerConfig};
pub use state::{SessionChange, SessionManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

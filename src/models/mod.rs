//! Data models for the KScan scanner.
//!
//! - [`BarcodeFormat`], [`Barcode`], [`BarcodeResult`], [`ScanError`]: the values that cross
//!   the component boundary (caller formats in, decoded barcodes and results out)
//! - [`ScanState`]: transient per-session state (torch, zoom, pending barcodes, sheet)
//! - [`ScannerConfig`]: settings loaded from `kscan.yaml`
//!
//! State updates go through [`SessionManager`](crate::state::SessionManager); nothing else
//! mutates a [`ScanState`].

pub mod barcode;
pub mod config;
pub mod scan_state;

pub use barcode::{Barcode, BarcodeFormat, BarcodeResult, ResultKind, ScanError};
pub use config::{
    CameraSettings, CameraSource, LoggingSettings, ScannerColors, ScannerConfig, ScannerSettings,
    parse_hex_color,
};
pub use scan_state::{MIN_ZOOM_RATIO, ScanState, SessionPhase};

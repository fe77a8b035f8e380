// UI module - scanner window and event loop bridge
//
// This module contains:
// - EventLoopBridge: Carries camera-side work onto the Slint event loop
// - ScannerController: Wires the scanner window to the session and the camera

pub mod bridge;
pub mod controller;

pub use bridge::{EventLoopBridge, EventLoopBridgeHandle, UiUpdateSender, ui_update_channel};
pub use controller::{ScannerController, ScannerWindow, SheetItem};

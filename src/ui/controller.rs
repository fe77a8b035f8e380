// Scanner Controller - Bridges the Slint scanner window with the scanning session
//
// This module contains the ScannerController which coordinates between:
// - Slint UI (ScannerWindow)
// - SessionManager (aggregation policy and result delivery)
// - CameraSession (camera binding, torch and zoom)
// - EventLoopBridge (camera events onto the UI thread)
//
// It handles:
// - UI callbacks → session intents and camera requests
// - Camera events → preview, session updates
// - Session changes → UI updates and camera release

use crate::metrics::ScanMetrics;
use crate::models::{Barcode, BarcodeResult, ScannerConfig, ScannerSettings, parse_hex_color};
use crate::services::{
    BindRequest, CAMERA_EVENT_BUFFER, CameraBackend, CameraEvent, CameraSession, FrameAnalyzer,
    PreviewFrame,
};
use crate::state::{SessionChange, SessionManager};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use slint::{ComponentHandle, Model, ModelRc, Rgba8Pixel, SharedPixelBuffer, VecModel};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

// Include the generated Slint code
slint::include_modules!();

type SharedCamera = Arc<Mutex<CameraSession>>;

fn lock_camera(camera: &SharedCamera) -> MutexGuard<'_, CameraSession> {
    camera.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scanner controller that wires the Slint window to the scanning session
///
/// Lifecycle:
/// 1. [`new()`](Self::new) builds the window, the session and the callbacks
/// 2. [`run()`](Self::run) binds the camera once the event loop starts and blocks
///    until the window closes or the result callback quits the loop
/// 3. [`dispose()`](Self::dispose) (or drop) releases the camera
///
/// Cancel and failures end the session and release the camera right away.
/// Closing the window releases the camera without delivering a result.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let backend = camera_backend(&config.camera, Arc::clone(&metrics))?;
///
/// let controller = ScannerController::new(
///     &config,
///     backend,
///     metrics,
///     runtime.handle().clone(),
///     |result| println!("{:?}", result),
/// )?;
/// controller.run()?;
/// controller.dispose();
/// ```
pub struct ScannerController {
    ui: ScannerWindow,
    bridge: EventLoopBridge<ScannerWindow>,
    session: SessionManager,
    camera: SharedCamera,
    bind_request: BindRequest,
}

impl ScannerController {
    /// Create the scanner window and session
    ///
    /// `on_result` runs on the UI thread for every delivered result.
    pub fn new<F>(
        config: &ScannerConfig,
        backend: Box<dyn CameraBackend>,
        metrics: Arc<ScanMetrics>,
        tokio_handle: tokio::runtime::Handle,
        on_result: F,
    ) -> Result<Self>
    where
        F: FnMut(BarcodeResult) + Send + 'static,
    {
        let ui = ScannerWindow::new().context("Failed to create Slint UI")?;
        let bridge = EventLoopBridge::new(&ui, tokio_handle, Arc::clone(&metrics));

        let session = SessionManager::new(config.formats.clone(), on_result, metrics);
        let camera: SharedCamera = Arc::new(Mutex::new(CameraSession::new(backend)));

        let bind_request = BindRequest {
            analyzer: Arc::new(FrameAnalyzer::standard(config.formats.clone())),
            target_width: config.camera.target_width,
            target_height: config.camera.target_height,
        };

        Self::apply_appearance(&ui, &config.scanner);
        Self::sync_ui_with_state(&ui, &session);
        Self::setup_callbacks(&ui, &session, &camera);
        Self::setup_session_subscription(&bridge, &session, &camera);

        tracing::info!("Scanner controller initialized for formats {:?}", config.formats);

        Ok(Self {
            ui,
            bridge,
            session,
            camera,
            bind_request,
        })
    }

    /// Show the scanner and block until the event loop exits
    pub fn run(&self) -> Result<(), slint::PlatformError> {
        self.start_camera();

        tracing::info!("Starting scanner event loop");
        self.ui.run()
    }

    /// Release the camera. Safe to call repeatedly.
    pub fn dispose(&self) {
        lock_camera(&self.camera).dispose();
        self.session.on_camera_released();
    }

    /// Shared session, for hosts that want to observe or drive it
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Spawn the camera event pump and queue the bind for the first event loop turn
    fn start_camera(&self) {
        let (events_tx, events_rx) = mpsc::channel(CAMERA_EVENT_BUFFER);

        let pump_bridge = self.bridge.clone_handle();
        let pump_session = self.session.clone();
        self.bridge.spawn_async(move || async move {
            Self::pump_camera_events(events_rx, pump_bridge, pump_session).await;
        });

        let camera = Arc::clone(&self.camera);
        let session = self.session.clone();
        let request = self.bind_request.clone();
        let ui_weak = self.ui.as_weak();

        let queued = slint::invoke_from_event_loop(move || {
            if !session.read(|s| s.is_active()) {
                tracing::debug!("Session ended before the camera was bound");
                return;
            }

            let bound = lock_camera(&camera).bind(request, events_tx);
            match bound {
                Ok(max_zoom_ratio) => {
                    session.on_camera_bound(max_zoom_ratio);
                }
                Err(e) => {
                    if let Some(ui) = ui_weak.upgrade() {
                        ui.set_status_text(format!("Camera unavailable: {}", e).into());
                    }
                    session.fail(e);
                }
            }
        });

        if let Err(e) = queued {
            tracing::error!("Failed to schedule camera bind: {:?}", e);
            self.session.fail(crate::models::ScanError::CameraBind(format!(
                "event loop unavailable: {:?}",
                e
            )));
        }
    }

    /// Forward camera events until the camera or the UI goes away
    ///
    /// Preview frames may be dropped under load. Decode batches and errors are
    /// delivered to the session on the UI thread, in camera order.
    async fn pump_camera_events(
        mut events_rx: mpsc::Receiver<CameraEvent>,
        bridge: EventLoopBridgeHandle<ScannerWindow>,
        session: SessionManager,
    ) {
        tracing::debug!("Camera event pump started");

        while let Some(event) = events_rx.recv().await {
            match event {
                CameraEvent::Preview(frame) => {
                    let buffer = preview_buffer(frame);
                    if !bridge.update_ui(move |ui| {
                        ui.set_preview_frame(slint::Image::from_rgba8(buffer));
                    }) {
                        session.metrics().record_preview_dropped();
                    }
                }
                CameraEvent::TorchChanged(enabled) => {
                    session.on_torch_changed(enabled);
                }
                CameraEvent::ZoomChanged(ratio) => {
                    session.on_zoom_changed(ratio);
                }
                CameraEvent::Barcodes(batch) => {
                    let session = session.clone();
                    let queued = bridge
                        .update_ui_ordered(move |_| {
                            session.on_frame_batch(batch);
                        })
                        .await;
                    if !queued {
                        break;
                    }
                }
                CameraEvent::Error(error) => {
                    let session = session.clone();
                    bridge
                        .update_ui_ordered(move |_| {
                            session.fail(error);
                        })
                        .await;
                    break;
                }
            }
        }

        tracing::debug!("Camera event pump terminated");
    }

    /// Apply guide size and overlay colors from the config
    fn apply_appearance(ui: &ScannerWindow, settings: &ScannerSettings) {
        ui.set_guide_size(settings.guide_frame_size);

        let colors = &settings.colors;
        if let Some(color) = slint_color(&colors.container) {
            ui.set_container_color(color);
        }
        if let Some(color) = slint_color(&colors.content) {
            ui.set_content_color(color);
        }
        if let Some(color) = slint_color(&colors.guide) {
            ui.set_guide_color(color);
        }
    }

    /// Synchronize UI with current session state
    fn sync_ui_with_state(ui: &ScannerWindow, session: &SessionManager) {
        let state = session.snapshot();

        ui.set_torch_enabled(state.torch_enabled);
        ui.set_zoom_ratio(state.zoom_ratio);
        ui.set_max_zoom_ratio(state.max_zoom_ratio);
        ui.set_sheet_items(ModelRc::new(VecModel::from(sheet_items(
            &state.pending_barcodes(),
        ))));
        ui.set_sheet_visible(state.sheet_visible);
        ui.set_camera_ready(state.camera_bound);

        tracing::debug!("UI synchronized with session state");
    }

    /// Set up Slint UI callbacks
    ///
    /// All of these run on the UI thread.
    fn setup_callbacks(ui: &ScannerWindow, session: &SessionManager, camera: &SharedCamera) {
        // Cancel (close button)
        let session_clone = session.clone();
        ui.on_cancel_requested(move || {
            tracing::info!("Cancel requested");
            session_clone.cancel();
        });

        // Torch switch; every camera report is echoed back, so a refused request flips it off again
        let camera_clone = Arc::clone(camera);
        ui.on_torch_toggled(move |enabled| {
            tracing::debug!("Torch toggled: {}", enabled);
            lock_camera(&camera_clone).set_torch(enabled);
        });

        // Zoom slider
        let session_clone = session.clone();
        let camera_clone = Arc::clone(camera);
        ui.on_zoom_changed(move |ratio| {
            let clamped = session_clone.clamp_zoom_request(ratio);
            tracing::trace!("Zoom requested: {} (clamped {})", ratio, clamped);
            lock_camera(&camera_clone).set_zoom(clamped);
        });

        // Sheet pick
        let session_clone = session.clone();
        ui.on_barcode_selected(move |index| {
            match usize::try_from(index) {
                Ok(index) => {
                    session_clone.select_pending_at(index);
                }
                Err(_) => tracing::warn!("Ignoring negative sheet index {}", index),
            }
        });

        // Sheet scrim tap
        let session_clone = session.clone();
        ui.on_sheet_dismissed(move || {
            session_clone.dismiss_sheet();
        });

        // Window close: release the camera, no result
        let camera_clone = Arc::clone(camera);
        ui.window().on_close_requested(move || {
            tracing::info!("Scanner window closed");
            lock_camera(&camera_clone).dispose();
            slint::CloseRequestResponse::HideWindow
        });
    }

    /// Subscribe to session changes and update the UI
    ///
    /// Runs on a dedicated thread. State changes wait for bridge queue space
    /// rather than being dropped, and a lagging receiver resyncs from a
    /// snapshot. A session that ended (cancel or failure) releases the camera
    /// from here.
    fn setup_session_subscription(
        bridge: &EventLoopBridge<ScannerWindow>,
        session: &SessionManager,
        camera: &SharedCamera,
    ) {
        let bridge_handle = bridge.clone_handle();
        let camera = Arc::clone(camera);
        let session = session.clone();
        let mut rx = session.subscribe();

        let spawned = std::thread::Builder::new()
            .name("kscan-session-sync".to_string())
            .spawn(move || {
                tracing::debug!("Session subscription thread started");

                loop {
                    match rx.blocking_recv() {
                        Ok(change) => {
                            tracing::trace!("Session change received: {:?}", change);
                            if !Self::apply_change(&bridge_handle, &camera, change) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Session subscription lagged, skipped {} changes", skipped);
                            let session = session.clone();
                            if !bridge_handle
                                .update_ui_blocking(move |ui| Self::sync_ui_with_state(ui, &session))
                            {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                tracing::debug!("Session subscription thread terminated");
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn session subscription thread: {}", e);
        }
    }

    /// Push one session change to the window
    ///
    /// # Returns
    /// `false` once the UI is gone
    fn apply_change(
        bridge: &EventLoopBridgeHandle<ScannerWindow>,
        camera: &SharedCamera,
        change: SessionChange,
    ) -> bool {
        match change {
            SessionChange::CameraBindingChanged { bound } => {
                bridge.update_ui_blocking(move |ui| ui.set_camera_ready(bound))
            }
            SessionChange::TorchChanged { enabled } => {
                bridge.update_ui_blocking(move |ui| ui.set_torch_enabled(enabled))
            }
            SessionChange::ZoomChanged { ratio, max_ratio } => bridge.update_ui_blocking(move |ui| {
                ui.set_max_zoom_ratio(max_ratio);
                ui.set_zoom_ratio(ratio);
            }),
            SessionChange::SheetOpened { barcodes } => {
                let items = sheet_items(&barcodes);
                bridge.update_ui_blocking(move |ui| {
                    ui.set_sheet_items(ModelRc::new(VecModel::from(items)));
                    ui.set_sheet_visible(true);
                })
            }
            SessionChange::SheetClosed => bridge.update_ui_blocking(|ui| {
                ui.set_sheet_visible(false);
                if ui.get_sheet_items().row_count() > 0 {
                    ui.set_sheet_items(ModelRc::default());
                }
            }),
            SessionChange::ResultDelivered { kind } => {
                tracing::debug!("Result delivered: {:?}", kind);
                true
            }
            SessionChange::SessionEnded => {
                lock_camera(camera).dispose();
                bridge.update_ui_blocking(|ui| ui.set_sheet_visible(false))
            }
        }
    }
}

impl Drop for ScannerController {
    fn drop(&mut self) {
        lock_camera(&self.camera).dispose();
    }
}

/// Sheet rows for the pending barcodes, in sheet order
pub fn sheet_items(barcodes: &[Barcode]) -> Vec<SheetItem> {
    barcodes
        .iter()
        .map(|barcode| SheetItem {
            payload: barcode.data.as_str().into(),
            format: barcode.format.display_name().into(),
        })
        .collect()
}

/// Parse a `#RRGGBB` config color for Slint, warning on bad input
pub fn slint_color(value: &str) -> Option<slint::Color> {
    match parse_hex_color(value) {
        Some((r, g, b)) => Some(slint::Color::from_rgb_u8(r, g, b)),
        None => {
            tracing::warn!("Ignoring invalid color {:?}; expected #RRGGBB", value);
            None
        }
    }
}

fn preview_buffer(frame: PreviewFrame) -> SharedPixelBuffer<Rgba8Pixel> {
    SharedPixelBuffer::clone_from_slice(&frame.rgba, frame.width, frame.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BarcodeFormat;

    #[test]
    fn test_sheet_items_keep_order() {
        let barcodes = vec![
            Barcode::new("b", BarcodeFormat::QrCode),
            Barcode::new("a", BarcodeFormat::Ean13),
        ];

        let items = sheet_items(&barcodes);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload, "b");
        assert_eq!(items[0].format, "QR Code");
        assert_eq!(items[1].payload, "a");
    }

    #[test]
    fn test_slint_color() {
        assert_eq!(
            slint_color("#1B1B1F"),
            Some(slint::Color::from_rgb_u8(0x1B, 0x1B, 0x1F))
        );
        assert_eq!(slint_color("not a color"), None);
    }

    #[test]
    fn test_preview_buffer_dimensions() {
        let frame = PreviewFrame {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 255, 0, 255],
        };

        let buffer = preview_buffer(frame);

        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.height(), 1);
        assert_eq!(&buffer.as_bytes()[4..8], &[0u8, 255, 0, 255]);
    }
}

//! Services module - camera, decoding and aggregation logic behind the scanner UI.
//!
//! Nothing in here depends on Slint; the UI layer talks to these services through
//! [`SessionManager`](crate::state::SessionManager) and [`CameraSession`].
//!
//! # Components
//!
//! - [`CameraBackend`]: platform seam (`bind`, `unbind`, `set_torch`, `set_zoom`). Backends push
//!   [`CameraEvent`]s (preview frames, decode batches, torch/zoom changes, errors) over a bounded
//!   tokio channel.
//! - [`CameraSession`]: scoped binding that unbinds deterministically on dispose or drop.
//! - [`ThreadedCamera`]: runs any [`FrameSource`] on a worker thread with digital zoom.
//!   Sources: [`StillImageSource`] (image files) and, with the `native-camera` feature,
//!   `NativeCameraSource` (webcam via nokhwa).
//! - [`BarcodeDecoder`] / [`MultiFormatDecoder`] / [`FrameAnalyzer`]: frame-to-barcode decoding restricted
//!   to the requested formats, deduplicated by value.
//! - [`ScanAggregator`]: single match vs. multi-match disambiguation policy.

pub mod aggregator;
pub mod camera;
pub mod capture;
pub mod decoder;
#[cfg(feature = "native-camera")]
pub mod native;
pub mod still;

pub use aggregator::{BatchOutcome, ScanAggregator};
pub use camera::{
    BindRequest, CAMERA_EVENT_BUFFER, CameraBackend, CameraBinding, CameraEvent, CameraEventSender,
    CameraHandle, CameraSession, PreviewFrame,
};
pub use capture::{FrameSource, SourceCapabilities, ThreadedCamera, apply_digital_zoom};
pub use decoder::{BarcodeDecoder, FrameAnalyzer, MultiFormatDecoder, QrDecoder};
#[cfg(feature = "native-camera")]
pub use native::{NativeCameraSettings, NativeCameraSource};
pub use still::{StillImageSettings, StillImageSource};

use crate::metrics::ScanMetrics;
use crate::models::{CameraSettings, CameraSource, ScanError};
use std::sync::Arc;
use std::time::Duration;

/// Build the camera backend selected by `settings.source`.
///
/// # Errors
///
/// [`ScanError::CameraBind`] when the native source is requested but the crate
/// was built without the `native-camera` feature.
pub fn camera_backend(
    settings: &CameraSettings,
    metrics: Arc<ScanMetrics>,
) -> Result<Box<dyn CameraBackend>, ScanError> {
    let interval = Duration::from_millis(settings.frame_interval_ms);

    match settings.source {
        CameraSource::Still => Ok(Box::new(ThreadedCamera::<StillImageSource>::new(
            StillImageSettings::from(settings),
            interval,
            metrics,
        ))),
        #[cfg(feature = "native-camera")]
        CameraSource::Native => Ok(Box::new(ThreadedCamera::<NativeCameraSource>::new(
            NativeCameraSettings::from(settings),
            interval,
            metrics,
        ))),
        #[cfg(not(feature = "native-camera"))]
        CameraSource::Native => Err(ScanError::CameraBind(
            "native camera support not compiled in (enable the `native-camera` feature)"
                .to_string(),
        )),
    }
}

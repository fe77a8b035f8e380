use crate::models::{Barcode, ScanError};
use crate::services::decoder::FrameAnalyzer;
use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the camera event channel.
///
/// Preview frames beyond this are dropped (keep-only-latest behaviour);
/// barcode batches and control events wait for room instead.
pub const CAMERA_EVENT_BUFFER: usize = 16;

/// Events a bound camera reports back to the scanner
#[derive(Debug, Clone)]
pub enum CameraEvent {
    /// Frame to show in the preview surface
    Preview(PreviewFrame),

    /// Decode batch for one analyzed frame, deduplicated by value
    Barcodes(Vec<Barcode>),

    /// Actual torch state after a change request (may differ from the request)
    TorchChanged(bool),

    /// Actual zoom ratio after a change request
    ZoomChanged(f32),

    /// Capture or analysis failure; the camera stops after sending this
    Error(ScanError),
}

pub type CameraEventSender = mpsc::Sender<CameraEvent>;

/// RGBA8 preview image, independent of the UI toolkit
#[derive(Clone)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PreviewFrame {
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        }
    }
}

impl std::fmt::Debug for PreviewFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PreviewFrame({}x{})", self.width, self.height)
    }
}

/// Opaque id of a bound camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub u64);

/// Result of a successful bind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBinding {
    pub handle: CameraHandle,
    /// Reported once per bind; fixed for the session
    pub max_zoom_ratio: f32,
}

/// What a backend needs to start streaming
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub analyzer: Arc<FrameAnalyzer>,
    pub target_width: u32,
    pub target_height: u32,
}

/// Platform camera capabilities the scanner depends on.
///
/// A backend owns the device and its background executor. After `bind` it
/// sends preview frames, decode batches and state changes through the event
/// sender until `unbind` returns; nothing may be sent after that.
#[cfg_attr(test, mockall::automock)]
pub trait CameraBackend: Send {
    fn bind(
        &mut self,
        request: BindRequest,
        events: CameraEventSender,
    ) -> Result<CameraBinding, ScanError>;

    /// Stop streaming and release the device. Blocks until the worker is gone.
    fn unbind(&mut self, handle: CameraHandle);

    /// Request a torch state; the actual state arrives as [`CameraEvent::TorchChanged`].
    fn set_torch(&mut self, handle: CameraHandle, enabled: bool) -> Result<(), ScanError>;

    /// Request a zoom ratio; the applied ratio arrives as [`CameraEvent::ZoomChanged`].
    fn set_zoom(&mut self, handle: CameraHandle, ratio: f32) -> Result<(), ScanError>;
}

/// Scoped camera binding.
///
/// Unbinds the backend on [`dispose`](Self::dispose) or when dropped, so a
/// disposed scanner never receives another camera event.
pub struct CameraSession {
    backend: Box<dyn CameraBackend>,
    binding: Option<CameraBinding>,
}

impl CameraSession {
    pub fn new(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            binding: None,
        }
    }

    /// Bind the camera, replacing any previous binding.
    ///
    /// # Returns
    /// The max zoom ratio reported by the backend
    pub fn bind(&mut self, request: BindRequest, events: CameraEventSender) -> Result<f32, ScanError> {
        self.dispose();

        let binding = self.backend.bind(request, events)?;
        tracing::info!(
            "Camera bound: handle={:?}, max_zoom={}",
            binding.handle,
            binding.max_zoom_ratio
        );

        self.binding = Some(binding);
        Ok(binding.max_zoom_ratio)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn set_torch(&mut self, enabled: bool) {
        let Some(binding) = self.binding else {
            tracing::debug!("Torch request ignored: camera not bound");
            return;
        };

        if let Err(e) = self.backend.set_torch(binding.handle, enabled) {
            tracing::warn!("Torch request refused: {}", e);
        }
    }

    pub fn set_zoom(&mut self, ratio: f32) {
        let Some(binding) = self.binding else {
            tracing::debug!("Zoom request ignored: camera not bound");
            return;
        };

        if let Err(e) = self.backend.set_zoom(binding.handle, ratio) {
            tracing::warn!("Zoom request refused: {}", e);
        }
    }

    /// Unbind the camera if bound. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(binding) = self.binding.take() {
            tracing::info!("Unbinding camera {:?}", binding.handle);
            self.backend.unbind(binding.handle);
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BarcodeFormat;
    use mockall::predicate::eq;

    fn request() -> BindRequest {
        BindRequest {
            analyzer: Arc::new(FrameAnalyzer::standard(vec![BarcodeFormat::QrCode])),
            target_width: 1200,
            target_height: 720,
        }
    }

    fn bound_backend() -> MockCameraBackend {
        let mut backend = MockCameraBackend::new();
        backend.expect_bind().times(1).returning(|_, _| {
            Ok(CameraBinding {
                handle: CameraHandle(7),
                max_zoom_ratio: 3.0,
            })
        });
        backend
    }

    #[test]
    fn test_bind_reports_max_zoom() {
        let mut backend = bound_backend();
        backend.expect_unbind().times(1).return_const(());

        let (tx, _rx) = mpsc::channel(CAMERA_EVENT_BUFFER);
        let mut session = CameraSession::new(Box::new(backend));

        assert_eq!(session.bind(request(), tx).unwrap(), 3.0);
        assert!(session.is_bound());
    }

    #[test]
    fn test_drop_unbinds_exactly_once() {
        let mut backend = bound_backend();
        backend
            .expect_unbind()
            .with(eq(CameraHandle(7)))
            .times(1)
            .return_const(());

        let (tx, _rx) = mpsc::channel(CAMERA_EVENT_BUFFER);
        let mut session = CameraSession::new(Box::new(backend));
        session.bind(request(), tx).unwrap();

        session.dispose();
        assert!(!session.is_bound());
        // Drop after an explicit dispose must not unbind again
        drop(session);
    }

    #[test]
    fn test_bind_failure_leaves_session_unbound() {
        let mut backend = MockCameraBackend::new();
        backend
            .expect_bind()
            .returning(|_, _| Err(ScanError::CameraBind("no device".into())));
        backend.expect_unbind().never();

        let (tx, _rx) = mpsc::channel(CAMERA_EVENT_BUFFER);
        let mut session = CameraSession::new(Box::new(backend));

        let err = session.bind(request(), tx).unwrap_err();
        assert_eq!(err, ScanError::CameraBind("no device".into()));
        assert!(!session.is_bound());
    }

    #[test]
    fn test_torch_and_zoom_forwarded_to_handle() {
        let mut backend = bound_backend();
        backend
            .expect_set_torch()
            .with(eq(CameraHandle(7)), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        backend
            .expect_set_zoom()
            .with(eq(CameraHandle(7)), eq(2.0f32))
            .times(1)
            .returning(|_, _| Ok(()));
        backend.expect_unbind().return_const(());

        let (tx, _rx) = mpsc::channel(CAMERA_EVENT_BUFFER);
        let mut session = CameraSession::new(Box::new(backend));
        session.bind(request(), tx).unwrap();

        session.set_torch(true);
        session.set_zoom(2.0);
    }

    #[test]
    fn test_requests_ignored_when_unbound() {
        let mut backend = MockCameraBackend::new();
        backend.expect_set_torch().never();
        backend.expect_set_zoom().never();

        let mut session = CameraSession::new(Box::new(backend));
        session.set_torch(true);
        session.set_zoom(2.0);
    }

    #[test]
    fn test_torch_refusal_is_not_fatal() {
        let mut backend = bound_backend();
        backend
            .expect_set_torch()
            .returning(|_, _| Err(ScanError::Capture("no torch".into())));
        backend.expect_unbind().return_const(());

        let (tx, _rx) = mpsc::channel(CAMERA_EVENT_BUFFER);
        let mut session = CameraSession::new(Box::new(backend));
        session.bind(request(), tx).unwrap();

        session.set_torch(true);
        assert!(session.is_bound());
    }

    #[test]
    fn test_preview_frame_from_image() {
        let image = DynamicImage::new_rgb8(4, 2);
        let frame = PreviewFrame::from_image(&image);

        assert_eq!(frame.width, 4);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.rgba.len(), 4 * 2 * 4);
    }
}

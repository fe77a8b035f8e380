// Capture worker shared by every frame-producing backend
//
// A FrameSource is opened on its own std::thread (device handles are often
// !Send), then the worker loop pulls frames, applies digital zoom, publishes a
// preview and an analyzed batch per frame, and reacts to torch/zoom requests
// sent through watch channels.

use crate::metrics::ScanMetrics;
use crate::models::{MIN_ZOOM_RATIO, ScanError};
use crate::services::camera::{
    BindRequest, CameraBackend, CameraBinding, CameraEvent, CameraEventSender, CameraHandle,
    PreviewFrame,
};
use image::DynamicImage;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// What a source can do once opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCapabilities {
    pub has_torch: bool,
    pub max_zoom_ratio: f32,
}

/// A device or file set that produces frames on the worker thread.
pub trait FrameSource: Sized + 'static {
    /// Everything needed to open the source; moved into the worker thread
    type Settings: Clone + Send + 'static;

    fn open(settings: &Self::Settings, request: &BindRequest) -> Result<Self, ScanError>;

    /// Next frame, or `None` when nothing is available right now.
    fn grab(&mut self) -> Result<Option<DynamicImage>, ScanError>;

    fn capabilities(&self) -> SourceCapabilities;
}

/// Center-crop `image` to emulate an optical zoom of `ratio`.
///
/// Ratios at or below 1.0 return the image unchanged.
pub fn apply_digital_zoom(image: DynamicImage, ratio: f32) -> DynamicImage {
    if ratio <= MIN_ZOOM_RATIO || !ratio.is_finite() {
        return image;
    }

    let (width, height) = (image.width(), image.height());
    let crop_width = ((width as f32 / ratio).round() as u32).clamp(1, width.max(1));
    let crop_height = ((height as f32 / ratio).round() as u32).clamp(1, height.max(1));
    let x = (width - crop_width) / 2;
    let y = (height - crop_height) / 2;

    image.crop_imm(x, y, crop_width, crop_height)
}

struct Worker {
    handle: CameraHandle,
    stop_tx: watch::Sender<bool>,
    torch_tx: watch::Sender<bool>,
    zoom_tx: watch::Sender<f32>,
    join: JoinHandle<()>,
}

/// [`CameraBackend`] that runs a [`FrameSource`] on a dedicated thread
pub struct ThreadedCamera<S: FrameSource> {
    settings: S::Settings,
    frame_interval: Duration,
    metrics: Arc<ScanMetrics>,
    next_handle: u64,
    worker: Option<Worker>,
}

impl<S: FrameSource> ThreadedCamera<S> {
    pub fn new(settings: S::Settings, frame_interval: Duration, metrics: Arc<ScanMetrics>) -> Self {
        Self {
            settings,
            frame_interval,
            metrics,
            next_handle: 1,
            worker: None,
        }
    }

    fn worker_for(&self, handle: CameraHandle) -> Result<&Worker, ScanError> {
        self.worker
            .as_ref()
            .filter(|w| w.handle == handle)
            .ok_or_else(|| ScanError::Capture(format!("camera {:?} is not bound", handle)))
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(true);
            if worker.join.join().is_err() {
                tracing::error!("Camera worker {:?} panicked", worker.handle);
            }
            tracing::debug!("Camera worker {:?} stopped", worker.handle);
        }
    }
}

impl<S: FrameSource> CameraBackend for ThreadedCamera<S> {
    fn bind(
        &mut self,
        request: BindRequest,
        events: CameraEventSender,
    ) -> Result<CameraBinding, ScanError> {
        // One camera per backend: rebinding replaces the previous stream
        self.stop_worker();

        let handle = CameraHandle(self.next_handle);
        self.next_handle += 1;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (torch_tx, torch_rx) = watch::channel(false);
        let (zoom_tx, zoom_rx) = watch::channel(MIN_ZOOM_RATIO);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let settings = self.settings.clone();
        let metrics = Arc::clone(&self.metrics);
        let frame_interval = self.frame_interval;

        let join = std::thread::Builder::new()
            .name(format!("kscan-camera-{}", handle.0))
            .spawn(move || {
                let source = match S::open(&settings, &request) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let capabilities = source.capabilities();
                if ready_tx.send(Ok(capabilities)).is_err() {
                    return;
                }

                let channels = WorkerChannels {
                    events,
                    stop_rx,
                    torch_rx,
                    zoom_rx,
                };
                run_capture_loop(source, capabilities, &request, channels, frame_interval, &metrics);
            })
            .map_err(|e| ScanError::CameraBind(format!("failed to spawn camera thread: {}", e)))?;

        let capabilities = match ready_rx.recv() {
            Ok(Ok(capabilities)) => capabilities,
            Ok(Err(e)) => {
                let _ = join.join();
                return Err(e);
            }
            Err(_) => {
                let _ = join.join();
                return Err(ScanError::CameraBind(
                    "camera thread exited before opening the source".to_string(),
                ));
            }
        };

        self.worker = Some(Worker {
            handle,
            stop_tx,
            torch_tx,
            zoom_tx,
            join,
        });

        Ok(CameraBinding {
            handle,
            max_zoom_ratio: capabilities.max_zoom_ratio.max(MIN_ZOOM_RATIO),
        })
    }

    fn unbind(&mut self, handle: CameraHandle) {
        if self.worker.as_ref().is_some_and(|w| w.handle == handle) {
            self.stop_worker();
        } else {
            tracing::debug!("Unbind for unknown camera {:?} ignored", handle);
        }
    }

    fn set_torch(&mut self, handle: CameraHandle, enabled: bool) -> Result<(), ScanError> {
        let worker = self.worker_for(handle)?;
        worker
            .torch_tx
            .send(enabled)
            .map_err(|_| ScanError::Capture("camera worker has stopped".to_string()))
    }

    fn set_zoom(&mut self, handle: CameraHandle, ratio: f32) -> Result<(), ScanError> {
        let worker = self.worker_for(handle)?;
        worker
            .zoom_tx
            .send(ratio)
            .map_err(|_| ScanError::Capture("camera worker has stopped".to_string()))
    }
}

impl<S: FrameSource> Drop for ThreadedCamera<S> {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

struct WorkerChannels {
    events: CameraEventSender,
    stop_rx: watch::Receiver<bool>,
    torch_rx: watch::Receiver<bool>,
    zoom_rx: watch::Receiver<f32>,
}

fn run_capture_loop<S: FrameSource>(
    mut source: S,
    capabilities: SourceCapabilities,
    request: &BindRequest,
    mut channels: WorkerChannels,
    frame_interval: Duration,
    metrics: &ScanMetrics,
) {
    tracing::info!("Camera capture loop started ({:?})", capabilities);
    let mut zoom = MIN_ZOOM_RATIO;

    loop {
        if *channels.stop_rx.borrow() {
            break;
        }

        if channels.torch_rx.has_changed().unwrap_or(false) {
            let requested = *channels.torch_rx.borrow_and_update();
            let actual = requested && capabilities.has_torch;
            if requested != actual {
                tracing::info!("Torch unavailable on this camera; staying off");
            }
            if !send_event(&channels, CameraEvent::TorchChanged(actual)) {
                break;
            }
        }

        if channels.zoom_rx.has_changed().unwrap_or(false) {
            let requested = *channels.zoom_rx.borrow_and_update();
            zoom = if requested.is_finite() {
                requested.clamp(MIN_ZOOM_RATIO, capabilities.max_zoom_ratio.max(MIN_ZOOM_RATIO))
            } else {
                MIN_ZOOM_RATIO
            };
            if !send_event(&channels, CameraEvent::ZoomChanged(zoom)) {
                break;
            }
        }

        match source.grab() {
            Ok(Some(frame)) => {
                let frame = apply_digital_zoom(frame, zoom);

                match channels
                    .events
                    .try_send(CameraEvent::Preview(PreviewFrame::from_image(&frame)))
                {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => metrics.record_preview_dropped(),
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }

                let event = match request.analyzer.analyze(&frame) {
                    Ok(batch) => CameraEvent::Barcodes(batch),
                    Err(e) => {
                        tracing::error!("Frame analysis failed: {}", e);
                        let _ = send_event(&channels, CameraEvent::Error(e));
                        break;
                    }
                };
                if !send_event(&channels, event) {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Frame capture failed: {}", e);
                let _ = send_event(&channels, CameraEvent::Error(e));
                break;
            }
        }

        std::thread::sleep(frame_interval);
    }

    tracing::info!("Camera capture loop ended");
}

/// Send from the worker thread, waiting for room without ignoring a stop request.
///
/// Returns false once the receiver is gone or the worker was told to stop.
fn send_event(channels: &WorkerChannels, mut event: CameraEvent) -> bool {
    loop {
        match channels.events.try_send(event) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(returned)) => {
                if *channels.stop_rx.borrow() {
                    return false;
                }
                event = returned;
                std::thread::sleep(SEND_RETRY_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Barcode, BarcodeFormat};
    use crate::services::decoder::{FrameAnalyzer, MockBarcodeDecoder};

    #[derive(Clone)]
    struct ScriptSettings {
        frames: usize,
        fail_open: bool,
        has_torch: bool,
    }

    struct ScriptSource {
        remaining: usize,
        has_torch: bool,
    }

    impl FrameSource for ScriptSource {
        type Settings = ScriptSettings;

        fn open(settings: &Self::Settings, _request: &BindRequest) -> Result<Self, ScanError> {
            if settings.fail_open {
                return Err(ScanError::CameraBind("device busy".into()));
            }
            Ok(Self {
                remaining: settings.frames,
                has_torch: settings.has_torch,
            })
        }

        fn grab(&mut self) -> Result<Option<DynamicImage>, ScanError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(DynamicImage::new_luma8(40, 20)))
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities {
                has_torch: self.has_torch,
                max_zoom_ratio: 2.0,
            }
        }
    }

    fn request() -> BindRequest {
        let mut decoder = MockBarcodeDecoder::new();
        decoder
            .expect_supported_formats()
            .returning(|| vec![BarcodeFormat::QrCode]);
        decoder
            .expect_decode()
            .returning(|_, _| Ok(vec![Barcode::new("frame", BarcodeFormat::QrCode)]));

        BindRequest {
            analyzer: Arc::new(FrameAnalyzer::new(
                Arc::new(decoder),
                vec![BarcodeFormat::QrCode],
            )),
            target_width: 40,
            target_height: 20,
        }
    }

    fn camera(frames: usize, fail_open: bool, has_torch: bool) -> ThreadedCamera<ScriptSource> {
        ThreadedCamera::new(
            ScriptSettings {
                frames,
                fail_open,
                has_torch,
            },
            Duration::from_millis(1),
            Arc::new(ScanMetrics::new()),
        )
    }

    fn next_matching<F>(rx: &mut mpsc::Receiver<CameraEvent>, pred: F) -> CameraEvent
    where
        F: Fn(&CameraEvent) -> bool,
    {
        loop {
            let event = rx.blocking_recv().expect("camera channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_digital_zoom_crops_center() {
        let image = DynamicImage::new_rgb8(100, 50);

        let zoomed = apply_digital_zoom(image.clone(), 2.0);
        assert_eq!((zoomed.width(), zoomed.height()), (50, 25));

        let unchanged = apply_digital_zoom(image, 1.0);
        assert_eq!((unchanged.width(), unchanged.height()), (100, 50));
    }

    #[test]
    fn test_bind_failure_is_reported_synchronously() {
        let mut camera = camera(0, true, false);
        let (tx, _rx) = mpsc::channel(8);

        let err = camera.bind(request(), tx).unwrap_err();
        assert_eq!(err, ScanError::CameraBind("device busy".into()));
    }

    #[test]
    fn test_frames_produce_preview_and_batches() {
        let mut camera = camera(3, false, false);
        let (tx, mut rx) = mpsc::channel(8);

        let binding = camera.bind(request(), tx).unwrap();
        assert_eq!(binding.max_zoom_ratio, 2.0);

        let event = next_matching(&mut rx, |e| matches!(e, CameraEvent::Barcodes(_)));
        match event {
            CameraEvent::Barcodes(batch) => {
                assert_eq!(batch, vec![Barcode::new("frame", BarcodeFormat::QrCode)]);
            }
            other => panic!("unexpected event {:?}", other),
        }

        camera.unbind(binding.handle);
    }

    #[test]
    fn test_torch_reports_actual_state() {
        let mut camera = camera(0, false, false);
        let (tx, mut rx) = mpsc::channel(8);
        let binding = camera.bind(request(), tx).unwrap();

        camera.set_torch(binding.handle, true).unwrap();
        let event = next_matching(&mut rx, |e| matches!(e, CameraEvent::TorchChanged(_)));
        assert!(matches!(event, CameraEvent::TorchChanged(false)));

        camera.unbind(binding.handle);
    }

    #[test]
    fn test_zoom_is_clamped_to_capabilities() {
        let mut camera = camera(0, false, true);
        let (tx, mut rx) = mpsc::channel(8);
        let binding = camera.bind(request(), tx).unwrap();

        camera.set_zoom(binding.handle, 9.0).unwrap();
        let event = next_matching(&mut rx, |e| matches!(e, CameraEvent::ZoomChanged(_)));
        assert!(matches!(event, CameraEvent::ZoomChanged(z) if z == 2.0));

        camera.unbind(binding.handle);
    }

    #[test]
    fn test_unbind_stops_events() {
        let mut camera = camera(usize::MAX, false, false);
        let (tx, mut rx) = mpsc::channel(8);
        let binding = camera.bind(request(), tx).unwrap();

        camera.unbind(binding.handle);

        // Worker is joined and its sender dropped: the channel drains then closes
        while rx.blocking_recv().is_some() {}
        assert!(camera.set_torch(binding.handle, true).is_err());
    }
}

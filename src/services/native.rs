//! Live webcam source through `nokhwa` (feature `native-camera`).

use crate::models::{CameraSettings, ScanError};
use crate::services::camera::BindRequest;
use crate::services::capture::{FrameSource, SourceCapabilities};
use image::{DynamicImage, RgbImage};
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};

#[derive(Debug, Clone, PartialEq)]
pub struct NativeCameraSettings {
    pub device_index: u32,
    pub frame_rate: u32,
    pub max_zoom_ratio: f32,
}

impl From<&CameraSettings> for NativeCameraSettings {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device_index: settings.device_index,
            frame_rate: settings.frame_rate,
            max_zoom_ratio: settings.max_zoom_ratio,
        }
    }
}

/// Webcam opened on the capture worker thread.
///
/// Webcams expose no torch through nokhwa, so torch requests always report
/// off; zoom is digital.
pub struct NativeCameraSource {
    camera: Camera,
    max_zoom_ratio: f32,
}

impl FrameSource for NativeCameraSource {
    type Settings = NativeCameraSettings;

    fn open(settings: &Self::Settings, request: &BindRequest) -> Result<Self, ScanError> {
        let format = CameraFormat::new(
            Resolution::new(request.target_width, request.target_height),
            FrameFormat::MJPEG,
            settings.frame_rate,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(CameraIndex::Index(settings.device_index), requested)
            .map_err(|e| ScanError::CameraBind(format!("failed to open camera: {}", e)))?;

        camera
            .open_stream()
            .map_err(|e| ScanError::CameraBind(format!("failed to start camera stream: {}", e)))?;

        tracing::info!(
            "Camera opened: {:?} at {:?}",
            camera.info().human_name(),
            camera.resolution()
        );

        Ok(Self {
            camera,
            max_zoom_ratio: settings.max_zoom_ratio,
        })
    }

    fn grab(&mut self) -> Result<Option<DynamicImage>, ScanError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| ScanError::Capture(format!("frame capture error: {}", e)))?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| ScanError::Capture(format!("frame decode error: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        let rgb = RgbImage::from_raw(width, height, decoded.into_raw()).ok_or_else(|| {
            ScanError::Capture(format!("frame buffer does not match {}x{}", width, height))
        })?;

        Ok(Some(DynamicImage::ImageRgb8(rgb)))
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            has_torch: false,
            max_zoom_ratio: self.max_zoom_ratio,
        }
    }
}

impl Drop for NativeCameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

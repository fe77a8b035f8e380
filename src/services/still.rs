use crate::models::{CameraSettings, ScanError};
use crate::services::camera::BindRequest;
use crate::services::capture::{FrameSource, SourceCapabilities};
use camino::{Utf8Path, Utf8PathBuf};
use image::DynamicImage;
use std::fs;

/// File extensions the still-image source will replay
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

#[derive(Debug, Clone, PartialEq)]
pub struct StillImageSettings {
    pub image_dir: Utf8PathBuf,
    pub repeat: bool,
    pub max_zoom_ratio: f32,
    pub has_torch: bool,
}

impl From<&CameraSettings> for StillImageSettings {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            image_dir: settings.image_dir.clone(),
            repeat: settings.repeat,
            max_zoom_ratio: settings.max_zoom_ratio,
            has_torch: settings.has_torch,
        }
    }
}

/// Replays image files from a directory as if they were camera frames.
///
/// Files are served in name order. With `repeat` the sequence loops,
/// otherwise the source goes idle after the last file.
pub struct StillImageSource {
    files: Vec<Utf8PathBuf>,
    position: usize,
    settings: StillImageSettings,
}

impl StillImageSource {
    /// List the image files in `dir`, sorted by name.
    pub fn list_images(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ScanError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| ScanError::CameraBind(format!("cannot read image directory {}: {}", dir, e)))?;

        let mut files: Vec<Utf8PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        Ok(files)
    }
}

impl FrameSource for StillImageSource {
    type Settings = StillImageSettings;

    fn open(settings: &Self::Settings, _request: &BindRequest) -> Result<Self, ScanError> {
        let files = Self::list_images(&settings.image_dir)?;
        if files.is_empty() {
            return Err(ScanError::CameraBind(format!(
                "no images found in {}",
                settings.image_dir
            )));
        }

        tracing::info!(
            "Still-image camera opened: {} images from {}",
            files.len(),
            settings.image_dir
        );

        Ok(Self {
            files,
            position: 0,
            settings: settings.clone(),
        })
    }

    fn grab(&mut self) -> Result<Option<DynamicImage>, ScanError> {
        if self.position >= self.files.len() {
            if !self.settings.repeat {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;

        let image = image::open(path)
            .map_err(|e| ScanError::Capture(format!("cannot load {}: {}", path, e)))?;
        tracing::trace!("Replaying {} ({}x{})", path, image.width(), image.height());

        Ok(Some(image))
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            has_torch: self.settings.has_torch,
            max_zoom_ratio: self.settings.max_zoom_ratio,
        }
    }
}

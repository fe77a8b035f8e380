use crate::models::barcode::BarcodeFormat;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Scanner configuration from `kscan.yaml`
///
/// Every section falls back to its defaults, so an empty or missing file
/// still yields a usable scanner (QR codes from the `samples` directory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Accepted symbologies, in caller order
    #[serde(default = "default_formats")]
    pub formats: Vec<BarcodeFormat>,

    #[serde(default)]
    pub camera: CameraSettings,

    #[serde(default)]
    pub scanner: ScannerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            camera: CameraSettings::default(),
            scanner: ScannerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Where camera frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    /// Replay image files from `image_dir`
    Still,
    /// Live webcam (requires the `native-camera` feature)
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default = "default_source")]
    pub source: CameraSource,

    #[serde(default = "default_image_dir")]
    pub image_dir: Utf8PathBuf,

    /// Loop over the still images instead of going idle after the last one
    #[serde(default = "default_true")]
    pub repeat: bool,

    #[serde(default)]
    pub device_index: u32,

    #[serde(default = "default_target_width")]
    pub target_width: u32,

    #[serde(default = "default_target_height")]
    pub target_height: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Pause between analyzed frames
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Upper bound of the digital zoom
    #[serde(default = "default_max_zoom_ratio")]
    pub max_zoom_ratio: f32,

    /// Pretend the still-image source has a torch (UI testing)
    #[serde(default)]
    pub has_torch: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: default_source(),
            image_dir: default_image_dir(),
            repeat: true,
            device_index: 0,
            target_width: default_target_width(),
            target_height: default_target_height(),
            frame_rate: default_frame_rate(),
            frame_interval_ms: default_frame_interval_ms(),
            max_zoom_ratio: default_max_zoom_ratio(),
            has_torch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// Side of the square scanning guide, in logical pixels
    #[serde(default = "default_guide_frame_size")]
    pub guide_frame_size: f32,

    /// Close the scanner after the first successful read
    #[serde(default = "default_true")]
    pub close_on_result: bool,

    #[serde(default)]
    pub colors: ScannerColors,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            guide_frame_size: default_guide_frame_size(),
            close_on_result: true,
            colors: ScannerColors::default(),
        }
    }
}

/// Overlay colors as `#RRGGBB` strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerColors {
    #[serde(default = "default_container_color")]
    pub container: String,

    #[serde(default = "default_content_color")]
    pub content: String,

    #[serde(default = "default_content_color")]
    pub guide: String,
}

impl Default for ScannerColors {
    fn default() -> Self {
        Self {
            container: default_container_color(),
            content: default_content_color(),
            guide: default_content_color(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub log_dir: Utf8PathBuf,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Write JSON lines to the log file instead of plain text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            debug_mode: false,
            console_output: true,
            json: false,
        }
    }
}

/// Parse a `#RRGGBB` (or `RRGGBB`) color into its components.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn default_formats() -> Vec<BarcodeFormat> {
    vec![BarcodeFormat::QrCode]
}

fn default_source() -> CameraSource {
    CameraSource::Still
}

fn default_image_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("samples")
}

fn default_true() -> bool {
    true
}

fn default_target_width() -> u32 {
    1200
}

fn default_target_height() -> u32 {
    720
}

fn default_frame_rate() -> u32 {
    30
}

fn default_frame_interval_ms() -> u64 {
    100
}

fn default_max_zoom_ratio() -> f32 {
    4.0
}

fn default_guide_frame_size() -> f32 {
    260.0
}

fn default_container_color() -> String {
    "#1B1B1F".to_string()
}

fn default_content_color() -> String {
    "#FFFFFF".to_string()
}

fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_config_defaults() {
        let config = ScannerConfig::default();
        assert_eq!(config.formats, vec![BarcodeFormat::QrCode]);
        assert_eq!(config.camera.source, CameraSource::Still);
        assert_eq!(config.camera.target_width, 1200);
        assert_eq!(config.camera.target_height, 720);
        assert_eq!(config.scanner.guide_frame_size, 260.0);
        assert!(config.scanner.close_on_result);
        assert!(!config.logging.debug_mode);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
formats: [ean13, code128]
camera:
  source: native
  device_index: 2
"#;
        let config: ScannerConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.formats, vec![BarcodeFormat::Ean13, BarcodeFormat::Code128]);
        assert_eq!(config.camera.source, CameraSource::Native);
        assert_eq!(config.camera.device_index, 2);
        assert_eq!(config.camera.max_zoom_ratio, 4.0);
        assert_eq!(config.scanner.colors.container, "#1B1B1F");
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#1B1B1F"), Some((0x1b, 0x1b, 0x1f)));
        assert_eq!(parse_hex_color("ffffff"), Some((255, 255, 255)));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#GG0000"), None);
        assert_eq!(parse_hex_color("#ééé"), None);
    }
}

//! Integration tests for configuration loading and backend selection

use camino::Utf8PathBuf;
use kscan::models::{CameraSource, ScannerConfig};
use kscan::services::{
    BindRequest, CAMERA_EVENT_BUFFER, CameraBackend, FrameAnalyzer, camera_backend,
};
use kscan::{BarcodeFormat, ConfigManager, ScanError, ScanMetrics};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn temp_manager() -> (ConfigManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (ConfigManager::new(&dir).unwrap(), temp_dir)
}

#[test]
fn test_default_config_written_and_reloaded() {
    let (manager, _temp_dir) = temp_manager();

    assert!(manager.ensure_default_config().unwrap());
    let yaml = fs::read_to_string(manager.config_path()).unwrap();
    assert!(yaml.contains("qr_code"));
    assert!(yaml.contains("close_on_result"));

    let config = manager.load_config().unwrap();
    assert_eq!(config, ScannerConfig::default());
}

#[test]
fn test_full_yaml_file() {
    let (manager, _temp_dir) = temp_manager();
    fs::write(
        manager.config_path(),
        r##"
formats: [ean13, upc_a, qr_code]
camera:
  source: still
  image_dir: fixtures
  repeat: false
  max_zoom_ratio: 3.0
  has_torch: true
scanner:
  guide_frame_size: 300
  close_on_result: false
  colors:
    container: "#000000"
    guide: "#00FF00"
logging:
  debug_mode: true
  console_output: false
"##,
    )
    .unwrap();

    let config = manager.load_config().unwrap();

    assert_eq!(
        config.formats,
        vec![BarcodeFormat::Ean13, BarcodeFormat::UpcA, BarcodeFormat::QrCode]
    );
    assert_eq!(config.camera.source, CameraSource::Still);
    assert_eq!(config.camera.image_dir, Utf8PathBuf::from("fixtures"));
    assert!(!config.camera.repeat);
    assert_eq!(config.camera.max_zoom_ratio, 3.0);
    assert!(config.camera.has_torch);
    assert_eq!(config.scanner.guide_frame_size, 300.0);
    assert!(!config.scanner.close_on_result);
    assert_eq!(config.scanner.colors.container, "#000000");
    assert_eq!(config.scanner.colors.guide, "#00FF00");
    assert_eq!(config.scanner.colors.content, "#FFFFFF");
    assert!(config.logging.debug_mode);
    assert!(!config.logging.console_output);
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let (manager, _temp_dir) = temp_manager();
    fs::write(manager.config_path(), "camera: [unclosed\n").unwrap();

    let err = manager.load_config().unwrap_err();
    assert!(format!("{:#}", err).contains("kscan.yaml"));
}

#[test]
fn test_still_backend_with_missing_images_fails_to_bind() {
    let (manager, temp_dir) = temp_manager();
    let mut config = manager.load_config().unwrap();
    config.camera.image_dir =
        Utf8PathBuf::try_from(temp_dir.path().join("no-such-dir")).unwrap();

    let mut backend = camera_backend(&config.camera, Arc::new(ScanMetrics::new())).unwrap();
    let (tx, _rx) = tokio::sync::mpsc::channel(CAMERA_EVENT_BUFFER);
    let request = BindRequest {
        analyzer: Arc::new(FrameAnalyzer::standard(config.formats.clone())),
        target_width: config.camera.target_width,
        target_height: config.camera.target_height,
    };

    let result = backend.bind(request, tx);
    assert!(matches!(result, Err(ScanError::CameraBind(_))));
}

#[cfg(not(feature = "native-camera"))]
#[test]
fn test_native_backend_requires_feature() {
    let mut config = ScannerConfig::default();
    config.camera.source = CameraSource::Native;

    let result = camera_backend(&config.camera, Arc::new(ScanMetrics::new()));
    assert!(matches!(result, Err(ScanError::CameraBind(_))));
}

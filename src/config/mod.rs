use crate::models::ScannerConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the scanner configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "kscan.yaml";

/// Prefix for environment overrides, e.g. `KSCAN__CAMERA__SOURCE=native`
pub const ENV_PREFIX: &str = "KSCAN";

/// Configuration manager for the scanner settings.
///
/// Loading layers two sources, later ones winning:
/// - `kscan.yaml` in the config directory (optional)
/// - `KSCAN__SECTION__KEY` environment variables (`__` separates nesting levels,
///   `KSCAN__FORMATS` takes a comma-separated list)
///
/// Saving writes the file layer only.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it does not exist yet.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the scanner configuration.
    ///
    /// # Returns
    /// The merged ScannerConfig; defaults fill anything neither layer sets
    pub fn load_config(&self) -> Result<ScannerConfig> {
        self.load_with_environment(Self::environment())
    }

    /// Environment layer: `KSCAN__CAMERA__SOURCE=native`, `KSCAN__FORMATS=qr_code,ean13`
    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("formats")
    }

    fn load_with_environment(&self, environment: Environment) -> Result<ScannerConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults and environment",
                self.config_path
            );
        }

        let layered = Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: ScannerConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        if config.formats.is_empty() {
            tracing::warn!("Config requests no barcode formats; every format will be accepted");
        }

        tracing::info!(
            "Loaded config from {} (source: {:?}, formats: {:?})",
            self.config_path,
            config.camera.source,
            config.formats
        );
        Ok(config)
    }

    /// Save the scanner configuration file.
    pub fn save_config(&self, config: &ScannerConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Write the default configuration if no file exists yet.
    ///
    /// # Returns
    /// `true` if a file was written
    pub fn ensure_default_config(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }

        self.save_config(&ScannerConfig::default())?;
        Ok(true)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

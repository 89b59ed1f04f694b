use log::{info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::processor::ProcessorSpec;

/// Settings file written next to the working directory by default
pub const DEFAULT_SETTINGS_FILE: &str = "monitor_settings.json";

/// Web asset extensions that trigger processing
pub const WEB_EXTENSIONS: [&str; 4] = [".html", ".htm", ".css", ".js"];

/// Extensions counted as extracted images
pub const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".gif"];

/// Default wait between a creation event and processing
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;

/// Default per-invocation limit for external processors
pub const DEFAULT_PROCESSOR_TIMEOUT_SECS: u64 = 300;

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Persisted monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder watched for new web assets
    pub watch_folder: PathBuf,

    /// Script that extracts images into `<stem>_images`
    #[serde(alias = "pngify_script")]
    pub image_extractor_script: PathBuf,

    /// Script that removes duplicate images
    #[serde(alias = "duplicate_script")]
    pub duplicate_remover_script: PathBuf,

    /// Extra arguments for the extractor (`{file}` and `{images_dir}` are substituted)
    pub image_extractor_args: Vec<String>,

    /// Extra arguments for the duplicate remover
    pub duplicate_remover_args: Vec<String>,

    /// Wait after a creation event before processing, in milliseconds
    pub settle_delay_ms: u64,

    /// Per-invocation timeout for external processors, in seconds
    pub processor_timeout_secs: u64,

    /// Extensions that trigger processing (case-insensitive, with leading dot)
    pub extensions: Vec<String>,

    /// Number of worker threads (0 = auto)
    pub threads: usize,

    /// Wait for the file size to stop changing after the settle delay
    pub stability_check: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_folder: dirs::download_dir().unwrap_or_else(|| PathBuf::from("Downloads")),
            image_extractor_script: PathBuf::new(),
            duplicate_remover_script: PathBuf::new(),
            image_extractor_args: Vec::new(),
            duplicate_remover_args: Vec::new(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            processor_timeout_secs: DEFAULT_PROCESSOR_TIMEOUT_SECS,
            extensions: WEB_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            threads: 0, // Auto
            stability_check: true,
            log_level: LogLevel::Info,
        }
    }
}

impl Settings {
    /// Load settings from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open settings file: {}", e)))?;

        let settings: Settings = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse settings file: {}", e)))?;

        Ok(settings)
    }

    /// Load settings if the file exists, otherwise fall back to defaults.
    /// A broken settings file is reported and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create settings file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Validate the settings before a watch session starts
    pub fn validate(&self) -> Result<()> {
        if !self.watch_folder.is_dir() {
            return Err(Error::Configuration(format!(
                "Watch folder does not exist: {}",
                self.watch_folder.display()
            )));
        }

        if self.processor_timeout_secs == 0 {
            return Err(Error::Configuration(
                "Processor timeout must be at least one second".to_string(),
            ));
        }

        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(Error::Configuration(
                "At least one file extension must be watched".to_string(),
            ));
        }

        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor_timeout_secs)
    }

    /// Watch configuration derived from these settings
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            directory: self.watch_folder.clone(),
            recursive: false,
            extensions: normalize_extensions(self.extensions.as_slice()),
            settle_delay: self.settle_delay(),
            stability_check: self.stability_check,
        }
    }

    pub fn image_extractor_spec(&self) -> ProcessorSpec {
        ProcessorSpec::for_script(&self.image_extractor_script, self.processor_timeout())
            .with_args(self.image_extractor_args.clone())
    }

    pub fn duplicate_remover_spec(&self) -> ProcessorSpec {
        ProcessorSpec::for_script(&self.duplicate_remover_script, self.processor_timeout())
            .with_args(self.duplicate_remover_args.clone())
    }
}

/// What the directory watcher subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Directory to watch
    pub directory: PathBuf,

    /// Always false; only immediate children are watched
    pub recursive: bool,

    /// Lowercase extensions with a leading dot
    pub extensions: BTreeSet<String>,

    /// Wait before processing a freshly created file
    pub settle_delay: Duration,

    /// Wait for the file size to stop changing after the settle delay
    pub stability_check: bool,
}

impl WatchConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            recursive: false,
            extensions: normalize_extensions(&WEB_EXTENSIONS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            stability_check: true,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_stability_check(mut self, enabled: bool) -> Self {
        self.stability_check = enabled;
        self
    }

    /// Check the directory is usable for a watch session
    pub fn validate(&self) -> Result<()> {
        if !self.directory.is_dir() {
            return Err(Error::Configuration(format!(
                "Watch folder does not exist: {}",
                self.directory.display()
            )));
        }
        Ok(())
    }
}

/// Lowercase and dot-prefix a list of extensions, dropping blanks
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> BTreeSet<String> {
    extensions
        .iter()
        .map(|e| e.as_ref().trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
        .collect()
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// What caused a file to be queued for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// Creation event seen by the directory watcher
    Watched,

    /// Enumerated by a manual batch scan
    ManualBatch,
}

/// A single file waiting to go through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Full path to the web asset
    pub path: PathBuf,

    /// When the file was detected or enumerated
    pub discovered_at: SystemTime,

    /// How the task was created
    pub trigger: Trigger,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>, trigger: Trigger) -> Self {
        Self {
            path: path.into(),
            discovered_at: SystemTime::now(),
            trigger,
        }
    }

    /// File name for log lines, falling back to the full path
    pub fn display_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Directory the image extractor is expected to write into:
    /// a sibling of the source file named `<stem>_images`
    pub fn images_dir(&self) -> PathBuf {
        images_dir_for(&self.path)
    }
}

/// Sibling `<stem>_images` directory for a source file
pub fn images_dir_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{}_images", stem))
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    ImageExtraction,
    DuplicateRemoval,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ImageExtraction => write!(f, "image extraction"),
            Stage::DuplicateRemoval => write!(f, "duplicate removal"),
        }
    }
}

/// A stage that failed while processing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub cause: String,
}

/// Outcome of running one file through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Source file that was processed
    pub path: PathBuf,

    /// Images found in the `<stem>_images` directory after extraction
    pub images_extracted: u64,

    /// Completed duplicate-removal passes (0 or 1)
    pub duplicates_removed: u64,

    /// Bytes the duplicate-removal pass freed in the images directory
    pub bytes_reclaimed: u64,

    /// Failures in the order they happened
    pub stage_failures: Vec<StageFailure>,
}

impl PipelineResult {
    pub(crate) fn empty(path: PathBuf) -> Self {
        Self {
            path,
            images_extracted: 0,
            duplicates_removed: 0,
            bytes_reclaimed: 0,
            stage_failures: Vec::new(),
        }
    }

    /// Whether every attempted stage finished without error
    pub fn is_clean(&self) -> bool {
        self.stage_failures.is_empty()
    }
}

/// Lifecycle of a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherState {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Coarse status signal for a display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorStatus {
    Idle,
    Active,
}

impl From<WatcherState> for MonitorStatus {
    fn from(state: WatcherState) -> Self {
        match state {
            WatcherState::Active => MonitorStatus::Active,
            _ => MonitorStatus::Idle,
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Idle => write!(f, "Idle"),
            MonitorStatus::Active => write!(f, "Monitoring Active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_dir_is_sibling_named_after_stem() {
        let task = FileTask::new("/downloads/index.html", Trigger::Watched);
        assert_eq!(task.images_dir(), PathBuf::from("/downloads/index_images"));
        assert_eq!(task.display_name(), "index.html");
    }

    #[test]
    fn test_images_dir_keeps_inner_dots() {
        let dir = images_dir_for(Path::new("/tmp/app.bundle.min.js"));
        assert_eq!(dir, PathBuf::from("/tmp/app.bundle.min_images"));
    }

    #[test]
    fn test_status_from_state() {
        assert_eq!(MonitorStatus::from(WatcherState::Active), MonitorStatus::Active);
        assert_eq!(MonitorStatus::from(WatcherState::Starting), MonitorStatus::Idle);
        assert_eq!(MonitorStatus::from(WatcherState::Stopping), MonitorStatus::Idle);
    }
}

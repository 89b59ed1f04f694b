use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::discovery::list_web_assets;
use crate::error::Result;
use crate::logging::ActivityLog;
use crate::pipeline::ProcessingPipeline;
use crate::stats::Statistics;
use crate::types::{FileTask, Trigger};

/// One-shot sequential pass over the web assets in a directory.
///
/// Does not consult the watcher's registry, so files the watcher already
/// handled are processed again.
#[derive(Debug, Clone)]
pub struct BatchScanner {
    pipeline: Arc<ProcessingPipeline>,
    statistics: Arc<Statistics>,
    extensions: BTreeSet<String>,
    log: ActivityLog,
}

impl BatchScanner {
    pub fn new(
        pipeline: Arc<ProcessingPipeline>,
        statistics: Arc<Statistics>,
        extensions: BTreeSet<String>,
        log: ActivityLog,
    ) -> Self {
        Self {
            pipeline,
            statistics,
            extensions,
            log,
        }
    }

    /// Process every matching file in `directory`, checking `keep_going`
    /// before each one. Returns the number of matching files found.
    pub fn scan(&self, directory: &Path, keep_going: &AtomicBool) -> Result<usize> {
        self.log
            .info(format!("Manual cleanup started on: {}", directory.display()));

        let files = list_web_assets(directory, &self.extensions)?;
        self.log
            .info(format!("Found {} web files to process", files.len()));

        let mut processed = 0;
        for file in &files {
            if !keep_going.load(Ordering::SeqCst) {
                self.log.warn(format!(
                    "Manual cleanup cancelled after {} of {} files",
                    processed,
                    files.len()
                ));
                return Ok(files.len());
            }

            let task = FileTask::new(file, Trigger::ManualBatch);
            self.pipeline.process_and_record(&task, &self.statistics);
            processed += 1;
        }

        self.log.info("Manual cleanup completed!");
        Ok(files.len())
    }
}

/// Keep-going flags of the manual scans currently running.
///
/// Every scan gets its own flag, so starting a new scan never revives one
/// that was cancelled. Clones share the same set of scans.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    running: Arc<Mutex<Vec<Weak<AtomicBool>>>>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new scan and return its flag; the scan ends when the flag is dropped
    pub fn begin(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(true));
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.retain(|w| w.strong_count() > 0);
        running.push(Arc::downgrade(&flag));
        flag
    }

    /// Ask every running scan to stop before its next file
    pub fn cancel_all(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        for flag in running.drain(..).filter_map(|w| w.upgrade()) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Number of scans that have not finished yet
    pub fn in_flight(&self) -> usize {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.iter().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{normalize_extensions, WEB_EXTENSIONS};
    use crate::processor::ProcessorSpec;
    use crate::test_utils::{create_file, write_script};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn scanner(statistics: Arc<Statistics>, log: ActivityLog) -> BatchScanner {
        let absent = ProcessorSpec::for_script(Path::new(""), Duration::from_secs(5));
        let pipeline = ProcessingPipeline::new(absent.clone(), absent, log.clone());
        BatchScanner::new(
            Arc::new(pipeline),
            statistics,
            normalize_extensions(&WEB_EXTENSIONS),
            log,
        )
    }

    #[test]
    fn test_empty_directory_changes_nothing() {
        let dir = tempdir().unwrap();
        create_file(dir.path(), "readme.txt", b"x");
        let statistics = Arc::new(Statistics::new());
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = lines.clone();
        let log = ActivityLog::from_fn(move |l| captured.lock().unwrap().push(l.to_string()));

        let count = scanner(statistics.clone(), log)
            .scan(dir.path(), &AtomicBool::new(true))
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(statistics.snapshot().files_processed, 0);
        assert!(lines
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.ends_with("Found 0 web files to process")));
    }

    #[test]
    fn test_processes_each_matching_file() {
        let dir = tempdir().unwrap();
        create_file(dir.path(), "a.html", b"1");
        create_file(dir.path(), "b.CSS", b"2");
        create_file(dir.path(), "c.js", b"3");
        create_file(dir.path(), "d.png", b"4");
        let statistics = Arc::new(Statistics::new());

        let count = scanner(statistics.clone(), ActivityLog::silent())
            .scan(dir.path(), &AtomicBool::new(true))
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(statistics.snapshot().files_processed, 3);
    }

    #[test]
    fn test_cleared_flag_stops_before_first_file() {
        let dir = tempdir().unwrap();
        create_file(dir.path(), "a.html", b"1");
        create_file(dir.path(), "b.html", b"2");
        let statistics = Arc::new(Statistics::new());

        let count = scanner(statistics.clone(), ActivityLog::silent())
            .scan(dir.path(), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(statistics.snapshot().files_processed, 0);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let result = scanner(Arc::new(Statistics::new()), ActivityLog::silent())
            .scan(Path::new("/path/that/does/not/exist"), &AtomicBool::new(true));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_flag_cleared_mid_file_stops_before_next_file() {
        let dir = tempdir().unwrap();
        let tools = tempdir().unwrap();
        for name in ["a.html", "b.html", "c.html"] {
            create_file(dir.path(), name, b"<html></html>");
        }
        // Leaves a marker as soon as it starts, then takes a while
        let extractor = write_script(
            tools.path(),
            "slow.sh",
            "touch \"$CLEANUP_MONITOR_FILE.started\"\nsleep 1\n",
        );
        let spec = ProcessorSpec::for_script(&extractor, Duration::from_secs(30));
        let absent = ProcessorSpec::for_script(Path::new(""), Duration::from_secs(5));
        let scanner = BatchScanner::new(
            Arc::new(ProcessingPipeline::new(spec, absent, ActivityLog::silent())),
            Arc::new(Statistics::new()),
            normalize_extensions(&WEB_EXTENSIONS),
            ActivityLog::silent(),
        );
        let statistics = scanner.statistics.clone();

        let control = ScanControl::new();
        let flag = control.begin();
        let target = dir.path().to_path_buf();
        let handle = thread::spawn(move || scanner.scan(&target, &flag));

        let marker = dir.path().join("a.html.started");
        let deadline = Instant::now() + Duration::from_secs(10);
        while !marker.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(marker.exists());
        control.cancel_all();

        let count = handle.join().unwrap().unwrap();
        assert_eq!(count, 3);
        // The file in progress finishes; the rest are never started
        assert_eq!(statistics.snapshot().files_processed, 1);
        assert!(!dir.path().join("b.html.started").exists());
        assert!(!dir.path().join("c.html.started").exists());
    }

    #[test]
    fn test_new_scan_does_not_revive_cancelled_one() {
        let control = ScanControl::new();
        let first = control.begin();
        control.cancel_all();

        let second = control.begin();
        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
        assert_eq!(control.in_flight(), 1);

        drop(second);
        assert_eq!(control.in_flight(), 0);
    }
}

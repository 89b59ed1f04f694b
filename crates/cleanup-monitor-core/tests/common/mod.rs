#![allow(dead_code)]

use cleanup_monitor_core::{ActivityLog, CleanupMonitor, Settings, StatsSnapshot};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Create a file with the given contents, creating parent directories
pub fn create_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();

    let file_path = dir.join(name);
    let mut file = File::create(&file_path).unwrap();
    file.write_all(contents).unwrap();
    file_path
}

/// Write a shell script; `.sh` scripts are run through `sh`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    create_file(dir, name, format!("#!/bin/sh\n{}", body).as_bytes())
}

/// Extractor stand-in: writes `pngs` images and `others` text files into `<stem>_images`
pub fn extractor_script(dir: &Path, pngs: usize, others: usize) -> PathBuf {
    let body = format!(
        r#"out="${{CLEANUP_MONITOR_FILE%.*}}_images"
mkdir -p "$out"
i=0
while [ $i -lt {pngs} ]; do i=$((i+1)); printf 'image' > "$out/img$i.png"; done
i=0
while [ $i -lt {others} ]; do i=$((i+1)); printf 'text' > "$out/note$i.txt"; done
"#,
        pngs = pngs,
        others = others
    );
    write_script(dir, "extract.sh", &body)
}

/// Duplicate-remover stand-in that appends one line per run to `runs.log` in its own folder
pub fn counting_remover_script(dir: &Path) -> PathBuf {
    let log = dir.join("runs.log");
    write_script(
        dir,
        "dedupe.sh",
        &format!("echo run >> '{}'\n", log.display()),
    )
}

/// Settings with short delays and the given tools
pub fn fast_settings(
    watch: &Path,
    extractor: Option<&PathBuf>,
    remover: Option<&PathBuf>,
) -> Settings {
    Settings {
        watch_folder: watch.to_path_buf(),
        image_extractor_script: extractor.cloned().unwrap_or_default(),
        duplicate_remover_script: remover.cloned().unwrap_or_default(),
        settle_delay_ms: 100,
        processor_timeout_secs: 30,
        threads: 2,
        stability_check: false,
        ..Default::default()
    }
}

/// Activity log that keeps every line in memory
pub fn capturing_log() -> (ActivityLog, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = lines.clone();
    let log = ActivityLog::from_fn(move |line| captured.lock().unwrap().push(line.to_string()));
    (log, lines)
}

/// Poll the monitor until `done` holds or the deadline passes
pub fn wait_for_stats<F>(monitor: &CleanupMonitor, done: F) -> StatsSnapshot
where
    F: Fn(&StatsSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let stats = monitor.statistics();
        if done(&stats) || Instant::now() > deadline {
            return stats;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

//! Directory watching and dispatch.
//!
//! A `notify` watcher pushes raw events into a bounded queue. One
//! long-lived thread drains that queue, filters creation events by
//! extension, consults the session's `DedupeRegistry` and hands accepted
//! files to the worker pool. Workers wait out the settle delay and then run
//! the pipeline, so slow external tools never hold up event delivery.

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, error};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::WatchConfig;
use crate::discovery::has_extension_in;
use crate::error::{Error, Result};
use crate::logging::ActivityLog;
use crate::pipeline::ProcessingPipeline;
use crate::registry::DedupeRegistry;
use crate::stats::Statistics;
use crate::types::{file_name_of, FileTask, Trigger, WatcherState};

/// Raw events buffered between the OS watcher and the event loop
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Extra size checks after the settle delay before giving up on quiescence
const MAX_STABILITY_ROUNDS: usize = 10;

/// Extract panic info from panic value
pub fn extract_panic_info(panic_err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_err.downcast_ref::<&str>() {
        format!("Panic with message: {}", s)
    } else if let Some(s) = panic_err.downcast_ref::<String>() {
        format!("Panic with message: {}", s)
    } else {
        "Unknown panic occurred".to_string()
    }
}

/// Build the pool that runs dispatched pipeline tasks (0 threads = one per CPU)
pub fn build_worker_pool(threads: usize) -> Result<ThreadPool> {
    let num_threads = if threads == 0 { num_cpus::get() } else { threads };
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("pipeline-worker-{}", i))
        .panic_handler(|panic_err| {
            error!("Pipeline worker panicked: {}", extract_panic_info(panic_err));
        })
        .build()
        .map_err(|e| Error::Unknown(format!("Failed to build worker pool: {}", e)))
}

/// Sleep for the settle delay, then optionally wait for the size to stop changing
pub fn wait_for_settle(path: &Path, settle_delay: Duration, stability_check: bool) {
    thread::sleep(settle_delay);
    if !stability_check {
        return;
    }

    let interval = settle_delay
        .min(Duration::from_millis(500))
        .max(Duration::from_millis(50));
    let size_of = |p: &Path| fs::metadata(p).map(|m| m.len()).ok();

    let mut last = size_of(path);
    for _ in 0..MAX_STABILITY_ROUNDS {
        thread::sleep(interval);
        let current = size_of(path);
        if current == last {
            return;
        }
        last = current;
    }
    debug!("{} is still changing, processing anyway", path.display());
}

/// Hands accepted files to the worker pool
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<ProcessingPipeline>,
    statistics: Arc<Statistics>,
    pool: Arc<ThreadPool>,
    log: ActivityLog,
}

impl Dispatcher {
    pub fn new(
        pipeline: Arc<ProcessingPipeline>,
        statistics: Arc<Statistics>,
        pool: Arc<ThreadPool>,
        log: ActivityLog,
    ) -> Self {
        Self {
            pipeline,
            statistics,
            pool,
            log,
        }
    }

    /// Queue a task; it settles and runs on a worker, detached from the caller
    pub fn dispatch(&self, task: FileTask, settle_delay: Duration, stability_check: bool) {
        let pipeline = self.pipeline.clone();
        let statistics = self.statistics.clone();
        self.pool.spawn(move || {
            wait_for_settle(&task.path, settle_delay, stability_check);
            pipeline.process_and_record(&task, &statistics);
        });
    }
}

/// Filters raw events and dispatches accepted files for one session
struct EventRouter {
    config: WatchConfig,
    registry: Arc<DedupeRegistry>,
    dispatcher: Dispatcher,
}

impl EventRouter {
    /// Returns how many files the event caused to be dispatched
    fn route(&self, event: &Event) -> usize {
        match event.kind {
            EventKind::Create(CreateKind::Folder) => return 0,
            EventKind::Create(_) => {}
            _ => return 0,
        }

        let mut dispatched = 0;
        for path in &event.paths {
            if path.is_dir() || !has_extension_in(path, &self.config.extensions) {
                continue;
            }
            if !self.registry.try_accept(path) {
                debug!("Ignoring repeat event for {}", path.display());
                continue;
            }

            self.dispatcher
                .log
                .info(format!("New file detected: {}", file_name_of(path)));
            self.dispatcher.dispatch(
                FileTask::new(path, Trigger::Watched),
                self.config.settle_delay,
                self.config.stability_check,
            );
            dispatched += 1;
        }
        dispatched
    }

    fn run(self, events: Receiver<notify::Result<Event>>, shutdown: Receiver<()>) {
        loop {
            crossbeam::select! {
                recv(shutdown) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => {
                        self.route(&event);
                    }
                    Ok(Err(e)) => self.dispatcher.log.warn(format!("Watch error: {}", e)),
                    Err(_) => break,
                },
            }
        }
        debug!("Event loop for {} finished", self.config.directory.display());
    }
}

struct Session {
    watcher: RecommendedWatcher,
    shutdown_tx: Sender<()>,
    event_loop: JoinHandle<()>,
    registry: Arc<DedupeRegistry>,
}

/// Watches one directory (non-recursively) for new web assets.
///
/// `Idle -> Starting -> Active -> Stopping -> Idle`. Tasks already handed
/// to the worker pool keep running after `stop`.
pub struct DirectoryWatcher {
    config: WatchConfig,
    state: WatcherState,
    session: Option<Session>,
}

impl DirectoryWatcher {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            state: WatcherState::Idle,
            session: None,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Registry of the running session, if any
    pub fn registry(&self) -> Option<Arc<DedupeRegistry>> {
        self.session.as_ref().map(|s| s.registry.clone())
    }

    /// Validate the directory, subscribe to its events and start routing them.
    /// On error the watcher stays `Idle`.
    pub fn start(&mut self, dispatcher: Dispatcher) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::Configuration(format!(
                "Already watching {}",
                self.config.directory.display()
            )));
        }

        self.state = WatcherState::Starting;
        match self.subscribe(dispatcher) {
            Ok(session) => {
                self.session = Some(session);
                self.state = WatcherState::Active;
                Ok(())
            }
            Err(e) => {
                self.state = WatcherState::Idle;
                Err(e)
            }
        }
    }

    fn subscribe(&self, dispatcher: Dispatcher) -> Result<Session> {
        self.config.validate()?;

        let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.config.directory, mode)?;

        let registry = Arc::new(DedupeRegistry::new());
        let router = EventRouter {
            config: self.config.clone(),
            registry: registry.clone(),
            dispatcher,
        };
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let event_loop = thread::Builder::new()
            .name("watch-events".to_string())
            .spawn(move || router.run(event_rx, shutdown_rx))?;

        Ok(Session {
            watcher,
            shutdown_tx,
            event_loop,
            registry,
        })
    }

    /// Unsubscribe and wait for the event loop to exit
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.state = WatcherState::Stopping;

        let Session {
            mut watcher,
            shutdown_tx,
            event_loop,
            ..
        } = session;

        if let Err(e) = watcher.unwatch(&self.config.directory) {
            debug!("Unwatch failed for {}: {}", self.config.directory.display(), e);
        }
        drop(watcher);

        let _ = shutdown_tx.try_send(());
        if let Err(panic_err) = event_loop.join() {
            error!("Event loop panicked: {}", extract_panic_info(panic_err));
        }

        self.state = WatcherState::Idle;
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorSpec;
    use crate::test_utils::create_file;
    use notify::event::{ModifyKind, RemoveKind};
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::tempdir;

    fn dispatcher(statistics: Arc<Statistics>) -> Dispatcher {
        let absent = ProcessorSpec::for_script(Path::new(""), Duration::from_secs(5));
        let pipeline = ProcessingPipeline::new(absent.clone(), absent, ActivityLog::silent());
        Dispatcher::new(
            Arc::new(pipeline),
            statistics,
            Arc::new(build_worker_pool(2).unwrap()),
            ActivityLog::silent(),
        )
    }

    fn make_router(dir: &Path, statistics: Arc<Statistics>) -> EventRouter {
        EventRouter {
            config: WatchConfig::new(dir)
                .with_settle_delay(Duration::from_millis(50))
                .with_stability_check(false),
            registry: Arc::new(DedupeRegistry::new()),
            dispatcher: dispatcher(statistics),
        }
    }

    fn created(path: PathBuf) -> Event {
        Event::new(EventKind::Create(CreateKind::File)).add_path(path)
    }

    fn wait_for_files_processed(statistics: &Statistics, expected: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while statistics.snapshot().files_processed < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_duplicate_create_events_dispatch_once() {
        let dir = tempdir().unwrap();
        let page = create_file(dir.path(), "index.html", b"<html></html>");
        let statistics = Arc::new(Statistics::new());
        let router = make_router(dir.path(), statistics.clone());

        assert_eq!(router.route(&created(page.clone())), 1);
        assert_eq!(router.route(&created(page.clone())), 0);

        wait_for_files_processed(&statistics, 1);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(statistics.snapshot().files_processed, 1);
    }

    #[test]
    fn test_ignores_other_extensions_and_event_kinds() {
        let dir = tempdir().unwrap();
        let notes = create_file(dir.path(), "notes.txt", b"x");
        let page = create_file(dir.path(), "index.html", b"<html></html>");
        let statistics = Arc::new(Statistics::new());
        let router = make_router(dir.path(), statistics);

        assert_eq!(router.route(&created(notes)), 0);
        let modified = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(page.clone());
        assert_eq!(router.route(&modified), 0);
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(page.clone());
        assert_eq!(router.route(&removed), 0);

        assert!(router.registry.is_empty());
    }

    #[test]
    fn test_ignores_directories() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("bundle.js");
        fs::create_dir(&folder).unwrap();
        let router = make_router(dir.path(), Arc::new(Statistics::new()));

        assert_eq!(router.route(&created(folder.clone())), 0);
        let folder_event = Event::new(EventKind::Create(CreateKind::Folder)).add_path(folder);
        assert_eq!(router.route(&folder_event), 0);
    }

    #[test]
    fn test_start_fails_for_missing_directory() {
        let mut watcher = DirectoryWatcher::new(WatchConfig::new("/path/that/does/not/exist"));
        let result = watcher.start(dispatcher(Arc::new(Statistics::new())));

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(watcher.state(), WatcherState::Idle);
        assert!(watcher.registry().is_none());
    }

    #[test]
    fn test_start_stop_cycle() {
        let dir = tempdir().unwrap();
        let statistics = Arc::new(Statistics::new());
        let mut watcher = DirectoryWatcher::new(WatchConfig::new(dir.path()));

        watcher.start(dispatcher(statistics.clone())).unwrap();
        assert_eq!(watcher.state(), WatcherState::Active);
        assert!(watcher.start(dispatcher(statistics.clone())).is_err());

        watcher.stop();
        assert_eq!(watcher.state(), WatcherState::Idle);
        watcher.stop();

        // Rebinding after stop gets a fresh registry
        watcher.start(dispatcher(statistics)).unwrap();
        assert!(watcher.registry().unwrap().is_empty());
    }

    #[test]
    fn test_settle_without_stability_check_waits_delay() {
        let started = Instant::now();
        wait_for_settle(Path::new("/does/not/matter"), Duration::from_millis(60), false);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}

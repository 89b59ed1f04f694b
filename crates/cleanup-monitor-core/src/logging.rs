use chrono::Local;
use log::{error, info, warn, LevelFilter};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// For file-based logging with rotation
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Environment variable that overrides the file log level
pub const LOG_LEVEL_ENV_VAR: &str = "CLEANUP_MONITOR_LOG";

/// Level named by `CLEANUP_MONITOR_LOG`, if set to a valid filter
pub fn level_from_env() -> Option<LevelFilter> {
    std::env::var(LOG_LEVEL_ENV_VAR)
        .ok()
        .and_then(|value| value.trim().parse::<LevelFilter>().ok())
}

/// Level to log at: an explicit request (e.g. `-v`) wins, then
/// `CLEANUP_MONITOR_LOG`, then the configured level
pub fn effective_level(explicit: Option<LevelFilter>, configured: LevelFilter) -> LevelFilter {
    explicit.or_else(level_from_env).unwrap_or(configured)
}

/// Initialize the file logger with timestamp, log level, and module path.
/// `level` is used as given; resolve it with [`effective_level`] first.
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    // Create log directory if it doesn't exist
    std::fs::create_dir_all(log_dir)?;

    let log_file_path = log_dir.join("monitor.log");
    let archived_logs_pattern = format!("{}/monitor.{{}}.log", log_dir.display());

    // Rotate at 10MB, keep 5 archived files
    let file_trigger = SizeTrigger::new(10 * 1024 * 1024);
    let file_roller = FixedWindowRoller::builder()
        .build(&archived_logs_pattern, 5)
        .map_err(|e| format!("Failed to create log roller: {}", e))?;
    let compound_policy = CompoundPolicy::new(Box::new(file_trigger), Box::new(file_roller));

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] [{M}:{L}] - {m}{n}",
        )))
        .build(&log_file_path, Box::new(compound_policy))
        .map_err(|e| format!("Failed to create log appender: {}", e))?;

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(rolling_file)))
        .build(Root::builder().appender("file").build(level))
        .map_err(|e| format!("Failed to build log config: {}", e))?;

    log4rs::init_config(config).map_err(|e| format!("Failed to initialize log4rs: {}", e))?;

    info!("Cleanup monitor logging started");
    info!("Logging to file: {}", log_file_path.display());
    Ok(())
}

/// Callback receiving timestamped activity lines
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// User-facing activity log.
///
/// Every message goes to the `log` facade and, when a sink is attached,
/// to the sink as `[HH:MM:SS] message`.
#[derive(Clone, Default)]
pub struct ActivityLog {
    sink: Option<LogCallback>,
}

impl ActivityLog {
    pub fn new(sink: LogCallback) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn from_fn<F>(sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::new(Arc::new(sink))
    }

    /// Only forwards to the `log` facade
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);
        self.deliver(message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!("{}", message);
        self.deliver(message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!("{}", message);
        self.deliver(message);
    }

    fn deliver(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink(&format!("[{}] {}", Local::now().format("%H:%M:%S"), message));
        }
    }
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cleanup_monitor_core::{
    logging, ActivityLog, CleanupMonitor, Settings, StatsSnapshot, DEFAULT_SETTINGS_FILE,
};
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cleanup-monitor")]
#[command(about = "Extract and deduplicate images from new web files in a folder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a folder for new HTML/CSS/JS files until Ctrl-C
    Watch {
        /// Folder to watch (defaults to the saved setting)
        folder: Option<PathBuf>,

        #[command(flatten)]
        options: CommonOptions,
    },

    /// Process the web files already present in a folder
    Scan {
        /// Folder to clean up
        #[arg(required = true)]
        folder: PathBuf,

        #[command(flatten)]
        options: CommonOptions,
    },

    /// Generate default settings file
    GenerateConfig {
        /// Path to save settings file
        #[arg(default_value = DEFAULT_SETTINGS_FILE)]
        path: PathBuf,
    },
}

#[derive(Args)]
struct CommonOptions {
    /// Image extractor script
    #[arg(long)]
    extractor: Option<PathBuf>,

    /// Duplicate remover script
    #[arg(long)]
    remover: Option<PathBuf>,

    /// Wait after a new file appears before processing it (milliseconds)
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Per-tool timeout (seconds)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Path to settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Write logs to rotating files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl CommonOptions {
    /// Saved settings with command line overrides applied
    fn settings(&self) -> Settings {
        let mut settings = Settings::load_or_default(&self.settings);

        if let Some(extractor) = &self.extractor {
            settings.image_extractor_script = extractor.clone();
        }
        if let Some(remover) = &self.remover {
            settings.duplicate_remover_script = remover.clone();
        }
        if let Some(settle_ms) = self.settle_ms {
            settings.settle_delay_ms = settle_ms;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            settings.processor_timeout_secs = timeout_secs;
        }

        settings
    }

    /// `-v` for this run only; never written back to the settings file
    fn verbosity(&self) -> Option<LevelFilter> {
        match self.verbose {
            0 => None,
            1 => Some(LevelFilter::Debug),
            _ => Some(LevelFilter::Trace),
        }
    }

    fn log_level(&self, settings: &Settings) -> LevelFilter {
        logging::effective_level(self.verbosity(), settings.log_level.to_level_filter())
    }

    fn init_logging(&self, settings: &Settings) -> anyhow::Result<()> {
        let level = self.log_level(settings);

        match &self.log_dir {
            Some(dir) => logging::init_logger(dir, level)
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?,
            None => env_logger::Builder::new().filter_level(level).init(),
        }
        Ok(())
    }
}

fn main() -> Result<(), anyhow::Error> {
    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { folder, options } => {
            let mut settings = options.settings();
            if let Some(folder) = folder {
                settings.watch_folder = folder;
            }
            options.init_logging(&settings)?;

            let mut monitor = CleanupMonitor::new(settings, console_log())?
                .with_settings_path(&options.settings);

            let running = Arc::new(AtomicBool::new(true));
            let handler_running = running.clone();
            let scans = monitor.scan_control();
            ctrlc::set_handler(move || {
                handler_running.store(false, Ordering::SeqCst);
                scans.cancel_all();
            })
            .context("Failed to install Ctrl-C handler")?;

            monitor.start()?;
            println!("Status: {} (press Ctrl-C to stop)", monitor.status());

            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(200));
            }

            monitor.stop();
            print_statistics(&monitor.statistics());
            Ok(())
        }

        Commands::Scan { folder, options } => {
            let settings = options.settings();
            options.init_logging(&settings)?;

            let monitor = CleanupMonitor::new(settings, console_log())?;

            let scans = monitor.scan_control();
            ctrlc::set_handler(move || scans.cancel_all())
                .context("Failed to install Ctrl-C handler")?;

            info!("Starting manual cleanup of {}", folder.display());
            let count = monitor.manual_scan(&folder)?;
            println!("Considered {} web files", count);
            print_statistics(&monitor.statistics());
            Ok(())
        }

        Commands::GenerateConfig { path } => {
            let settings = Settings::default();
            settings.save_to_file(&path)?;
            println!("Settings file generated at: {}", path.display());
            Ok(())
        }
    }
}

/// Activity lines go straight to stdout
fn console_log() -> ActivityLog {
    ActivityLog::from_fn(|line| println!("{}", line))
}

fn print_statistics(stats: &StatsSnapshot) {
    println!("Files Processed:    {}", stats.files_processed);
    println!("Images Extracted:   {}", stats.images_extracted);
    println!("Duplicates Removed: {}", stats.duplicates_removed);
    println!("Space Saved (MB):   {:.2}", stats.space_saved);
}

use log::{debug, info};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::types::images_dir_for;

/// Environment variable carrying the source file path into the external tool
pub const FILE_ENV_VAR: &str = "CLEANUP_MONITOR_FILE";

/// How often a running child is checked for exit
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How to run one external tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSpec {
    /// Script or executable; the stage is skipped when this does not exist
    pub target: PathBuf,

    /// Interpreter and its flags placed before the target (empty = run target directly)
    pub launcher: Vec<String>,

    /// Arguments after the target; `{file}` and `{images_dir}` are substituted
    pub args: Vec<String>,

    /// Kill the process if it runs longer than this
    pub timeout: Duration,
}

impl ProcessorSpec {
    pub fn new(target: impl Into<PathBuf>, launcher: Vec<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            launcher,
            args: Vec::new(),
            timeout,
        }
    }

    /// Pick the launcher from the script extension
    pub fn for_script(target: &Path, timeout: Duration) -> Self {
        Self::new(target, launcher_for(target), timeout)
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Whether the target exists; absent processors are skipped, not errors
    pub fn is_present(&self) -> bool {
        !self.target.as_os_str().is_empty() && self.target.exists()
    }

    /// Program and arguments for a given source file
    pub fn command_line(&self, file: &Path) -> (OsString, Vec<OsString>) {
        let mut parts: Vec<OsString> = self.launcher.iter().map(OsString::from).collect();
        parts.push(self.target.clone().into_os_string());

        let images_dir = images_dir_for(file);
        for arg in &self.args {
            let expanded = arg
                .replace("{file}", &file.to_string_lossy())
                .replace("{images_dir}", &images_dir.to_string_lossy());
            parts.push(OsString::from(expanded));
        }

        let program = parts.remove(0);
        (program, parts)
    }

    /// Human-readable command for log lines and errors
    pub fn describe(&self) -> String {
        let mut parts = self.launcher.clone();
        parts.push(self.target.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Interpreter used for a script, based on its extension
pub fn launcher_for(target: &Path) -> Vec<String> {
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let launcher: &[&str] = match ext.as_str() {
        "ps1" if cfg!(windows) => &["powershell", "-ExecutionPolicy", "Bypass", "-File"],
        "ps1" => &["pwsh", "-File"],
        "sh" => &["sh"],
        "py" if cfg!(windows) => &["python"],
        "py" => &["python3"],
        _ => &[],
    };
    launcher.iter().map(|s| s.to_string()).collect()
}

/// Captured result of a finished external process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty line of stderr, if any
    pub fn stderr_tail(&self) -> Option<&str> {
        self.stderr.lines().rev().find(|l| !l.trim().is_empty())
    }
}

/// Run an external processor for one source file and wait for it.
///
/// The child runs in the source file's directory with stdin closed and
/// both output streams captured. No retries: a launch error or timeout
/// is returned to the caller. On timeout the child and everything it
/// started are killed, then the child is reaped.
pub fn invoke(spec: &ProcessorSpec, file: &Path) -> Result<ProcessOutput> {
    let command_text = spec.describe();
    let (program, args) = spec.command_line(file);

    let mut command = Command::new(&program);
    command
        .args(&args)
        .env(FILE_ENV_VAR, file)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = file.parent().filter(|d| d.is_dir()) {
        command.current_dir(dir);
    }

    // Own process group, so a timeout can take down the tool's children too
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    debug!("Launching '{}' for {}", command_text, file.display());
    let mut child = command.spawn().map_err(|source| Error::Launch {
        command: command_text.clone(),
        source,
    })?;

    // Drain pipes on helper threads so a chatty child cannot fill them and stall
    let stdout_reader = drain_pipe("processor-stdout", child.stdout.take());
    let stderr_reader = drain_pipe("processor-stderr", child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(Error::Io(e));
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= spec.timeout {
            terminate(&mut child);
            info!(
                "TIMEOUT: '{}' took too long for '{}'",
                command_text,
                file.display()
            );
            // Reader threads end on their own once the group is gone and the pipes close
            return Err(Error::Timeout {
                command: command_text,
                timeout: spec.timeout,
            });
        }

        thread::sleep(POLL_INTERVAL.min(spec.timeout - elapsed));
    };

    Ok(ProcessOutput {
        status,
        stdout: join_pipe(stdout_reader),
        stderr: join_pipe(stderr_reader),
    })
}

/// Kill the child's process group (unix) and the child itself, then reap it
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            debug!("Failed to kill process group {}: {}", child.id(), e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain_pipe<R>(name: &str, pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    let mut pipe = pipe?;
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
        .ok()
}

fn join_pipe(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

//! Timeout-bounded execution of external commands.

use crate::RuntimeError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long to wait for output still buffered in a pipe once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One external command, run to completion under a timeout.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    dir: Option<PathBuf>,
    stdin: Option<String>,
    timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            stdin: None,
            timeout,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Data fed to the child's stdin by a writer thread, which then closes it.
    #[must_use]
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Human-readable command line, used in logs and errors.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the command and wait for it, killing it once the timeout expires.
    ///
    /// A non-zero exit status is an error carrying whatever the command
    /// printed.
    pub fn run(&self) -> Result<CommandOutput, RuntimeError> {
        let command = self.command_line();
        debug!("running {command} (timeout {}s)", self.timeout.as_secs());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| RuntimeError::ExecFailed {
            command: command.clone(),
            cause: e.to_string(),
            stdout: String::new(),
            stderr: String::new(),
        })?;

        if let (Some(data), Some(mut pipe)) = (self.stdin.clone(), child.stdin.take()) {
            thread::spawn(move || {
                if let Err(e) = pipe.write_all(data.as_bytes()) {
                    warn!("failed to write to child stdin: {e}");
                }
            });
        }
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // A timeout too large to represent as an instant means no deadline.
        let deadline = Instant::now().checked_add(self.timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                    kill(&mut child);
                    return Err(RuntimeError::Timeout {
                        command,
                        timeout: self.timeout,
                        stdout: collect(&stdout, DRAIN_GRACE),
                        stderr: collect(&stderr, DRAIN_GRACE),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill(&mut child);
                    return Err(RuntimeError::ExecFailed {
                        command,
                        cause: e.to_string(),
                        stdout: collect(&stdout, DRAIN_GRACE),
                        stderr: collect(&stderr, DRAIN_GRACE),
                    });
                }
            }
        };

        let remaining = deadline
            .map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()))
            .saturating_add(DRAIN_GRACE);
        let output = CommandOutput {
            stdout: collect(&stdout, remaining),
            stderr: collect(&stderr, remaining),
        };
        if status.success() {
            Ok(output)
        } else {
            Err(RuntimeError::ExecFailed {
                command,
                cause: status.to_string(),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

fn collect(rx: &Receiver<String>, wait: Duration) -> String {
    rx.recv_timeout(wait).unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

//! Process execution for VCS binaries.
//!
//! This is the **only** way RepoKeeper runs external commands. All adapter
//! operations go through [`Cmd`] to ensure consistent logging, combined
//! stdout/stderr error messages (the error classifier inspects both streams),
//! and enforcement of the ambient per-repo deadline.
//!
//! ## Deadlines
//!
//! Workers install a thread-scoped deadline with [`with_deadline`] before
//! making adapter calls. Every spawned process checks the remaining time and
//! is killed and reaped when it expires; the resulting error carries a
//! [`DeadlineExceeded`] sentinel that the classifier maps to `timeout`.

use std::cell::Cell;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use wait_timeout::ChildExt;

thread_local! {
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Run `f` with a per-thread deadline installed (no-op when `timeout` is None).
///
/// The previous deadline is restored afterwards, so nested scopes keep the
/// tighter bound of the two.
pub fn with_deadline<T>(timeout: Option<Duration>, f: impl FnOnce() -> T) -> T {
    let previous = DEADLINE.get();
    let candidate = timeout.map(|t| Instant::now() + t);
    let effective = match (previous, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    DEADLINE.set(effective);
    let result = f();
    DEADLINE.set(previous);
    result
}

/// The deadline currently installed on this thread, if any.
pub fn current_deadline() -> Option<Instant> {
    DEADLINE.with(|d| d.get())
}

/// Typed sentinel for a command killed by the per-repo deadline.
///
/// Kept as a dedicated error type so the classifier can detect timeouts by
/// downcast rather than by message sniffing.
#[derive(Debug)]
pub struct DeadlineExceeded {
    pub command: String,
}

impl std::fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline exceeded running `{}`", self.command)
    }
}

impl std::error::Error for DeadlineExceeded {}

/// Builder for a single external command invocation.
#[derive(Debug)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    context: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            context: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Short display name shown in debug traces, typically the repo directory.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run the command, capturing stdout and stderr.
    ///
    /// Respects the ambient deadline: the child is killed and reaped when the
    /// deadline expires, and the returned error chain contains
    /// [`DeadlineExceeded`].
    pub fn run(self) -> anyhow::Result<std::process::Output> {
        let cmd_str = self.display();
        match &self.context {
            Some(ctx) => log::debug!("$ {cmd_str} [{ctx}]"),
            None => log::debug!("$ {cmd_str}"),
        }

        let deadline = current_deadline();
        if let Some(deadline) = deadline
            && deadline <= Instant::now()
        {
            return Err(DeadlineExceeded { command: cmd_str }.into());
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let t0 = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{cmd_str}`"))?;

        // Drain both pipes on dedicated threads so the child can never block
        // on a full pipe buffer while we wait on it.
        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_handle = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let stderr_handle = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let status = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match child.wait_timeout(remaining)? {
                    Some(status) => status,
                    None => {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_handle.join();
                        let _ = stderr_handle.join();
                        log::debug!(
                            "[rk-trace] cmd=\"{}\" dur={:.1}ms killed=deadline",
                            cmd_str,
                            t0.elapsed().as_secs_f64() * 1000.0
                        );
                        return Err(DeadlineExceeded { command: cmd_str }.into());
                    }
                }
            }
            None => child.wait()?,
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        log::debug!(
            "[rk-trace] cmd=\"{}\" dur={:.1}ms ok={}",
            cmd_str,
            t0.elapsed().as_secs_f64() * 1000.0,
            status.success()
        );

        Ok(std::process::Output {
            status,
            stdout,
            stderr,
        })
    }

    /// Run the command and return stdout, failing on non-zero exit.
    ///
    /// On failure the error message combines stderr and stdout (some VCS
    /// commands print errors to stdout) so the classifier sees everything.
    pub fn run_checked(self) -> anyhow::Result<String> {
        let cmd_str = self.display();
        let output = self.run()?;

        if !output.status.success() {
            bail!("{}", combined_failure_message(&output, &cmd_str));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Merge stderr and stdout into a single trimmed error message.
fn combined_failure_message(output: &std::process::Output, cmd_str: &str) -> String {
    // Git uses \r for progress updates; normalize for stable messages.
    let stderr = String::from_utf8_lossy(&output.stderr).replace('\r', "\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if message.is_empty() {
        format!("`{cmd_str}` failed with {}", output.status)
    } else {
        message
    }
}

/// Short display name for a path, used in logging context.
pub fn path_context(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(".")
        .to_string()
}

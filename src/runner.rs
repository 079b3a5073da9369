//! External tool execution.
//!
//! Every acquisition and characterization tool (imager, scanners, extractors)
//! runs through here. Failures are data, not errors: a missing binary or a
//! timeout comes back as a [`ToolOutput`] with a conventional exit code so
//! the pipeline can record it as a provenance event and move on.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// Exit code reported when a tool exceeds its time limit.
pub const EXIT_TIMED_OUT: i64 = 124;

/// Exit code reported when a tool cannot be started at all.
pub const EXIT_SPAWN_FAILED: i64 = 127;

/// How long a `--version` probe may take.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status; [`EXIT_TIMED_OUT`] / [`EXIT_SPAWN_FAILED`] for
    /// invocations that never ran to completion.
    pub exit: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit == 0
    }

    /// Short outcome qualifier for the provenance record.
    pub fn outcome_note(&self) -> String {
        match self.exit {
            0 => "completed".to_owned(),
            EXIT_TIMED_OUT => "timed out".to_owned(),
            EXIT_SPAWN_FAILED => "failed to start".to_owned(),
            code => format!("exit status {code}"),
        }
    }
}

/// Render the command line the way it is recorded in provenance events.
pub fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Runs external tools with a time limit and caches their version strings.
#[derive(Debug, Default)]
pub struct ToolRunner {
    versions: Mutex<HashMap<String, String>>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `program` with `args`, killing it if `limit` elapses.
    pub async fn run(&self, program: &str, args: &[String], limit: Duration) -> ToolOutput {
        self.execute(program, args, None, limit).await
    }

    /// Like [`ToolRunner::run`] but with an explicit working directory, for
    /// tools that write output relative to where they run.
    pub async fn run_in(
        &self,
        program: &str,
        args: &[String],
        current_dir: &Path,
        limit: Duration,
    ) -> ToolOutput {
        self.execute(program, args, Some(current_dir), limit).await
    }

    /// The tool's version string, probed once per process via `--version` and
    /// cached. A probe that cannot run or prints nothing yields `"unknown"`.
    pub async fn version(&self, program: &str) -> String {
        if let Some(cached) = self
            .versions
            .lock()
            .expect("version cache poisoned")
            .get(program)
        {
            return cached.clone();
        }

        let output = self
            .run(program, &["--version".to_owned()], VERSION_PROBE_TIMEOUT)
            .await;

        // Some tools report their version on stderr.
        let version = first_line(&output.stdout)
            .or_else(|| first_line(&output.stderr))
            .unwrap_or("unknown")
            .to_owned();

        self.versions
            .lock()
            .expect("version cache poisoned")
            .insert(program.to_owned(), version.clone());
        version
    }

    async fn execute(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
        limit: Duration,
    ) -> ToolOutput {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = current_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ToolOutput {
                    exit: EXIT_SPAWN_FAILED,
                    stdout: String::new(),
                    stderr: format!("failed to start {program}: {e}"),
                    duration: started.elapsed(),
                };
            }
        };

        // Dropping the wait future on timeout kills the child via
        // kill_on_drop, so a hung tool cannot wedge the pipeline.
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => ToolOutput {
                exit: output.status.code().map(i64::from).unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: started.elapsed(),
            },
            Ok(Err(e)) => ToolOutput {
                exit: EXIT_SPAWN_FAILED,
                stdout: String::new(),
                stderr: format!("failed to collect output from {program}: {e}"),
                duration: started.elapsed(),
            },
            Err(_) => ToolOutput {
                exit: EXIT_TIMED_OUT,
                stdout: String::new(),
                stderr: format!("timed out after {}s", limit.as_secs()),
                duration: started.elapsed(),
            },
        }
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

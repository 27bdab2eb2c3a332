//! Structured command execution.
//!
//! Every external program the setup touches (`nmcli`, `apt`, `systemctl`,
//! `tee`, ...) is described by a [`CommandLine`]: a program plus an argument
//! vector, never a shell string. Operator-supplied values such as the SSID or
//! the WiFi passphrase therefore reach the target program verbatim, without
//! any shell interpretation.
//!
//! Execution goes through the [`CommandRunner`] trait so the provisioning
//! sequence can run against the real system ([`SystemRunner`]), in preview
//! mode ([`DryRunRunner`]), or against a recording fake in tests.
//!
//! # Check modes
//!
//! [`run`] either treats a non-zero exit as fatal ([`Check::Fatal`]) and
//! returns [`SetupError::CommandFailed`], or tolerates it
//! ([`Check::BestEffort`]) and hands back whatever was printed on stdout.

use anyhow::Result;
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::SetupError;

const REDACTED: &str = "********";

/// A program invocation described as an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
    secret_args: Vec<usize>,
    query: bool,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            secret_args: Vec::new(),
            query: false,
        }
    }

    /// Build a command that runs through `sudo` when `use_sudo` is set.
    pub fn privileged(program: impl Into<String>, use_sudo: bool) -> Self {
        if use_sudo {
            Self::new("sudo").arg(program)
        } else {
            Self::new(program)
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

    /// Append an argument that must never be printed or logged.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Data written to the child's stdin.
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Mark the command as read-only. Dry runs still execute queries.
    pub fn query(mut self) -> Self {
        self.query = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin_data(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn is_query(&self) -> bool {
        self.query
    }

    /// Program followed by its arguments, secrets included.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&i) {
                write!(f, " {}", REDACTED)?;
            } else {
                write!(f, " {}", quote(arg))?;
            }
        }
        Ok(())
    }
}

/// Quote an argument for display so the printed line reads like a shell command.
fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal or exited
    /// cleanly without taking all of its stdin.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes [`CommandLine`]s.
pub trait CommandRunner {
    /// Run the command to completion. An `Err` means the process could not be
    /// started at all; a non-zero exit is reported through [`CommandOutput`].
    fn execute(&mut self, command: &CommandLine) -> io::Result<CommandOutput>;
}

/// Whether a non-zero exit aborts the setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Check {
    #[default]
    Fatal,
    BestEffort,
}

/// Print, execute, and check a command.
///
/// Returns the trimmed stdout. With [`Check::Fatal`] a non-zero exit becomes
/// [`SetupError::CommandFailed`] and a spawn failure [`SetupError::Spawn`];
/// with [`Check::BestEffort`] both are logged and an empty or partial stdout
/// is returned instead.
pub fn run<R: CommandRunner + ?Sized>(
    runner: &mut R,
    command: &CommandLine,
    check: Check,
) -> Result<String> {
    println!("Running: {}", command);
    debug!(command = %command, ?check, "executing");

    let output = match runner.execute(command) {
        Ok(output) => output,
        Err(source) => {
            return match check {
                Check::Fatal => Err(SetupError::Spawn {
                    command: command.to_string(),
                    source,
                }
                .into()),
                Check::BestEffort => {
                    warn!(command = %command, error = %source, "could not start command, continuing");
                    Ok(String::new())
                }
            };
        }
    };

    if !output.is_success() {
        let stderr = output.stderr.trim().to_string();
        match check {
            Check::Fatal => {
                return Err(SetupError::CommandFailed {
                    command: command.to_string(),
                    code: output.code,
                    stderr,
                }
                .into());
            }
            Check::BestEffort => {
                warn!(command = %command, code = ?output.code, %stderr, "command failed, continuing");
            }
        }
    }

    Ok(output.stdout.trim().to_string())
}

/// Run a read-only command and return its trimmed stdout only if it succeeded.
///
/// Used for lookups where failure simply means "not there".
pub fn probe<R: CommandRunner + ?Sized>(runner: &mut R, command: &CommandLine) -> Option<String> {
    debug!(command = %command, "probing");
    match runner.execute(command) {
        Ok(output) if output.is_success() => Some(output.stdout.trim().to_string()),
        Ok(output) => {
            debug!(command = %command, code = ?output.code, "probe failed");
            None
        }
        Err(e) => {
            debug!(command = %command, error = %e, "probe could not start");
            None
        }
    }
}

/// Runs commands on the local system with [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn execute(&mut self, command: &CommandLine) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match command.stdin_data() {
            Some(data) => {
                cmd.stdin(Stdio::piped());
                let mut child = cmd.spawn()?;
                let written = match child.stdin.take() {
                    Some(mut stdin) => stdin.write_all(data.as_bytes()),
                    None => Ok(()),
                };
                // Reap the child before looking at the write result.
                let output = child.wait_with_output()?;
                if let Err(e) = written {
                    warn!(command = %command, error = %e, "stdin not fully delivered");
                    let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!("stdin not fully delivered: {}", e));
                    let code = output.status.code().filter(|c| *c != 0);
                    return Ok(CommandOutput {
                        code,
                        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                        stderr,
                    });
                }
                output
            }
            None => {
                cmd.stdin(Stdio::inherit());
                cmd.output()?
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Executes read-only queries, only announces everything else.
#[derive(Debug)]
pub struct DryRunRunner<R> {
    inner: R,
}

impl<R: CommandRunner> DryRunRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: CommandRunner> CommandRunner for DryRunRunner<R> {
    fn execute(&mut self, command: &CommandLine) -> io::Result<CommandOutput> {
        if command.is_query() {
            return self.inner.execute(command);
        }
        println!("  (dry run, not executed)");
        Ok(CommandOutput::success(""))
    }
}

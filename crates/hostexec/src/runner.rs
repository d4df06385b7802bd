//! Command execution abstraction.
//!
//! The [`CommandRunner`] trait is the single seam through which every
//! external program is started, allowing for:
//! - Real process execution via [`SystemRunner`]
//! - Recorded, scripted execution via [`ScriptedRunner`] in tests
//!
//! Runners never retry. Retry policy belongs to callers (see [`crate::retry`]).

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A single external program invocation.
///
/// Built like [`std::process::Command`], but plain data so it can be
/// logged, compared, and recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Working directory, inherited when unset
    pub cwd: Option<PathBuf>,
    /// Variables layered over the inherited environment, in order
    pub env: Vec<(String, String)>,
    /// Hand the program this process's stdout and stderr instead of capturing them
    pub inherit_output: bool,
}

impl Invocation {
    /// Start an invocation of `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            argv: vec![lossy(program)],
            ..Default::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.argv.push(lossy(arg));
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.argv.extend(args.into_iter().map(lossy));
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Let the program write straight to this process's stdout and stderr.
    ///
    /// Needed for programs that fork a daemon: a daemon holding capture
    /// pipes open would keep the runner waiting forever.
    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    /// The program being invoked.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// The command line as a single space-separated string, for logs and errors.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// Look up an environment variable set on this invocation.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn lossy(s: impl AsRef<OsStr>) -> String {
    s.as_ref().to_string_lossy().into_owned()
}

/// Output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout followed by stderr
    pub output: String,
}

/// Runs external programs to completion.
pub trait CommandRunner {
    /// Run an invocation and wait for it.
    ///
    /// Returns the captured output if the program exited with status zero,
    /// and [`Error::CommandFailed`] with the captured output otherwise,
    /// including when the program could not be started.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run an invocation and report only whether it succeeded.
    fn succeeds(&self, invocation: &Invocation) -> bool {
        self.run(invocation).is_ok()
    }
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let (program, args) = invocation.argv.split_first().ok_or(Error::EmptyCommand)?;
        let command_line = invocation.command_line();
        log::debug!("Running: {command_line}");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .envs(invocation.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        if invocation.inherit_output {
            let status = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| Error::CommandFailed {
                    command: command_line.clone(),
                    reason: format!("could not start: {e}"),
                    output: String::new(),
                })?;
            return if status.success() {
                log::trace!("{command_line} succeeded");
                Ok(CommandOutput::default())
            } else {
                Err(Error::CommandFailed {
                    command: command_line,
                    reason: status.to_string(),
                    output: String::new(),
                })
            };
        }

        let output = cmd.output().map_err(|e| Error::CommandFailed {
            command: command_line.clone(),
            reason: format!("could not start: {e}"),
            output: String::new(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            log::trace!("{command_line} succeeded");
            Ok(CommandOutput { output: combined })
        } else {
            Err(Error::CommandFailed {
                command: command_line,
                reason: output.status.to_string(),
                output: combined,
            })
        }
    }
}

#[derive(Debug)]
struct FailureRule {
    needle: String,
    remaining: Option<usize>,
    output: String,
}

/// Runner that records invocations instead of spawning them.
///
/// Every invocation succeeds with empty output unless a failure rule
/// matches its command line. Rules match by substring and are checked in
/// the order they were added.
///
/// ```
/// use hostexec::{CommandRunner, Invocation, ScriptedRunner};
///
/// let runner = ScriptedRunner::new().fail_times("docker pull", 2);
/// let pull = Invocation::new("docker").args(["pull", "busybox"]);
///
/// assert!(runner.run(&pull).is_err());
/// assert!(runner.run(&pull).is_err());
/// assert!(runner.run(&pull).is_ok());
/// assert_eq!(runner.count_matching("docker pull"), 3);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    calls: RefCell<Vec<Invocation>>,
    rules: RefCell<Vec<FailureRule>>,
}

impl ScriptedRunner {
    /// Create a runner where everything succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` invocations whose command line contains `needle`.
    pub fn fail_times(self, needle: impl Into<String>, times: usize) -> Self {
        self.rules.borrow_mut().push(FailureRule {
            needle: needle.into(),
            remaining: Some(times),
            output: String::new(),
        });
        self
    }

    /// Fail every invocation whose command line contains `needle`.
    pub fn fail_always(self, needle: impl Into<String>) -> Self {
        self.rules.borrow_mut().push(FailureRule {
            needle: needle.into(),
            remaining: None,
            output: String::new(),
        });
        self
    }

    /// Fail every matching invocation, reporting `output` as what the program printed.
    pub fn fail_with_output(self, needle: impl Into<String>, output: impl Into<String>) -> Self {
        self.rules.borrow_mut().push(FailureRule {
            needle: needle.into(),
            remaining: None,
            output: output.into(),
        });
        self
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Recorded command lines, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    /// Number of recorded invocations whose command line contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|inv| inv.command_line().contains(needle))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        if invocation.argv.is_empty() {
            return Err(Error::EmptyCommand);
        }
        self.calls.borrow_mut().push(invocation.clone());

        let command_line = invocation.command_line();
        let mut rules = self.rules.borrow_mut();
        let matched = rules.iter_mut().find(|rule| {
            command_line.contains(&rule.needle) && rule.remaining.is_none_or(|n| n > 0)
        });

        match matched {
            Some(rule) => {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                Err(Error::CommandFailed {
                    command: command_line,
                    reason: "exit status: 1".to_string(),
                    output: rule.output.clone(),
                })
            }
            None => Ok(CommandOutput::default()),
        }
    }
}

//! External command execution.
//!
//! Every real operation this system performs — generating the env file,
//! issuing certificates, starting containers, dumping databases — is an
//! external command. [`CommandRunner`] is the seam: production uses
//! [`SystemCommandRunner`], which spawns the process with `tokio::process`
//! and captures stdout/stderr in full; tests use `ScriptedRunner` (feature
//! `test-util`) to record invocations and return canned output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::CommandError;

/// An argument vector for an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute, resolved through `PATH`.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a command from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `make <target>`.
    pub fn make(target: &str) -> Self {
        Self::new("make", [target])
    }

    /// `sh -c <script>`.
    pub fn shell(script: &str) -> Self {
        Self::new("sh", ["-c", script])
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Complete stdout, lossily decoded as UTF-8.
    pub stdout: String,
    /// Complete stderr, lossily decoded as UTF-8.
    pub stderr: String,
    /// Exit code, `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// A zero exit code.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr on its own line when stderr is non-empty.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs external commands to completion.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `spec`, feeding `stdin` if given, and wait for it to exit.
    ///
    /// A non-zero exit is *not* an error: it is reported through
    /// [`CommandOutput::exit_code`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the process cannot be spawned or its
    /// output cannot be collected.
    async fn run(&self, spec: &CommandSpec, stdin: Option<&str>)
    -> Result<CommandOutput, CommandError>;
}

/// Spawns real processes in a fixed working directory.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    working_dir: PathBuf,
}

impl SystemCommandRunner {
    /// Create a runner that starts every command in `working_dir`.
    #[must_use]
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<&str>,
    ) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&self.working_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %spec, cwd = %self.working_dir.display(), "spawning command");

        let mut child = cmd.spawn().map_err(|e| CommandError::Spawn {
            command: spec.to_string(),
            reason: e.to_string(),
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // The child may exit without reading everything; that shows up in
            // its exit code, not here.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                tracing::debug!(command = %spec, error = %e, "stdin closed early");
            }
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CommandError::Io {
                command: spec.to_string(),
                reason: e.to_string(),
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(command = %spec, exit_code, "command finished");

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{Invocation, ScriptedRunner};

#[cfg(any(test, feature = "test-util"))]
mod scripted {
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use super::{CommandOutput, CommandRunner, CommandSpec};
    use crate::error::CommandError;

    /// One recorded call to [`ScriptedRunner::run`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        /// The command line as displayed (`make up`).
        pub command: String,
        /// Stdin that was fed to the command.
        pub stdin: Option<String>,
    }

    #[derive(Debug, Clone)]
    enum Reply {
        Output(CommandOutput),
        SpawnError,
    }

    #[derive(Debug, Default)]
    struct Inner {
        replies: Vec<(String, Reply)>,
        delays: Vec<(String, Duration)>,
        calls: Vec<Invocation>,
    }

    /// A [`CommandRunner`] that never spawns anything.
    ///
    /// Replies are matched by command-line prefix, first registration wins;
    /// unmatched commands succeed with empty output. Clones share the script
    /// and the call record.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedRunner {
        inner: Arc<Mutex<Inner>>,
    }

    impl ScriptedRunner {
        /// A runner where every command succeeds silently.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn push(&self, prefix: &str, reply: Reply) {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .replies
                .push((prefix.to_owned(), reply));
        }

        /// Exit 0 with the given stdout for commands starting with `prefix`.
        pub fn succeed(&self, prefix: &str, stdout: &str) -> &Self {
            self.push(
                prefix,
                Reply::Output(CommandOutput {
                    stdout: stdout.to_owned(),
                    ..CommandOutput::default()
                }),
            );
            self
        }

        /// Exit with `exit_code` and the given streams.
        pub fn respond(&self, prefix: &str, exit_code: i32, stdout: &str, stderr: &str) -> &Self {
            self.push(
                prefix,
                Reply::Output(CommandOutput {
                    stdout: stdout.to_owned(),
                    stderr: stderr.to_owned(),
                    exit_code,
                }),
            );
            self
        }

        /// Exit 1 with the given stderr.
        pub fn fail(&self, prefix: &str, stderr: &str) -> &Self {
            self.respond(prefix, 1, "", stderr)
        }

        /// Refuse to spawn commands starting with `prefix`.
        pub fn spawn_error(&self, prefix: &str) -> &Self {
            self.push(prefix, Reply::SpawnError);
            self
        }

        /// Hold commands starting with `prefix` for `delay` before replying.
        pub fn delay(&self, prefix: &str, delay: Duration) -> &Self {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .delays
                .push((prefix.to_owned(), delay));
            self
        }

        /// Every call made so far, in order.
        pub fn calls(&self) -> Vec<Invocation> {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .calls
                .clone()
        }

        /// Command lines of every call made so far.
        pub fn commands(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.command).collect()
        }
    }

    #[async_trait::async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            spec: &CommandSpec,
            stdin: Option<&str>,
        ) -> Result<CommandOutput, CommandError> {
            let command = spec.to_string();
            let (reply, delay) = {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.calls.push(Invocation {
                    command: command.clone(),
                    stdin: stdin.map(str::to_owned),
                });
                let reply = inner
                    .replies
                    .iter()
                    .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                    .map(|(_, reply)| reply.clone());
                let delay = inner
                    .delays
                    .iter()
                    .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                    .map(|(_, delay)| *delay);
                (reply, delay)
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            match reply {
                Some(Reply::Output(out)) => Ok(out),
                Some(Reply::SpawnError) => Err(CommandError::Spawn {
                    command,
                    reason: "No such file or directory (os error 2)".to_owned(),
                }),
                None => Ok(CommandOutput::default()),
            }
        }
    }
}

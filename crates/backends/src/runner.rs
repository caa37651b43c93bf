//! The `ProcessRunner` trait — the only way this workspace runs external tools.

use std::process::Stdio;

use async_trait::async_trait;
use safety::environment::redact;
use tracing::debug;

use crate::ProcessError;

/// A single program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
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

    /// Shell-like rendering with connection strings redacted.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| {
                let arg = if arg.contains("://") { redact(arg) } else { arg.clone() };
                if arg.contains(' ') { format!("{arg:?}") } else { arg }
            }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a command with extra environment variables and captures its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec, env: &[(String, String)]) -> Result<ProcessOutput, ProcessError>;
}

/// Spawns real child processes through tokio.
///
/// No timeout is enforced; the tool's own lifetime bounds the call.
#[derive(Debug, Default, Clone)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &CommandSpec, env: &[(String, String)]) -> Result<ProcessOutput, ProcessError> {
        debug!(command = %command, "spawning");
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => ProcessError::Spawn {
                    program: command.program.clone(),
                    message: e.to_string(),
                },
                _ => ProcessError::Io {
                    program: command.program.clone(),
                    message: e.to_string(),
                },
            })?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal: no code, treat as failure.
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_redacts_connection_strings_and_quotes_spaces() {
        let cmd = CommandSpec::new(
            "psql",
            ["postgres://app:secret@db/km0_db", "-c", "DROP SCHEMA public CASCADE;"],
        );
        let line = cmd.to_string();
        assert!(!line.contains("secret"));
        assert!(line.starts_with("psql postgres://app:***@db/km0_db -c "));
        assert!(line.ends_with("\"DROP SCHEMA public CASCADE;\""));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let cmd = CommandSpec::new("definitely-not-a-real-binary-dbgate", Vec::<String>::new());
        let err = TokioProcessRunner.run(&cmd, &[]).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}

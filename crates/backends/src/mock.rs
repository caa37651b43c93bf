//! `MockRunner` — a test double for `ProcessRunner`.
//!
//! Useful wherever a real migration tool is unavailable or irrelevant.
//! Replies are chosen by the first rule whose needle occurs in the rendered
//! command line; unmatched commands succeed.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{CommandSpec, ProcessError, ProcessOutput, ProcessRunner};

/// Behaviour injected into `MockRunner` for matching commands.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Exit 0 with the given stdout.
    Succeed(String),
    /// Exit with a non-zero code and the given stderr.
    Exit { code: i32, stderr: String },
    /// Fail to spawn at all.
    SpawnError(String),
    /// Exit 0 after writing `contents` to the path that follows `flag`.
    WriteFile { flag: String, contents: Vec<u8> },
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub command: CommandSpec,
    pub env: Vec<(String, String)>,
}

/// A mock runner that records every call it receives.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    rules: Vec<(String, MockBehaviour)>,
    /// All calls seen by this runner (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockRunner {
    /// A runner on which every command succeeds.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Commands containing `needle` print `stdout` and succeed.
    pub fn replying(mut self, needle: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.rules.push((needle.into(), MockBehaviour::Succeed(stdout.into())));
        self
    }

    /// Commands containing `needle` exit with `code`.
    pub fn failing_on(mut self, needle: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        self.rules.push((
            needle.into(),
            MockBehaviour::Exit {
                code,
                stderr: stderr.into(),
            },
        ));
        self
    }

    /// Commands containing `needle` write `contents` to their `--file` argument.
    pub fn writing_file(mut self, needle: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.rules.push((
            needle.into(),
            MockBehaviour::WriteFile {
                flag: "--file".into(),
                contents: contents.into(),
            },
        ));
        self
    }

    /// Commands containing `needle` cannot be started.
    pub fn spawn_error_on(mut self, needle: impl Into<String>, msg: impl Into<String>) -> Self {
        self.rules.push((needle.into(), MockBehaviour::SpawnError(msg.into())));
        self
    }

    /// Number of commands run so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Rendered command lines, in call order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.command.display_line())
            .collect()
    }

    pub fn recorded(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, command: &CommandSpec, env: &[(String, String)]) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(MockCall {
            command: command.clone(),
            env: env.to_vec(),
        });

        let line = command.display_line();
        let behaviour = self
            .rules
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, b)| b.clone())
            .unwrap_or_else(|| MockBehaviour::Succeed(format!("ok: {line}")));

        match behaviour {
            MockBehaviour::Succeed(stdout) => Ok(ProcessOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            }),
            MockBehaviour::Exit { code, stderr } => Ok(ProcessOutput {
                stdout: String::new(),
                stderr,
                exit_code: code,
            }),
            MockBehaviour::SpawnError(message) => Err(ProcessError::Spawn {
                program: command.program.clone(),
                message,
            }),
            MockBehaviour::WriteFile { flag, contents } => {
                let target = command
                    .args
                    .iter()
                    .skip_while(|arg| **arg != flag)
                    .nth(1)
                    .ok_or_else(|| ProcessError::Spawn {
                        program: command.program.clone(),
                        message: format!("no {flag} argument"),
                    })?;
                let written = tokio::fs::write(target, &contents).await;
                Ok(match written {
                    Ok(()) => ProcessOutput::default(),
                    Err(e) => ProcessOutput {
                        stdout: String::new(),
                        stderr: e.to_string(),
                        exit_code: 1,
                    },
                })
            }
        }
    }
}

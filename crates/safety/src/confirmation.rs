//! Confirmation protocol: `AwaitingConfirmation → Confirmed | Cancelled`.
//!
//! Production never reaches a confirmer; the protocol resolves to
//! `Cancelled` there unless the effective level is `disabled`.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::{Environment, Operation, RiskClassification, SafetyLevel};

/// Literal token an operator must type to confirm.
pub const CONFIRMATION_TOKEN: &str = "CONFIRM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    AwaitingConfirmation,
    Confirmed,
    Cancelled,
}

impl ConfirmationState {
    /// Compare an operator's answer with [`CONFIRMATION_TOKEN`].
    pub fn from_answer(answer: &str) -> Self {
        if answer.trim() == CONFIRMATION_TOKEN {
            Self::Confirmed
        } else {
            Self::Cancelled
        }
    }
}

/// What the operator is shown before answering.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationRequest<'a> {
    pub operation: &'a Operation,
    pub classification: &'a RiskClassification,
    pub environment: Environment,
    /// Command lines that run once confirmed; empty when not known up front.
    pub planned: &'a [String],
}

impl std::fmt::Display for ConfirmationRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Operation:      {}", self.operation.raw())?;
        writeln!(f, "Action:         {}", self.operation.intended_action())?;
        writeln!(f, "Classification: {} ({})", self.classification.risk, self.classification.reason)?;
        writeln!(f, "Environment:    {}", self.environment)?;
        for line in self.planned {
            writeln!(f, "Will run:       {line}")?;
        }
        write!(f, "Type {CONFIRMATION_TOKEN} to proceed: ")
    }
}

/// A channel that can ask an operator for confirmation.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, request: &ConfirmationRequest<'_>) -> ConfirmationState;
}

/// Prompts on stderr and reads one line from stdin.
#[derive(Debug, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, request: &ConfirmationRequest<'_>) -> ConfirmationState {
        let mut stderr = std::io::stderr().lock();
        if write!(stderr, "\n{request}").and_then(|_| stderr.flush()).is_err() {
            return ConfirmationState::Cancelled;
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => ConfirmationState::from_answer(&answer),
            Err(_) => ConfirmationState::Cancelled,
        }
    }
}

/// Used when no terminal is attached: every request is cancelled.
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Confirmer for NonInteractive {
    fn confirm(&self, _request: &ConfirmationRequest<'_>) -> ConfirmationState {
        ConfirmationState::Cancelled
    }
}

/// Replies with pre-recorded answers and remembers what it was asked.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<Vec<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    /// Answers are consumed in order; once exhausted every request is cancelled.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut answers: Vec<String> = answers.into_iter().map(Into::into).collect();
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Raw text of every operation this confirmer was asked about.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, request: &ConfirmationRequest<'_>) -> ConfirmationState {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(request.operation.raw().to_owned());
        }
        match self.answers.lock().ok().and_then(|mut a| a.pop()) {
            Some(answer) => ConfirmationState::from_answer(&answer),
            None => ConfirmationState::Cancelled,
        }
    }
}

/// Run the protocol for one request.
pub fn run_protocol(
    request: &ConfirmationRequest<'_>,
    level: SafetyLevel,
    confirmer: &dyn Confirmer,
) -> ConfirmationState {
    if level == SafetyLevel::Disabled {
        return ConfirmationState::Confirmed;
    }
    if request.environment.is_production() {
        warn!(
            operation = request.operation.raw(),
            "production operations are never confirmed interactively; cancelling"
        );
        return ConfirmationState::Cancelled;
    }
    confirmer.confirm(request)
}

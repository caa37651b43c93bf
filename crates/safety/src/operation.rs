//! The `Operation` value built by every command before anything runs.

use serde::{Deserialize, Serialize};

use crate::{Environment, SafetyError};

/// Abstract action understood by the dispatcher and backup manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntendedAction {
    Generate,
    Push,
    Migrate,
    MigrateDeploy,
    Reset,
    Studio,
    Seed,
    Backup,
    Restore,
    Introspect,
    GenerateClient,
    Status,
}

impl IntendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Push => "push",
            Self::Migrate => "migrate",
            Self::MigrateDeploy => "migrate-deploy",
            Self::Reset => "reset",
            Self::Studio => "studio",
            Self::Seed => "seed",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Introspect => "introspect",
            Self::GenerateClient => "generate-client",
            Self::Status => "status",
        }
    }
}

impl std::fmt::Display for IntendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most specific phrases first; the first hit decides the action.
///
/// Only whole words of the verb part are matched, so a migration named
/// `drop_legacy_column` or a flag such as `--delete-existing` never changes
/// the action.  Risk words anywhere in the text are still seen by the
/// classifier.
const ACTION_KEYWORDS: &[(&str, IntendedAction)] = &[
    ("migrate deploy", IntendedAction::MigrateDeploy),
    ("migrate reset", IntendedAction::Reset),
    ("migrate status", IntendedAction::Status),
    ("migrate dev", IntendedAction::Migrate),
    ("generate client", IntendedAction::GenerateClient),
    ("generate-client", IntendedAction::GenerateClient),
    ("migrate-deploy", IntendedAction::MigrateDeploy),
    ("migrate", IntendedAction::Migrate),
    ("reset", IntendedAction::Reset),
    ("push", IntendedAction::Push),
    ("generate", IntendedAction::Generate),
    ("studio", IntendedAction::Studio),
    ("seed", IntendedAction::Seed),
    ("backup", IntendedAction::Backup),
    ("restore", IntendedAction::Restore),
    ("introspect", IntendedAction::Introspect),
    ("pull", IntendedAction::Introspect),
    ("client", IntendedAction::GenerateClient),
    ("status", IntendedAction::Status),
];

/// A requested schema or data operation.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    raw: String,
    intended_action: IntendedAction,
    target_environment: Environment,
}

impl Operation {
    pub fn new(raw: impl Into<String>, intended_action: IntendedAction, target_environment: Environment) -> Self {
        Self {
            raw: raw.into(),
            intended_action,
            target_environment,
        }
    }

    /// Build an operation from free text such as `"migrate reset --force"`.
    ///
    /// The action is read from the words before the first flag.
    ///
    /// # Errors
    /// [`SafetyError::UnknownOperation`] when no keyword matches.
    pub fn parse(raw: &str, target_environment: Environment) -> Result<Self, SafetyError> {
        let normalized = raw.trim().to_lowercase();
        let verbs: Vec<&str> = normalized
            .split_whitespace()
            .take_while(|word| !word.starts_with('-'))
            .collect();
        let action = ACTION_KEYWORDS
            .iter()
            .find(|(keyword, _)| contains_phrase(&verbs, keyword))
            .map(|(_, action)| *action)
            .ok_or_else(|| SafetyError::UnknownOperation(raw.trim().to_owned()))?;
        Ok(Self::new(raw.trim(), action, target_environment))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn intended_action(&self) -> IntendedAction {
        self.intended_action
    }

    pub fn target_environment(&self) -> Environment {
        self.target_environment
    }
}

/// `phrase` occurs in `words` as a run of whole words.
fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let phrase: Vec<&str> = phrase.split(' ').collect();
    words.windows(phrase.len()).any(|window| window == phrase.as_slice())
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({} on {})", self.raw, self.intended_action, self.target_environment)
    }
}

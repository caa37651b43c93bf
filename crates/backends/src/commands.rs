//! Per-backend command tables.
//!
//! Each backend turns an abstract [`IntendedAction`] into an ordered list of
//! [`CommandSpec`]s.  Adding a backend means adding a `Backend` variant and
//! one implementation here; the dispatcher and workflow stay untouched.

use safety::{Backend, IntendedAction, ToolPaths};

use crate::{CommandSpec, DispatchError};

/// Maps abstract actions onto one backend's concrete commands.
pub trait BackendCommands: Send + Sync {
    fn backend(&self) -> Backend;

    /// Commands to run, in order.  An empty list means "nothing to do".
    fn commands(&self, action: IntendedAction) -> Result<Vec<CommandSpec>, DispatchError>;

    fn unsupported(&self, action: IntendedAction) -> DispatchError {
        DispatchError::Unsupported {
            action,
            backend: self.backend(),
        }
    }
}

/// Pick the command table for `backend`.
pub fn commands_for(backend: Backend, tools: &ToolPaths, database_url: &str) -> Box<dyn BackendCommands> {
    match backend {
        Backend::Declarative => Box::new(DeclarativeCommands {
            program: tools.declarative.clone(),
        }),
        Backend::SqlMigrations => Box::new(SqlMigrationCommands {
            program: tools.sql.clone(),
            psql: tools.psql.clone(),
            database_url: database_url.to_owned(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Backend A: declarative schema tool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeclarativeCommands {
    program: String,
}

impl BackendCommands for DeclarativeCommands {
    fn backend(&self) -> Backend {
        Backend::Declarative
    }

    fn commands(&self, action: IntendedAction) -> Result<Vec<CommandSpec>, DispatchError> {
        let args: &[&str] = match action {
            IntendedAction::Generate => &["migrate", "dev", "--create-only", "--skip-seed"],
            IntendedAction::Push => &["db", "push"],
            IntendedAction::Migrate => &["migrate", "dev"],
            IntendedAction::MigrateDeploy => &["migrate", "deploy"],
            IntendedAction::Reset => &["migrate", "reset", "--force", "--skip-seed"],
            IntendedAction::Studio => &["studio"],
            IntendedAction::Seed => &["db", "seed"],
            IntendedAction::Introspect => &["db", "pull"],
            IntendedAction::GenerateClient => &["generate"],
            IntendedAction::Status => &["migrate", "status"],
            IntendedAction::Backup | IntendedAction::Restore => return Err(self.unsupported(action)),
        };
        Ok(vec![CommandSpec::new(&self.program, args.iter().copied())])
    }
}

// ---------------------------------------------------------------------------
// Backend B: imperative SQL-migration tool
// ---------------------------------------------------------------------------

/// SQL used by the drop half of `reset`; the tool has no native reset verb.
pub const DROP_SCHEMA_SQL: &str = "DROP SCHEMA public CASCADE; CREATE SCHEMA public;";

#[derive(Debug, Clone)]
pub struct SqlMigrationCommands {
    program: String,
    psql: String,
    database_url: String,
}

impl SqlMigrationCommands {
    fn tool(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.program, args.iter().copied())
    }
}

impl BackendCommands for SqlMigrationCommands {
    fn backend(&self) -> Backend {
        Backend::SqlMigrations
    }

    fn commands(&self, action: IntendedAction) -> Result<Vec<CommandSpec>, DispatchError> {
        let commands = match action {
            IntendedAction::Generate => vec![self.tool(&["generate"])],
            IntendedAction::Push => vec![self.tool(&["push"])],
            IntendedAction::Migrate | IntendedAction::MigrateDeploy => vec![self.tool(&["migrate"])],
            IntendedAction::Reset => vec![
                CommandSpec::new(
                    &self.psql,
                    [self.database_url.as_str(), "-v", "ON_ERROR_STOP=1", "-c", DROP_SCHEMA_SQL],
                ),
                self.tool(&["migrate"]),
            ],
            IntendedAction::Studio => vec![self.tool(&["studio"])],
            IntendedAction::Introspect => vec![self.tool(&["introspect"])],
            IntendedAction::Status => vec![self.tool(&["check"])],
            // Query builders without a generated client have nothing to regenerate.
            IntendedAction::GenerateClient => Vec::new(),
            IntendedAction::Seed | IntendedAction::Backup | IntendedAction::Restore => {
                return Err(self.unsupported(action))
            }
        };
        Ok(commands)
    }
}

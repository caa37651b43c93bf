//! Hard failures of the safety layer.
//!
//! Classification and policy outcomes are never errors; only configuration
//! and naming problems end up here.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SafetyError {
    // ------ Configuration errors ------

    /// A required environment variable is absent.
    #[error("configuration error: required variable {0} is not set")]
    MissingVariable(&'static str),

    /// A variable holds a value outside its accepted set.
    #[error("configuration error: {variable}={value:?} is not one of {expected}")]
    InvalidVariable {
        variable: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The connection string has no recognisable database name.
    #[error("configuration error: cannot parse database url '{0}'")]
    InvalidDatabaseUrl(String),

    // ------ Naming errors ------

    /// The connection string targets another environment's database.
    #[error(
        "naming violation: {environment} expects database '{expected}' but the connection targets '{actual}'"
    )]
    NamingViolation {
        environment: String,
        expected: String,
        actual: String,
    },

    // ------ Operation errors ------

    /// The operation was built for another environment than the active one.
    #[error("environment mismatch: operation targets {requested} but the active environment is {active}")]
    EnvironmentMismatch { requested: String, active: String },

    /// Free text that maps onto no known action.
    #[error("unknown operation: '{0}'")]
    UnknownOperation(String),
}

impl SafetyError {
    /// `true` for the `ConfigurationError` family.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingVariable(_) | Self::InvalidVariable { .. } | Self::InvalidDatabaseUrl(_)
        )
    }
}

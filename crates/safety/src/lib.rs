//! `safety` crate — environment resolution, operation risk classification,
//! policy decisions and the confirmation protocol.
//!
//! Nothing in here spawns processes or touches the database.  Every other
//! crate asks the [`SafetyGate`] before doing something irreversible.

pub mod config;
pub mod error;
pub mod environment;
pub mod operation;
pub mod classifier;
pub mod policy;
pub mod confirmation;
pub mod gate;

pub use config::{Backend, Config, Environment, SafetyLevel, ToolPaths};
pub use error::SafetyError;
pub use environment::{DatabaseNamingRule, EnvironmentContext, ResolvedEnvironment};
pub use operation::{IntendedAction, Operation};
pub use classifier::{classify, Risk, RiskClassification};
pub use policy::{decide, effective_level, PolicyDecision};
pub use confirmation::{ConfirmationState, Confirmer, NonInteractive, ScriptedConfirmer, StdinConfirmer};
pub use gate::{GateVerdict, SafetyGate};

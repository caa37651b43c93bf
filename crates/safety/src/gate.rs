//! `SafetyGate` — naming check, classification, policy and confirmation in one call.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::{classify, Risk, RiskClassification};
use crate::confirmation::{run_protocol, ConfirmationRequest, Confirmer};
use crate::policy::{decide, PolicyDecision};
use crate::{Config, Environment, EnvironmentContext, Operation, ResolvedEnvironment, SafetyError, SafetyLevel};

/// What the gate concluded for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    Proceed {
        classification: RiskClassification,
        decision: PolicyDecision,
    },
    Blocked {
        classification: RiskClassification,
        reason: String,
    },
}

impl GateVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Proceed { .. })
    }

    pub fn classification(&self) -> &RiskClassification {
        match self {
            Self::Proceed { classification, .. } | Self::Blocked { classification, .. } => classification,
        }
    }
}

/// Asks every question that has to be answered before a backend is touched.
#[derive(Clone)]
pub struct SafetyGate {
    context: EnvironmentContext,
    level: SafetyLevel,
    confirmer: Arc<dyn Confirmer>,
}

impl std::fmt::Debug for SafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGate")
            .field("context", &self.context)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl SafetyGate {
    pub fn new(config: &Config, confirmer: Arc<dyn Confirmer>) -> Self {
        Self {
            context: EnvironmentContext::new(config),
            level: config.safety_level,
            confirmer,
        }
    }

    pub fn environment(&self) -> Environment {
        self.context.environment()
    }

    pub fn level(&self) -> SafetyLevel {
        self.level
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    /// Environment resolution plus naming validation.
    ///
    /// # Errors
    /// Configuration and naming errors; both are fatal for the invocation.
    pub fn check(&self) -> Result<ResolvedEnvironment, SafetyError> {
        self.context.check()
    }

    /// `op` was built for the active environment.
    ///
    /// # Errors
    /// [`SafetyError::EnvironmentMismatch`] otherwise.
    pub fn check_target(&self, op: &Operation) -> Result<(), SafetyError> {
        let active = self.environment();
        if op.target_environment() == active {
            return Ok(());
        }
        Err(SafetyError::EnvironmentMismatch {
            requested: op.target_environment().to_string(),
            active: active.to_string(),
        })
    }

    /// Evaluate an operation.
    ///
    /// # Errors
    /// The naming check, and an operation built for another environment than
    /// the active one.  Blocked operations are a verdict, not an error.
    pub fn evaluate(&self, op: &Operation) -> Result<GateVerdict, SafetyError> {
        self.evaluate_inner(op, Risk::None, "", &[])
    }

    /// Like [`SafetyGate::evaluate`]; `planned` command lines are shown to the
    /// operator when confirmation is required.
    pub fn evaluate_planned(&self, op: &Operation, planned: &[String]) -> Result<GateVerdict, SafetyError> {
        self.evaluate_inner(op, Risk::None, "", planned)
    }

    /// Like [`SafetyGate::evaluate`], with the classification raised to at least `floor`.
    pub fn evaluate_with_floor(
        &self,
        op: &Operation,
        floor: Risk,
        why: &str,
    ) -> Result<GateVerdict, SafetyError> {
        self.evaluate_inner(op, floor, why, &[])
    }

    fn evaluate_inner(
        &self,
        op: &Operation,
        floor: Risk,
        why: &str,
        planned: &[String],
    ) -> Result<GateVerdict, SafetyError> {
        self.check()?;
        self.check_target(op)?;
        let environment = self.environment();
        let classification = classify(op, environment).escalate(floor, why);
        let decision = decide(&classification, self.level, environment);
        Ok(self.finish(op, classification, decision, planned))
    }

    fn finish(
        &self,
        op: &Operation,
        classification: RiskClassification,
        decision: PolicyDecision,
        planned: &[String],
    ) -> GateVerdict {
        let environment = self.environment();
        let decision = if decision.allowed && decision.requires_confirmation {
            let request = ConfirmationRequest {
                operation: op,
                classification: &classification,
                environment,
                planned,
            };
            let state = run_protocol(&request, self.level, self.confirmer.as_ref());
            decision.resolve(state)
        } else {
            decision
        };

        if decision.allowed {
            info!(
                operation = op.raw(),
                risk = %classification.risk,
                level = %self.level,
                %environment,
                "operation allowed"
            );
            GateVerdict::Proceed { classification, decision }
        } else {
            let reason = decision
                .block_reason
                .unwrap_or_else(|| "blocked by safety policy".to_owned());
            warn!(
                operation = op.raw(),
                risk = %classification.risk,
                level = %self.level,
                %environment,
                %reason,
                "operation blocked"
            );
            GateVerdict::Blocked { classification, reason }
        }
    }
}

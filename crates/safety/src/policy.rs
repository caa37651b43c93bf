//! Safety policy engine.
//!
//! `decide` is a pure function of `(classification, level, environment)`.
//! Rules, in order:
//! 1. `disabled` allows everything without confirmation.
//! 2. `paranoid` in production blocks everything.
//! 3. `none` classifications pass.
//! 4. Risky operations need confirmation under `strict` and `paranoid`.
//!
//! Rule 1 is evaluated against the *effective* level; see [`effective_level`]
//! for why a per-call `disabled` can never reach rule 1 when paranoid mode
//! is configured for production.

use serde::Serialize;

use crate::{ConfirmationState, Environment, RiskClassification, SafetyLevel};

/// Outcome of policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub block_reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            requires_confirmation: false,
            block_reason: None,
        }
    }

    /// Allowed once the confirmation protocol succeeds.
    pub fn pending_confirmation() -> Self {
        Self {
            allowed: true,
            requires_confirmation: true,
            block_reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_confirmation: false,
            block_reason: Some(reason.into()),
        }
    }

    /// Fold the result of the confirmation protocol into the decision.
    pub fn resolve(self, state: ConfirmationState) -> Self {
        if !self.requires_confirmation || !self.allowed {
            return self;
        }
        match state {
            ConfirmationState::Confirmed => self,
            ConfirmationState::Cancelled | ConfirmationState::AwaitingConfirmation => Self {
                allowed: false,
                requires_confirmation: true,
                block_reason: Some("confirmation was not given".into()),
            },
        }
    }
}

pub const PARANOID_PRODUCTION_REASON: &str = "paranoid mode blocks all production operations";

/// Decide whether an operation may proceed.
pub fn decide(
    classification: &RiskClassification,
    level: SafetyLevel,
    environment: Environment,
) -> PolicyDecision {
    if level == SafetyLevel::Disabled {
        return PolicyDecision::allow();
    }
    if level == SafetyLevel::Paranoid && environment.is_production() {
        return PolicyDecision::block(PARANOID_PRODUCTION_REASON);
    }
    if !classification.risk.is_risky() {
        return PolicyDecision::allow();
    }
    match level {
        SafetyLevel::Strict | SafetyLevel::Paranoid => PolicyDecision::pending_confirmation(),
        SafetyLevel::Relaxed | SafetyLevel::Disabled => PolicyDecision::allow(),
    }
}

/// Combine the configured level with an optional per-call override.
///
/// Paranoid mode configured for production is a hard circuit breaker: the
/// override is ignored.  Anywhere else the override replaces the configured
/// level for the invocation.
pub fn effective_level(
    configured: SafetyLevel,
    requested: Option<SafetyLevel>,
    environment: Environment,
) -> SafetyLevel {
    match requested {
        Some(requested) if requested != configured => {
            if configured == SafetyLevel::Paranoid && environment.is_production() {
                tracing::warn!(
                    requested = %requested,
                    "paranoid mode is configured for production; ignoring safety level override"
                );
                configured
            } else {
                requested
            }
        }
        _ => configured,
    }
}

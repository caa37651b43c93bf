//! Operation risk classification.
//!
//! Rules are data: an ordered table of `{pattern, risk}` entries matched as
//! case-insensitive substrings against the raw operation text.  The first
//! matching rule wins.  False positives are acceptable, false negatives are not.

use serde::{Deserialize, Serialize};

use crate::{Environment, Operation};

/// Risk tier assigned to an operation.
///
/// Declared in ascending severity so `Ord` can be used to escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    None,
    ProductionUnsafe,
    Destructive,
    Reset,
}

impl Risk {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ProductionUnsafe => "production_unsafe",
            Self::Destructive => "destructive",
            Self::Reset => "reset",
        }
    }

    pub fn is_risky(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    pub pattern: &'static str,
    pub risk: Risk,
    /// Only evaluated when the environment is production.
    pub production_only: bool,
}

const fn rule(pattern: &'static str, risk: Risk, production_only: bool) -> ClassificationRule {
    ClassificationRule { pattern, risk, production_only }
}

/// Precedence: reset family, destructive family, production-unsafe family.
pub const RULES: &[ClassificationRule] = &[
    // Reset family.
    rule("reset", Risk::Reset, false),
    rule("drop", Risk::Reset, false),
    rule("delete", Risk::Reset, false),
    rule("truncate", Risk::Reset, false),
    // Destructive family.
    rule("migrate reset", Risk::Destructive, false),
    rule("force reset", Risk::Destructive, false),
    rule("force-reset", Risk::Destructive, false),
    rule("accept data loss", Risk::Destructive, false),
    rule("accept-data-loss", Risk::Destructive, false),
    rule("restore", Risk::Destructive, false),
    // Production-unsafe family.
    rule("migrate dev", Risk::ProductionUnsafe, true),
    rule("push", Risk::ProductionUnsafe, true),
    rule("seed", Risk::ProductionUnsafe, true),
    rule("studio", Risk::ProductionUnsafe, true),
];

/// Result of [`classify`].  Always carries the reason for auditability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskClassification {
    pub risk: Risk,
    pub reason: String,
    /// The table pattern that matched, if any.
    pub matched: Option<&'static str>,
}

impl RiskClassification {
    pub fn none() -> Self {
        Self {
            risk: Risk::None,
            reason: "no risky pattern matched".into(),
            matched: None,
        }
    }

    /// Raise the risk to at least `floor`, keeping a matched reason when one exists.
    pub fn escalate(self, floor: Risk, why: &str) -> Self {
        if self.risk >= floor {
            return self;
        }
        Self {
            risk: floor,
            reason: format!("{why} (classified {floor})"),
            matched: self.matched,
        }
    }
}

/// Classify an operation against [`RULES`].
///
/// Pure: the same inputs always yield an identical classification.
pub fn classify(op: &Operation, environment: Environment) -> RiskClassification {
    classify_raw(op.raw(), environment)
}

/// [`classify`] on bare text.
pub fn classify_raw(raw: &str, environment: Environment) -> RiskClassification {
    let normalized = raw.to_lowercase();

    RULES
        .iter()
        .filter(|r| !r.production_only || environment.is_production())
        .find(|r| normalized.contains(r.pattern))
        .map(|r| RiskClassification {
            risk: r.risk,
            reason: format!("matched '{}' ({} family)", r.pattern, r.risk),
            matched: Some(r.pattern),
        })
        .unwrap_or_else(RiskClassification::none)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::IntendedAction;

    const ALL_ENVS: [Environment; 3] = [Environment::Development, Environment::Test, Environment::Production];

    #[test]
    fn reset_keywords_classify_as_reset_everywhere() {
        for raw in ["migrate reset", "DROP TABLE users", "Delete from profiles", "truncate users", "force reset"] {
            for env in ALL_ENVS {
                assert_eq!(classify_raw(raw, env).risk, Risk::Reset, "{raw} in {env}");
            }
        }
    }

    #[test]
    fn destructive_phrases_without_reset_keywords() {
        let c = classify_raw("db push --accept-data-loss", Environment::Development);
        assert_eq!(c.risk, Risk::Destructive);
        assert_eq!(c.matched, Some("accept-data-loss"));
        assert_eq!(classify_raw("Accept Data Loss", Environment::Test).risk, Risk::Destructive);
    }

    #[test]
    fn production_unsafe_only_applies_in_production() {
        for raw in ["migrate dev", "db push", "db seed", "studio"] {
            assert_eq!(classify_raw(raw, Environment::Development).risk, Risk::None, "{raw}");
            assert_eq!(classify_raw(raw, Environment::Test).risk, Risk::None, "{raw}");
            assert_eq!(
                classify_raw(raw, Environment::Production).risk,
                Risk::ProductionUnsafe,
                "{raw}"
            );
        }
    }

    #[test]
    fn reset_family_takes_precedence_over_production_unsafe() {
        let c = classify_raw("migrate dev && migrate reset", Environment::Production);
        assert_eq!(c.risk, Risk::Reset);
        assert_eq!(c.matched, Some("reset"));
    }

    #[test]
    fn safe_operations_are_none() {
        for env in ALL_ENVS {
            let c = classify_raw("migrate deploy", env);
            assert_eq!(c, RiskClassification::none());
        }
    }

    #[test]
    fn reason_names_the_matched_pattern() {
        let c = classify_raw("truncate audit_log", Environment::Test);
        assert!(c.reason.contains("'truncate'"));
        assert!(c.reason.contains("reset family"));
    }

    #[test]
    fn classification_is_pure() {
        let op = Operation::new("migrate dev --force", IntendedAction::Migrate, Environment::Production);
        let first = classify(&op, Environment::Production);
        let second = classify(&op, Environment::Production);
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    #[test]
    fn escalate_only_raises() {
        let none = RiskClassification::none().escalate(Risk::Destructive, "restore replaces rows");
        assert_eq!(none.risk, Risk::Destructive);
        assert!(none.reason.starts_with("restore replaces rows"));

        let reset = classify_raw("reset", Environment::Test);
        assert_eq!(reset.clone().escalate(Risk::Destructive, "x"), reset);
    }

    #[test]
    fn rule_table_is_ordered_by_family() {
        let ranks: Vec<u8> = RULES
            .iter()
            .map(|r| match r.risk {
                Risk::Reset => 0,
                Risk::Destructive => 1,
                Risk::ProductionUnsafe => 2,
                Risk::None => 3,
            })
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        assert!(RULES.iter().filter(|r| r.production_only).all(|r| r.risk == Risk::ProductionUnsafe));
    }
}

//! Ruleset payloads - pure construction of the merge queue policy
//!
//! No I/O happens here. `upsert_ruleset` in the parent module decides
//! whether to send the definition as a create or an update.

use crate::config::HarnessConfig;
use crate::types::{CHECK_NAME, MergeQueueParameters};
use serde::Serialize;

/// Integrations the ruleset references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesetIdentities {
    /// Integration that must report the required check (GitHub Actions)
    pub actions_integration_id: u64,
    /// Integration that may always bypass the ruleset (the automation app)
    pub bypass_integration_id: u64,
}

impl From<&HarnessConfig> for RulesetIdentities {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            actions_integration_id: config.actions_integration_id,
            bypass_integration_id: config.bypass_integration_id,
        }
    }
}

/// Full ruleset body for the create and update endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulesetDefinition {
    /// Ruleset name; unique per scenario
    pub name: String,
    /// Always `branch`
    pub target: String,
    /// Always `active`
    pub enforcement: String,
    /// Branches the ruleset applies to
    pub conditions: RulesetConditions,
    /// Merge queue rule followed by the required-check rule
    pub rules: Vec<Rule>,
    /// Actors allowed to skip the rules
    pub bypass_actors: Vec<BypassActor>,
}

/// Ref-name condition wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulesetConditions {
    /// Ref-name include/exclude lists
    pub ref_name: RefNameCondition,
}

/// Fully-qualified refs included and excluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefNameCondition {
    /// Included refs
    pub include: Vec<String>,
    /// Excluded refs
    pub exclude: Vec<String>,
}

/// A single rule, serialized as `{"type": ..., "parameters": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum Rule {
    /// Route merges through the merge queue
    MergeQueue(MergeQueueParameters),
    /// Require status checks to pass
    RequiredStatusChecks(RequiredStatusChecks),
}

/// Parameters of the required-status-checks rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_field_names)]
pub struct RequiredStatusChecks {
    /// Whether branches must be up to date before merging
    pub strict_required_status_checks_policy: bool,
    /// Allow branch creation without passing checks
    pub do_not_enforce_on_create: bool,
    /// The checks themselves
    pub required_status_checks: Vec<StatusCheck>,
}

/// A required check bound to the integration that reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCheck {
    /// Check name
    pub context: String,
    /// Integration that must report it
    pub integration_id: u64,
}

/// An actor allowed to bypass the ruleset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BypassActor {
    /// Integration id
    pub actor_id: u64,
    /// Always `Integration`
    pub actor_type: String,
    /// Always `always`
    pub bypass_mode: String,
}

/// Ruleset name for a scenario
pub fn ruleset_name(branch_prefix: &str) -> String {
    format!("Merge queue ({branch_prefix}/main)")
}

/// Build the ruleset guarding `<branch_prefix>/main`
pub fn ruleset_definition(
    identities: RulesetIdentities,
    branch_prefix: &str,
    parameters: &MergeQueueParameters,
) -> RulesetDefinition {
    RulesetDefinition {
        name: ruleset_name(branch_prefix),
        target: "branch".to_string(),
        enforcement: "active".to_string(),
        conditions: RulesetConditions {
            ref_name: RefNameCondition {
                include: vec![format!("refs/heads/{branch_prefix}/main")],
                exclude: vec![],
            },
        },
        rules: vec![
            Rule::MergeQueue(parameters.clone()),
            Rule::RequiredStatusChecks(RequiredStatusChecks {
                strict_required_status_checks_policy: false,
                do_not_enforce_on_create: true,
                required_status_checks: vec![StatusCheck {
                    context: CHECK_NAME.to_string(),
                    integration_id: identities.actions_integration_id,
                }],
            }),
        ],
        bypass_actors: vec![BypassActor {
            actor_id: identities.bypass_integration_id,
            actor_type: "Integration".to_string(),
            bypass_mode: "always".to_string(),
        }],
    }
}

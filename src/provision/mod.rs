//! Resource provisioning - rulesets, workflow files and scenario main branches
//!
//! Provisioning is idempotent per scenario: rulesets are upserted by name and
//! the workflow file is created or updated depending on whether it exists.

mod ruleset;
mod workflow;

pub use ruleset::{
    BypassActor, RefNameCondition, RequiredStatusChecks, Rule, RulesetConditions,
    RulesetDefinition, RulesetIdentities, StatusCheck, ruleset_definition, ruleset_name,
};
pub use workflow::{DEFAULT_WAIT_SECS, render_workflow};

use crate::error::Result;
use crate::platform::{FileWrite, MergeQueuePlatform};
use crate::types::{FileCommit, MergeQueueParameters, UpsertAction, WORKFLOW_PATH};
use tracing::{debug, info};

/// Scenario main branch name
pub fn main_branch(branch_prefix: &str) -> String {
    format!("{branch_prefix}/main")
}

/// Scenario feature branch name
pub fn feature_branch(branch_prefix: &str, feature: &str) -> String {
    format!("{branch_prefix}/feature-{feature}")
}

/// Outcome of `upsert_ruleset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesetUpsert {
    /// Ruleset id
    pub id: u64,
    /// Whether the ruleset was created or updated
    pub action: UpsertAction,
}

/// Create or update the merge queue ruleset guarding `<branch_prefix>/main`
///
/// Existing rulesets are matched by name among those defined on the
/// repository itself (inherited rulesets are ignored).
pub async fn upsert_ruleset(
    platform: &dyn MergeQueuePlatform,
    identities: RulesetIdentities,
    branch_prefix: &str,
    parameters: &MergeQueueParameters,
) -> Result<RulesetUpsert> {
    let definition = ruleset_definition(identities, branch_prefix, parameters);
    let existing = platform.list_rulesets().await?;

    let upsert = match existing.iter().find(|r| r.name == definition.name) {
        Some(found) => {
            platform.update_ruleset(found.id, &definition).await?;
            RulesetUpsert {
                id: found.id,
                action: UpsertAction::Updated,
            }
        }
        None => RulesetUpsert {
            id: platform.create_ruleset(&definition).await?,
            action: UpsertAction::Created,
        },
    };

    info!(
        name = %definition.name,
        id = upsert.id,
        action = ?upsert.action,
        "upserted ruleset"
    );
    Ok(upsert)
}

/// Write the CI workflow onto `<branch_prefix>/<branch>`
///
/// A missing file is created; an existing one is updated using its current
/// blob SHA. Any fetch failure other than not-found propagates.
pub async fn upsert_workflow(
    platform: &dyn MergeQueuePlatform,
    branch_prefix: &str,
    branch: &str,
    wait_seconds: u64,
) -> Result<FileCommit> {
    let target = format!("{branch_prefix}/{branch}");

    let sha = match platform.file_sha(&target, WORKFLOW_PATH).await {
        Ok(sha) => Some(sha),
        Err(e) if e.is_not_found() => {
            debug!(branch = %target, "no workflow yet, creating");
            None
        }
        Err(e) => return Err(e),
    };

    let commit = platform
        .put_file(&FileWrite {
            branch: target.clone(),
            path: WORKFLOW_PATH.to_string(),
            message: format!("Add workflow to {branch} branch"),
            content: render_workflow(branch_prefix, wait_seconds),
            sha,
        })
        .await?;

    info!(branch = %target, wait_seconds, commit = %commit.commit_sha, "provisioned workflow");
    Ok(commit)
}

/// Create `<branch_prefix>/main` from the default branch and add the workflow
///
/// Returns the SHA of the workflow commit, which is the scenario's baseline.
pub async fn create_main_branch(
    platform: &dyn MergeQueuePlatform,
    branch_prefix: &str,
    wait_seconds: u64,
) -> Result<String> {
    let base = platform.default_branch_head().await?;
    let main = main_branch(branch_prefix);
    platform.create_branch(&main, &base).await?;
    debug!(branch = %main, %base, "created scenario main");

    let commit = upsert_workflow(platform, branch_prefix, "main", wait_seconds).await?;
    Ok(commit.commit_sha)
}

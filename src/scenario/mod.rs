//! Scenario runner - cleanup, provision, observe and assert
//!
//! Every scenario owns a branch prefix and runs through the same phases.
//! Phases run under wall-clock budgets; a phase that overruns fails the
//! scenario with `Error::PhaseTimeout`.

mod matrix;
mod mid_queue;
mod mutated_main;
mod non_ordered;
mod plan;

pub use matrix::{
    ProvisionedScenario, PullRequestOutcome, ScenarioOutcome, outcome as scenario_outcome,
    provision as provision_scenario, run_scenario,
};
pub use mid_queue::{MidQueueOutcome, PullRequestState, run_mid_queue_conflicts};
pub use mutated_main::{MutatedMainOutcome, run_mutated_main};
pub use non_ordered::{MergeOrder, NonOrderedOutcome, run_non_ordered_queueing};
pub use plan::{FeaturePlan, ScenarioPlan, merged_after_seconds, stale_branches};

use crate::error::{Error, Result};
use crate::platform::MergeQueuePlatform;
use crate::provision::RulesetIdentities;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Budget for the cleanup phase
pub const CLEANUP_BUDGET: Duration = Duration::from_secs(30);

/// Budget for provisioning a matrix scenario
pub const MATRIX_SETUP_BUDGET: Duration = Duration::from_secs(80);

/// Budget for the mutated-main probe's setup
pub const MUTATED_MAIN_SETUP_BUDGET: Duration = Duration::from_secs(120);

/// Budget for the two-PR probes, which observe during setup
pub const PROBE_SETUP_BUDGET: Duration = Duration::from_secs(180);

/// Pause that lets the platform catch up after deletions and PR creation
pub const SETTLE: Duration = Duration::from_secs(5);

/// Shared state for a run of scenarios
///
/// The branch listing is fetched once and shared read-only by every
/// scenario of the run. Scenarios that reuse a prefix within one run need
/// a fresh context so cleanup sees their branches.
#[derive(Clone)]
pub struct ScenarioContext {
    /// Platform all scenarios act on
    pub platform: Arc<dyn MergeQueuePlatform>,
    /// Integrations referenced by provisioned rulesets
    pub identities: RulesetIdentities,
    /// Branch names present when the run started
    pub branches: Arc<Vec<String>>,
}

impl ScenarioContext {
    /// Build a context, fetching the branch listing
    pub async fn new(
        platform: Arc<dyn MergeQueuePlatform>,
        identities: RulesetIdentities,
    ) -> Result<Self> {
        let branches = platform.list_branches().await?;
        debug!(count = branches.len(), "fetched branch listing");
        Ok(Self::with_branches(platform, identities, branches))
    }

    /// Build a context from an already-fetched branch listing
    pub fn with_branches(
        platform: Arc<dyn MergeQueuePlatform>,
        identities: RulesetIdentities,
        branches: Vec<String>,
    ) -> Self {
        Self {
            platform,
            identities,
            branches: Arc::new(branches),
        }
    }

    /// The platform as a trait object reference
    pub fn platform(&self) -> &dyn MergeQueuePlatform {
        self.platform.as_ref()
    }
}

impl std::fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("identities", &self.identities)
            .field("branches", &self.branches.len())
            .finish_non_exhaustive()
    }
}

/// Run `phase` under `budget`
pub async fn within<T, F>(phase: &'static str, budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(phase, ?budget, "phase started");
    let result = tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| Error::PhaseTimeout { phase, budget })?;
    debug!(phase, ok = result.is_ok(), "phase finished");
    result
}

/// Delete the scenario branches named by `kinds` that existed when the run
/// started, then settle
///
/// Deleting a branch closes its PRs. A branch that has disappeared since
/// the listing was taken is skipped. Returns the branches deleted.
pub async fn cleanup(
    ctx: &ScenarioContext,
    branch_prefix: &str,
    kinds: &[&str],
) -> Result<Vec<String>> {
    let mut deleted = Vec::new();

    for branch in stale_branches(&ctx.branches, branch_prefix, kinds) {
        match ctx.platform().delete_branch(&branch).await {
            Ok(()) => {
                debug!(%branch, "deleted stale branch");
                deleted.push(branch);
            }
            Err(e) if e.is_not_found() => debug!(%branch, "branch already gone"),
            Err(e) => return Err(e),
        }
    }

    tokio::time::sleep(SETTLE).await;
    info!(branch_prefix, deleted = deleted.len(), "cleanup complete");
    Ok(deleted)
}

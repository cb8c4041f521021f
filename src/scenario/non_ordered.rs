//! Non-ordered queueing probe
//!
//! PR 1 is enqueued with a slow workflow, then PR 2 with a fast one. The
//! probe records which merged first without assuming either order.

use super::{CLEANUP_BUDGET, PROBE_SETUP_BUDGET, SETTLE, ScenarioContext, cleanup, within};
use crate::driver::{create_feature_branch, create_pull_request, enqueue_or_fail};
use crate::error::Result;
use crate::poll::{MergeTimes, RetryPolicy, record_merge_times};
use crate::provision::{create_main_branch, upsert_ruleset, upsert_workflow};
use crate::types::MergeQueueParameters;
use serde::Serialize;
use tracing::info;

/// Branch namespace of the probe
pub const BRANCH_PREFIX: &str = "non-ordered-queueing";

/// CI duration on main, inherited by feature 1
const SLOW_WAIT_SECS: u64 = 30;

/// CI duration written onto feature 2
const FAST_WAIT_SECS: u64 = 5;

/// Order in which the two PRs were seen merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergeOrder {
    /// PR 1 (enqueued first) merged first
    Fifo,
    /// PR 2 (faster checks) merged first
    Readiness,
    /// Both seen on the same poll, or at least one never merged
    Undetermined,
}

impl MergeOrder {
    /// Classify the observations for `first` and `second`
    #[must_use]
    pub fn from_times(times: &MergeTimes, first: u64, second: u64) -> Self {
        match (times.get(&first), times.get(&second)) {
            (Some(a), Some(b)) if a.attempt < b.attempt => Self::Fifo,
            (Some(a), Some(b)) if b.attempt < a.attempt => Self::Readiness,
            _ => Self::Undetermined,
        }
    }
}

/// What the platform did with the two PRs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonOrderedOutcome {
    /// Whether PR 1 merged
    pub pr1_merged: bool,
    /// Whether PR 2 merged
    pub pr2_merged: bool,
    /// Observed merge order
    pub order: MergeOrder,
}

async fn observe(ctx: &ScenarioContext) -> Result<NonOrderedOutcome> {
    let platform = ctx.platform();

    upsert_ruleset(
        platform,
        ctx.identities,
        BRANCH_PREFIX,
        &MergeQueueParameters::default(),
    )
    .await?;
    create_main_branch(platform, BRANCH_PREFIX, SLOW_WAIT_SECS).await?;

    create_feature_branch(platform, BRANCH_PREFIX, "1", None).await?;
    let pull1 = create_pull_request(platform, BRANCH_PREFIX, "1").await?;
    enqueue_or_fail(platform, &pull1).await?;
    tokio::time::sleep(SETTLE).await;

    // The branch must exist before its workflow can be rewritten
    create_feature_branch(platform, BRANCH_PREFIX, "2", None).await?;
    upsert_workflow(platform, BRANCH_PREFIX, "feature-2", FAST_WAIT_SECS).await?;
    let pull2 = create_pull_request(platform, BRANCH_PREFIX, "2").await?;
    enqueue_or_fail(platform, &pull2).await?;

    let numbers = [pull1.number, pull2.number];
    let times = record_merge_times(platform, &numbers, RetryPolicy::ALL_MERGED).await?;

    Ok(NonOrderedOutcome {
        pr1_merged: times.contains_key(&pull1.number),
        pr2_merged: times.contains_key(&pull2.number),
        order: MergeOrder::from_times(&times, pull1.number, pull2.number),
    })
}

/// Run the probe
pub async fn run_non_ordered_queueing(ctx: &ScenarioContext) -> Result<NonOrderedOutcome> {
    info!("running non-ordered queueing probe");

    within(
        "cleanup",
        CLEANUP_BUDGET,
        cleanup(ctx, BRANCH_PREFIX, &["main", "feature-1", "feature-2"]),
    )
    .await?;

    let outcome = within("setup", PROBE_SETUP_BUDGET, observe(ctx)).await?;
    info!(?outcome, "non-ordered queueing probe finished");
    Ok(outcome)
}

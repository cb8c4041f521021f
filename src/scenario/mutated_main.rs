//! Mutated-main probe
//!
//! Enqueues one PR, waits for its merge group to start building, then
//! commits straight to the scenario main. The platform has to rebuild the
//! group on the new base, or give up on it when the new commit conflicts.

use super::{CLEANUP_BUDGET, MUTATED_MAIN_SETUP_BUDGET, ScenarioContext, cleanup, within};
use crate::driver::{commit_file, create_feature_branch, create_pull_request, enqueue_or_fail};
use crate::error::Result;
use crate::platform::MergeQueuePlatform;
use crate::poll::{RetryPolicy, wait_for_merge_queue_checks};
use crate::provision::{DEFAULT_WAIT_SECS, create_main_branch, main_branch, upsert_ruleset};
use crate::types::{MergeQueueParameters, PullRequest, WorkflowRun};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Branch namespace of the probe
pub const BRANCH_PREFIX: &str = "mutated-main";

/// Pause after the checks start, so the job checks out the unmutated main
const CHECKOUT_GRACE: Duration = Duration::from_secs(3);

/// Waiting for the PR and its merge-group runs to settle: 11 x 5s
const SETTLE_POLICY: RetryPolicy = RetryPolicy::every_five_seconds(11);

const RELEASE_MESSAGE: &str = "Release 0 - Mutating main while PR is in queue";

/// What the platform did with the queued PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutatedMainOutcome {
    /// Whether the release commit touched the PR's file
    pub conflicting: bool,
    /// Whether the PR merged
    pub merged: bool,
    /// PR mergeable state after the queue settled (`dirty` on conflict)
    pub mergeable_state: Option<String>,
    /// Merge-group workflow runs built for the PR
    pub merge_group_runs: usize,
}

/// Merge-group runs whose branch belongs to PR `pr_number` on `queue_branch`
fn runs_for_pull<'a>(
    runs: &'a [WorkflowRun],
    queue_branch: &str,
    pr_number: u64,
) -> Vec<&'a WorkflowRun> {
    runs.iter()
        .filter(|run| {
            run.merge_group()
                .is_some_and(|group| group.base == queue_branch && group.pr_number == pr_number)
        })
        .collect()
}

async fn enqueue_and_mutate(ctx: &ScenarioContext, conflicting: bool) -> Result<PullRequest> {
    let platform = ctx.platform();

    upsert_ruleset(
        platform,
        ctx.identities,
        BRANCH_PREFIX,
        &MergeQueueParameters::default(),
    )
    .await?;
    create_main_branch(platform, BRANCH_PREFIX, DEFAULT_WAIT_SECS).await?;
    create_feature_branch(platform, BRANCH_PREFIX, "1", None).await?;

    let pull = create_pull_request(platform, BRANCH_PREFIX, "1").await?;
    enqueue_or_fail(platform, &pull).await?;

    if wait_for_merge_queue_checks(platform, BRANCH_PREFIX, pull.number)
        .await?
        .is_none()
    {
        warn!(pr_number = pull.number, "merge queue checks never started, mutating anyway");
    }
    tokio::time::sleep(CHECKOUT_GRACE).await;

    // Writing the PR's own file onto main makes the queued group conflict
    let path = if conflicting { "feature-1.txt" } else { "release-0.txt" };
    let release = commit_file(
        platform,
        &main_branch(BRANCH_PREFIX),
        path,
        RELEASE_MESSAGE,
        "Release 0",
        None,
    )
    .await?;
    info!(commit = %release.commit_sha, path, "mutated main while PR is queued");

    Ok(pull)
}

async fn settled_pull(platform: &dyn MergeQueuePlatform, number: u64) -> Result<PullRequest> {
    let settled = SETTLE_POLICY
        .poll("queued PR settled", |_| async move {
            let pr = platform.pull_request(number).await?;
            let settled = pr.merged || pr.mergeable_state.as_deref() == Some("dirty");
            Ok(settled.then_some(pr))
        })
        .await?;

    match settled {
        Some(pr) => Ok(pr),
        None => platform.pull_request(number).await,
    }
}

async fn merge_group_run_count(platform: &dyn MergeQueuePlatform, pr_number: u64) -> Result<usize> {
    let queue_branch = main_branch(BRANCH_PREFIX);
    let queue_branch = queue_branch.as_str();

    let completed = SETTLE_POLICY
        .poll("merge group runs completed", |_| async move {
            let all = platform.workflow_runs("merge_group").await?;
            let runs = runs_for_pull(&all, queue_branch, pr_number);
            let done = !runs.is_empty()
                && runs.iter().all(|run| run.status.as_deref() == Some("completed"));
            Ok(done.then_some(runs.len()))
        })
        .await?;

    match completed {
        Some(count) => Ok(count),
        None => {
            let runs = platform.workflow_runs("merge_group").await?;
            Ok(runs_for_pull(&runs, queue_branch, pr_number).len())
        }
    }
}

/// Run the probe, with the release commit conflicting with the PR or not
pub async fn run_mutated_main(
    ctx: &ScenarioContext,
    conflicting: bool,
) -> Result<MutatedMainOutcome> {
    info!(conflicting, "running mutated-main probe");

    within(
        "cleanup",
        CLEANUP_BUDGET,
        cleanup(ctx, BRANCH_PREFIX, &["main", "feature-1"]),
    )
    .await?;

    let pull = within(
        "setup",
        MUTATED_MAIN_SETUP_BUDGET,
        enqueue_and_mutate(ctx, conflicting),
    )
    .await?;

    let platform = ctx.platform();
    let pr = settled_pull(platform, pull.number).await?;
    let merge_group_runs = merge_group_run_count(platform, pull.number).await?;

    let outcome = MutatedMainOutcome {
        conflicting,
        merged: pr.merged,
        mergeable_state: pr.mergeable_state,
        merge_group_runs,
    };
    info!(?outcome, "mutated-main probe finished");
    Ok(outcome)
}

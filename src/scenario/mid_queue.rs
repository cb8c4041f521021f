//! Mid-queue conflict probe
//!
//! PR 1 and PR 2 write different content to the same file. PR 2 is
//! enqueued while PR 1 is building. The probe records when, if ever, the
//! platform notices the conflict, and whether resolving it lets PR 2 merge.

use super::{CLEANUP_BUDGET, PROBE_SETUP_BUDGET, SETTLE, ScenarioContext, cleanup, within};
use crate::driver::{
    commit_file, create_feature_branch, create_pull_request, enqueue_or_fail, merge_when_ready,
};
use crate::error::Result;
use crate::platform::MergeQueuePlatform;
use crate::poll::{RetryPolicy, queue_entries, wait_for_merged};
use crate::provision::{create_main_branch, feature_branch, main_branch, upsert_ruleset};
use crate::types::{MergeQueueParameters, PullRequest};
use serde::Serialize;
use tracing::{info, warn};

/// Branch namespace of the probe
pub const BRANCH_PREFIX: &str = "mid-queue-conflicts";

/// CI duration, long enough for PR 2 to join while PR 1 builds
const WORKFLOW_WAIT_SECS: u64 = 15;

const CONFLICT_PATH: &str = "conflict-file.txt";

/// Final state of a PR as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestState {
    /// Whether it merged
    pub merged: bool,
    /// Whether it can be merged (`None` while GitHub is computing)
    pub mergeable: Option<bool>,
    /// GitHub's mergeable state
    pub mergeable_state: Option<String>,
}

impl From<&PullRequest> for PullRequestState {
    fn from(pr: &PullRequest) -> Self {
        Self {
            merged: pr.merged,
            mergeable: pr.mergeable,
            mergeable_state: pr.mergeable_state.clone(),
        }
    }
}

/// How the platform handled the conflicting PR
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MidQueueOutcome {
    /// Whether PR 1 merged
    pub pr1_merged: bool,
    /// PR 2 was refused on enqueue, or gone from the queue shortly after
    pub kicked_back_immediately: bool,
    /// PR 2 left the queue unmerged once PR 1 merged
    pub kicked_back_after_pr1_merged: bool,
    /// PR 2 merged after main was merged into it and the file resolved
    pub merged_with_conflict_resolution: bool,
    /// PR 2 at the end of the probe
    pub pr2: Option<PullRequestState>,
}

async fn in_queue(platform: &dyn MergeQueuePlatform, pr_number: u64) -> Result<bool> {
    let entries = queue_entries(platform, &main_branch(BRANCH_PREFIX)).await?;
    Ok(entries.iter().any(|e| e.pr_number == pr_number))
}

/// Open feature `feature` with its own version of the conflict file
async fn open_conflicting_feature(
    platform: &dyn MergeQueuePlatform,
    feature: &str,
) -> Result<PullRequest> {
    create_feature_branch(platform, BRANCH_PREFIX, feature, None).await?;
    let file = commit_file(
        platform,
        &feature_branch(BRANCH_PREFIX, feature),
        CONFLICT_PATH,
        &format!("Add conflict file in feature-{feature}"),
        &format!("Content from feature-{feature}"),
        None,
    )
    .await?;
    info!(feature, commit = %file.commit_sha, "added conflict file");
    create_pull_request(platform, BRANCH_PREFIX, feature).await
}

/// Merge main into feature-2 and rewrite the conflict file
///
/// Returns false when the platform refuses the merge.
async fn resolve_conflict(platform: &dyn MergeQueuePlatform) -> Result<bool> {
    let feature2 = feature_branch(BRANCH_PREFIX, "2");

    match platform
        .merge_branches(
            &feature2,
            &main_branch(BRANCH_PREFIX),
            "Merge main into feature-2 to resolve conflicts",
        )
        .await
    {
        Ok(merge) => info!(?merge, "merged main into feature-2"),
        Err(e) if e.is_conflict() => {
            warn!(error = %e, "could not merge main into feature-2");
            return Ok(false);
        }
        Err(e) => return Err(e),
    }

    let sha = platform.file_sha(&feature2, CONFLICT_PATH).await?;
    commit_file(
        platform,
        &feature2,
        CONFLICT_PATH,
        "Resolve conflicts in feature-2",
        "Resolved content from both feature-1 and feature-2",
        Some(sha),
    )
    .await?;
    info!("resolved conflict file on feature-2");
    Ok(true)
}

async fn observe(ctx: &ScenarioContext) -> Result<MidQueueOutcome> {
    let platform = ctx.platform();
    let mut outcome = MidQueueOutcome::default();

    upsert_ruleset(
        platform,
        ctx.identities,
        BRANCH_PREFIX,
        &MergeQueueParameters::default(),
    )
    .await?;
    create_main_branch(platform, BRANCH_PREFIX, WORKFLOW_WAIT_SECS).await?;

    let pull1 = open_conflicting_feature(platform, "1").await?;
    enqueue_or_fail(platform, &pull1).await?;
    tokio::time::sleep(SETTLE).await;

    let pull2 = open_conflicting_feature(platform, "2").await?;
    if merge_when_ready(platform, &pull2).await?.is_accepted() {
        tokio::time::sleep(SETTLE).await;
        if !in_queue(platform, pull2.number).await? {
            info!(pr_number = pull2.number, "PR 2 left the queue right after enqueueing");
            outcome.kicked_back_immediately = true;
        }
    } else {
        outcome.kicked_back_immediately = true;
    }

    outcome.pr1_merged = wait_for_merged(platform, pull1.number, RetryPolicy::MERGED)
        .await?
        .is_some();
    if !outcome.pr1_merged {
        warn!(pr_number = pull1.number, "PR 1 did not merge");
    } else if !outcome.kicked_back_immediately {
        tokio::time::sleep(SETTLE).await;

        let pr2 = platform.pull_request(pull2.number).await?;
        let still_queued = in_queue(platform, pull2.number).await?;
        outcome.kicked_back_after_pr1_merged = !still_queued && !pr2.merged;

        if still_queued && resolve_conflict(platform).await? {
            outcome.merged_with_conflict_resolution =
                wait_for_merged(platform, pull2.number, RetryPolicy::MERGED)
                    .await?
                    .is_some();
        }
    }

    let pr2 = platform.pull_request(pull2.number).await?;
    outcome.pr2 = Some(PullRequestState::from(&pr2));
    Ok(outcome)
}

/// Run the probe
pub async fn run_mid_queue_conflicts(ctx: &ScenarioContext) -> Result<MidQueueOutcome> {
    info!("running mid-queue conflict probe");

    within(
        "cleanup",
        CLEANUP_BUDGET,
        cleanup(ctx, BRANCH_PREFIX, &["main", "feature-1", "feature-2"]),
    )
    .await?;

    let outcome = within("setup", PROBE_SETUP_BUDGET, observe(ctx)).await?;
    info!(?outcome, "mid-queue conflict probe finished");
    Ok(outcome)
}

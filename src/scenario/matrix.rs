//! Matrix scenario lifecycle

use super::plan::{FeaturePlan, ScenarioPlan, merged_after_seconds};
use super::{CLEANUP_BUDGET, MATRIX_SETUP_BUDGET, SETTLE, ScenarioContext, cleanup, within};
use crate::driver::{create_feature_branch, create_pull_request, enqueue_or_fail};
use crate::error::Result;
use crate::matrix::ScenarioParams;
use crate::platform::MergeQueuePlatform;
use crate::poll::{RetryPolicy, wait_for_queue_drain};
use crate::provision::{DEFAULT_WAIT_SECS, create_main_branch, main_branch, upsert_ruleset};
use crate::types::PullRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// A scenario whose PRs have been enqueued
#[derive(Debug, Clone)]
pub struct ProvisionedScenario {
    /// What was provisioned
    pub plan: ScenarioPlan,
    /// Workflow commit on the scenario main
    pub baseline_sha: String,
    /// PR 1 then PR 2
    pub pulls: [PullRequest; 2],
    /// Taken just before PR 1 was enqueued
    pub time_origin: DateTime<Utc>,
}

/// Observed end state of one PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestOutcome {
    /// Whether the queue merged it
    pub merged: bool,
    /// Seconds after the time origin, in 20s buckets; absent when unmerged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_after: Option<i64>,
}

/// Observed end state of a matrix scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    /// Whether the queue emptied within the drain policy
    pub queue_drained: bool,
    /// PR 1 then PR 2
    pub pulls: Vec<PullRequestOutcome>,
    /// Commit messages landed on the scenario main after the workflow commit
    pub main_commits: Vec<String>,
}

async fn open_feature(
    platform: &dyn MergeQueuePlatform,
    branch_prefix: &str,
    feature: &FeaturePlan,
) -> Result<PullRequest> {
    create_feature_branch(platform, branch_prefix, &feature.feature, feature.commit_suffix)
        .await?;
    create_pull_request(platform, branch_prefix, &feature.feature).await
}

/// Provision a scenario and enqueue both PRs
///
/// A refused enqueue fails the scenario.
pub async fn provision(ctx: &ScenarioContext, plan: ScenarioPlan) -> Result<ProvisionedScenario> {
    let platform = ctx.platform();
    let prefix = plan.branch_prefix.as_str();

    upsert_ruleset(platform, ctx.identities, prefix, &plan.parameters).await?;
    let baseline_sha = create_main_branch(platform, prefix, DEFAULT_WAIT_SECS).await?;

    let (pull1, pull2) = tokio::try_join!(
        open_feature(platform, prefix, &plan.features[0]),
        open_feature(platform, prefix, &plan.features[1]),
    )?;

    // PR checks are skipped outside merge groups; give them time to report
    tokio::time::sleep(SETTLE).await;

    let time_origin = Utc::now();
    enqueue_or_fail(platform, &pull1).await?;
    tokio::time::sleep(plan.enqueue_delay).await;
    enqueue_or_fail(platform, &pull2).await?;

    info!(branch_prefix = prefix, "scenario provisioned");
    Ok(ProvisionedScenario {
        plan,
        baseline_sha,
        pulls: [pull1, pull2],
        time_origin,
    })
}

/// Collect the scenario's end state
pub async fn outcome(
    ctx: &ScenarioContext,
    scenario: &ProvisionedScenario,
    queue_drained: bool,
) -> Result<ScenarioOutcome> {
    let platform = ctx.platform();

    let mut pulls = Vec::with_capacity(scenario.pulls.len());
    for pull in &scenario.pulls {
        let current = platform.pull_request(pull.number).await?;
        let merged_after = current
            .merged
            .then_some(current.merged_at)
            .flatten()
            .map(|at| merged_after_seconds(scenario.time_origin, at));
        pulls.push(PullRequestOutcome {
            merged: current.merged,
            merged_after,
        });
    }

    let main_commits = platform
        .compare_commits(&scenario.baseline_sha, &main_branch(&scenario.plan.branch_prefix))
        .await?;

    Ok(ScenarioOutcome {
        queue_drained,
        pulls,
        main_commits,
    })
}

/// Run one matrix scenario end to end
pub async fn run_scenario(ctx: &ScenarioContext, params: ScenarioParams) -> Result<ScenarioOutcome> {
    let plan = ScenarioPlan::from_params(&params);
    let prefix = plan.branch_prefix.clone();
    info!(%params, "running scenario");

    within(
        "cleanup",
        CLEANUP_BUDGET,
        cleanup(ctx, &prefix, &["main", "feature-1", "feature-2"]),
    )
    .await?;

    let scenario = within("setup", MATRIX_SETUP_BUDGET, provision(ctx, plan)).await?;

    let drained =
        wait_for_queue_drain(ctx.platform(), &main_branch(&prefix), RetryPolicy::QUEUE_DRAIN)
            .await?;

    let observed = outcome(ctx, &scenario, drained).await?;
    info!(
        branch_prefix = %prefix,
        drained,
        merged = ?observed.pulls.iter().map(|p| p.merged).collect::<Vec<_>>(),
        "scenario finished"
    );
    Ok(observed)
}

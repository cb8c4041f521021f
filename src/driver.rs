//! Test-subject driver - feature branches, pull requests and enqueueing

use crate::error::{Error, Result};
use crate::platform::{FileWrite, MergeQueuePlatform};
use crate::provision::{feature_branch, main_branch};
use crate::types::{EnqueueOutcome, FileCommit, PullRequest};
use tracing::{debug, info, warn};

/// Branch `<prefix>/feature-<feature>` off the current scenario main and
/// commit a dummy file on it
///
/// The commit subject is `Make feature <feature>`, followed by
/// `commit_suffix` when given (pass the conflict marker to make the PR fail
/// its merge-group check). Returns the commit SHA.
pub async fn create_feature_branch(
    platform: &dyn MergeQueuePlatform,
    branch_prefix: &str,
    feature: &str,
    commit_suffix: Option<&str>,
) -> Result<String> {
    let main_sha = platform.branch_head(&main_branch(branch_prefix)).await?;
    let branch = feature_branch(branch_prefix, feature);
    platform.create_branch(&branch, &main_sha).await?;

    let mut message = format!("Make feature {feature}");
    if let Some(suffix) = commit_suffix {
        message.push(' ');
        message.push_str(suffix);
    }

    let commit = commit_file(
        platform,
        &branch,
        &format!("feature-{feature}.txt"),
        &message,
        "Dummy file",
        None,
    )
    .await?;

    debug!(%branch, commit = %commit.commit_sha, "created feature branch");
    Ok(commit.commit_sha)
}

/// Commit `content` to `path` on `branch`
///
/// Pass the file's current blob `sha` to replace an existing file.
pub async fn commit_file(
    platform: &dyn MergeQueuePlatform,
    branch: &str,
    path: &str,
    message: &str,
    content: &str,
    sha: Option<String>,
) -> Result<FileCommit> {
    platform
        .put_file(&FileWrite {
            branch: branch.to_string(),
            path: path.to_string(),
            message: message.to_string(),
            content: content.to_string(),
            sha,
        })
        .await
}

/// Open `Feature <feature>` from the feature branch into scenario main
pub async fn create_pull_request(
    platform: &dyn MergeQueuePlatform,
    branch_prefix: &str,
    feature: &str,
) -> Result<PullRequest> {
    let pr = platform
        .create_pull_request(
            &feature_branch(branch_prefix, feature),
            &main_branch(branch_prefix),
            &format!("Feature {feature}"),
        )
        .await?;
    info!(pr_number = pr.number, feature, "opened pull request");
    Ok(pr)
}

/// Ask the platform to merge `pr` when ready, which enqueues it
///
/// The platform alone decides whether and when the PR merges. A refusal is
/// an observation, returned as `EnqueueOutcome::Rejected`.
pub async fn merge_when_ready(
    platform: &dyn MergeQueuePlatform,
    pr: &PullRequest,
) -> Result<EnqueueOutcome> {
    let node_id = pr
        .node_id
        .as_deref()
        .ok_or_else(|| Error::Scenario(format!("PR #{} has no node id", pr.number)))?;

    let outcome = platform.enable_auto_merge(node_id).await?;
    match &outcome {
        EnqueueOutcome::Accepted => info!(pr_number = pr.number, "enqueued"),
        EnqueueOutcome::Rejected(reason) => {
            warn!(pr_number = pr.number, %reason, "enqueue rejected");
        }
    }
    Ok(outcome)
}

/// Enqueue `pr` where a refusal means the setup itself is broken
pub async fn enqueue_or_fail(platform: &dyn MergeQueuePlatform, pr: &PullRequest) -> Result<()> {
    match merge_when_ready(platform, pr).await? {
        EnqueueOutcome::Accepted => Ok(()),
        EnqueueOutcome::Rejected(reason) => Err(Error::Scenario(format!(
            "PR #{} could not be enqueued: {reason}",
            pr.number
        ))),
    }
}

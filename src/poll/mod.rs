//! Async state poller - waits for remote, eventually-consistent state
//!
//! All waits are built on `RetryPolicy::poll`. None of them assume anything
//! about the order in which the platform processes its queue.

mod policy;

pub use policy::RetryPolicy;

use crate::error::Result;
use crate::platform::MergeQueuePlatform;
use crate::provision::main_branch;
use crate::types::{CheckRun, PullRequest, QueueEntry};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Every entry currently in the merge queue for `queue_branch`
///
/// Follows cursors until the platform reports no further page. Order is
/// whatever the platform returns.
pub async fn queue_entries(
    platform: &dyn MergeQueuePlatform,
    queue_branch: &str,
) -> Result<Vec<QueueEntry>> {
    let mut entries = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = platform.queue_page(queue_branch, cursor.as_deref()).await?;
        entries.extend(page.entries);
        match page.end_cursor {
            Some(next) if page.has_next_page => cursor = Some(next),
            _ => break,
        }
    }

    debug!(queue_branch, count = entries.len(), "fetched merge queue");
    Ok(entries)
}

/// Wait for the merge-group checks of `pr_number` to start
///
/// Each attempt locates the PR's queue entry, and once the entry has a head
/// commit, lists that commit's check runs. Returns the first non-empty list,
/// or `None` after `RetryPolicy::MERGE_QUEUE_CHECKS` runs out.
pub async fn wait_for_merge_queue_checks(
    platform: &dyn MergeQueuePlatform,
    branch_prefix: &str,
    pr_number: u64,
) -> Result<Option<Vec<CheckRun>>> {
    let queue_branch = main_branch(branch_prefix);
    let queue_branch = &queue_branch;

    RetryPolicy::MERGE_QUEUE_CHECKS
        .poll("merge queue checks", |_| async move {
            let entries = queue_entries(platform, queue_branch).await?;

            let Some(entry) = entries.iter().find(|e| e.pr_number == pr_number) else {
                debug!(pr_number, "PR not found in merge queue");
                return Ok(None);
            };

            let Some(head) = &entry.head_commit else {
                debug!(pr_number, "queue entry has no head commit yet");
                return Ok(None);
            };

            let runs = platform.check_runs(head).await?;
            Ok((!runs.is_empty()).then_some(runs))
        })
        .await
}

/// Wait for PR `number` to report merged
pub async fn wait_for_merged(
    platform: &dyn MergeQueuePlatform,
    number: u64,
    policy: RetryPolicy,
) -> Result<Option<PullRequest>> {
    policy
        .poll("pull request merged", |_| async move {
            let pr = platform.pull_request(number).await?;
            Ok(pr.merged.then_some(pr))
        })
        .await
}

/// Wait for the merge queue on `queue_branch` to empty
///
/// Returns whether the queue drained within the policy.
pub async fn wait_for_queue_drain(
    platform: &dyn MergeQueuePlatform,
    queue_branch: &str,
    policy: RetryPolicy,
) -> Result<bool> {
    let drained = policy
        .poll("merge queue drained", |_| async move {
            let entries = queue_entries(platform, queue_branch).await?;
            Ok(entries.is_empty().then_some(()))
        })
        .await?;
    Ok(drained.is_some())
}

/// When a PR was first seen merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeObservation {
    /// Poll attempt (1-based) on which the merge was observed
    pub attempt: u32,
    /// Local wall-clock time of the observation
    pub observed_at: DateTime<Utc>,
}

/// Merge observations keyed by PR number
pub type MergeTimes = BTreeMap<u64, MergeObservation>;

/// Poll `numbers` until all have merged, stamping when each was first seen
/// merged
///
/// PRs that never merge within the policy are absent from the result.
pub async fn record_merge_times(
    platform: &dyn MergeQueuePlatform,
    numbers: &[u64],
    policy: RetryPolicy,
) -> Result<MergeTimes> {
    let times = Mutex::new(MergeTimes::new());
    let times_ref = &times;

    policy
        .poll("all pull requests merged", |attempt| async move {
            for &number in numbers {
                let pr = platform.pull_request(number).await?;
                if !pr.merged {
                    continue;
                }
                let mut seen = times_ref.lock().unwrap_or_else(PoisonError::into_inner);
                seen.entry(number).or_insert_with(|| {
                    info!(pr_number = number, attempt, "observed merge");
                    MergeObservation {
                        attempt,
                        observed_at: Utc::now(),
                    }
                });
            }

            let seen = times_ref.lock().unwrap_or_else(PoisonError::into_inner);
            Ok((seen.len() == numbers.len()).then_some(()))
        })
        .await?;

    Ok(times.into_inner().unwrap_or_else(PoisonError::into_inner))
}

//! Scenario planning - pure functions
//!
//! Everything a matrix scenario will do is decided here from its
//! parameters, before any remote call is made.

use crate::matrix::ScenarioParams;
use crate::types::{CONFLICT_MARKER, MergeQueueParameters};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Width of the buckets merge times are reported in, in seconds
const MERGE_TIME_BUCKET_SECS: i64 = 20;

/// One feature branch and its PR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePlan {
    /// Feature identifier (`1` or `2`)
    pub feature: String,
    /// Suffix for the feature commit's subject
    pub commit_suffix: Option<&'static str>,
}

/// Everything a matrix scenario does, decided up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPlan {
    /// Branch namespace
    pub branch_prefix: String,
    /// Ruleset parameters for the scenario main
    pub parameters: MergeQueueParameters,
    /// Feature 1 then feature 2
    pub features: [FeaturePlan; 2],
    /// Pause between enqueueing PR 1 and PR 2
    pub enqueue_delay: Duration,
}

impl ScenarioPlan {
    /// Plan the scenario for `params`
    #[must_use]
    pub fn from_params(params: &ScenarioParams) -> Self {
        let feature = |n: u8| FeaturePlan {
            feature: n.to_string(),
            commit_suffix: params.is_conflicting(n).then_some(CONFLICT_MARKER),
        };

        Self {
            branch_prefix: params.branch_prefix(),
            parameters: params.queue_parameters(),
            features: [feature(1), feature(2)],
            enqueue_delay: Duration::from_secs(params.delay_seconds),
        }
    }
}

/// Branches from `listing` that belong to `branch_prefix` and are one of
/// `kinds` (`main`, `feature-1`, ...)
///
/// Follows the order of `kinds`.
#[must_use]
pub fn stale_branches(listing: &[String], branch_prefix: &str, kinds: &[&str]) -> Vec<String> {
    kinds
        .iter()
        .map(|kind| format!("{branch_prefix}/{kind}"))
        .filter(|name| listing.contains(name))
        .collect()
}

/// Seconds from `origin` to `merged_at`, floored to 20-second buckets
///
/// Bucketing absorbs run-to-run jitter so merge timing can be snapshotted.
#[must_use]
pub fn merged_after_seconds(origin: DateTime<Utc>, merged_at: DateTime<Utc>) -> i64 {
    let millis = (merged_at - origin).num_milliseconds();
    millis.div_euclid(MERGE_TIME_BUCKET_SECS * 1000) * MERGE_TIME_BUCKET_SECS
}

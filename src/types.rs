//! Core types for merge-queue-probe
//!
//! Everything here is a local snapshot of remote, platform-owned state.
//! Nothing is authoritative; values are only as fresh as the last query.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Substring that makes the CI job fail when found in a commit subject
pub const CONFLICT_MARKER: &str = "(conflicting)";

/// Name of the CI job, and of the required status check
pub const CHECK_NAME: &str = "merge_queue_check";

/// Path of the workflow file provisioned on scenario branches
pub const WORKFLOW_PATH: &str = ".github/workflows/workflow.yml";

/// Merge strategy configured on the merge queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeMethod {
    /// Create a merge commit
    Merge,
    /// Squash all commits into one
    Squash,
    /// Rebase commits onto base branch
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "MERGE"),
            Self::Squash => write!(f, "SQUASH"),
            Self::Rebase => write!(f, "REBASE"),
        }
    }
}

/// Queue batching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupingStrategy {
    /// Every entry in a batch must pass
    #[serde(rename = "ALLGREEN")]
    AllGreen,
    /// Only the head of the batch must pass
    #[serde(rename = "HEADGREEN")]
    HeadGreen,
}

impl std::fmt::Display for GroupingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllGreen => write!(f, "ALLGREEN"),
            Self::HeadGreen => write!(f, "HEADGREEN"),
        }
    }
}

/// Merge queue rule parameters, serialized exactly as the rulesets API expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeQueueParameters {
    /// Merge method used when the queue lands entries
    pub merge_method: MergeMethod,
    /// Minimum entries to merge in one group
    pub min_entries_to_merge: u32,
    /// Maximum entries to merge in one group
    pub max_entries_to_merge: u32,
    /// Maximum entries built concurrently
    pub max_entries_to_build: u32,
    /// Minutes to wait for `min_entries_to_merge` before merging anyway
    pub min_entries_to_merge_wait_minutes: u32,
    /// Batching policy
    pub grouping_strategy: GroupingStrategy,
    /// Minutes before a missing check response fails the entry
    pub check_response_timeout_minutes: u32,
}

impl Default for MergeQueueParameters {
    /// Single-entry queue used by the probes
    fn default() -> Self {
        Self {
            merge_method: MergeMethod::Merge,
            min_entries_to_merge: 1,
            max_entries_to_merge: 1,
            max_entries_to_build: 3,
            min_entries_to_merge_wait_minutes: 1,
            grouping_strategy: GroupingStrategy::AllGreen,
            check_response_timeout_minutes: 5,
        }
    }
}

/// A ruleset as listed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesetSummary {
    /// Platform-assigned id
    pub id: u64,
    /// Ruleset name
    pub name: String,
}

/// Whether an upsert created or updated its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// Nothing with that identity existed
    Created,
    /// An existing resource was overwritten
    Updated,
}

/// Result of a file write on a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    /// SHA of the commit that carries the write
    pub commit_sha: String,
    /// Blob SHA of the written file (needed to update it again)
    pub content_sha: Option<String>,
}

/// A pull request snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// GraphQL node ID, used for mutations
    pub node_id: Option<String>,
    /// Head branch name
    pub head_ref: String,
    /// Base branch name
    pub base_ref: String,
    /// PR title
    pub title: String,
    /// Whether the PR has been merged
    pub merged: bool,
    /// When the PR was merged
    pub merged_at: Option<DateTime<Utc>>,
    /// Whether the PR can be merged (`None` while GitHub is computing)
    pub mergeable: Option<bool>,
    /// GitHub's mergeable state (`clean`, `dirty`, `blocked`, ...)
    pub mergeable_state: Option<String>,
}

/// A merge queue entry as reported by GraphQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry node id
    pub id: String,
    /// Position in the queue (1-based)
    pub position: u32,
    /// Number of the enqueued PR
    pub pr_number: u64,
    /// Commit the entry is built on, once known
    pub base_commit: Option<String>,
    /// Commit produced for the entry's merge group, once known
    pub head_commit: Option<String>,
    /// Whether the entry is built alone
    pub solo: bool,
    /// Entry state (`QUEUED`, `AWAITING_CHECKS`, `MERGEABLE`, `UNMERGEABLE`, `LOCKED`)
    pub state: String,
}

/// A check run attached to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    /// Check run id
    pub id: u64,
    /// Check name
    pub name: String,
    /// `queued`, `in_progress` or `completed`
    pub status: String,
    /// Final conclusion, once completed
    pub conclusion: Option<String>,
}

/// A GitHub Actions workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run id
    pub id: u64,
    /// Branch the run executed on
    pub head_branch: Option<String>,
    /// Triggering event
    pub event: String,
    /// Run status
    pub status: Option<String>,
    /// Run conclusion
    pub conclusion: Option<String>,
}

static MERGE_GROUP_BRANCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^gh-readonly-queue/(?P<base>.+)/pr-(?P<number>\d+)-(?P<sha>[0-9a-f]+)$")
        .expect("merge group branch pattern is valid")
});

/// Identity of a temporary merge-group branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroupRef {
    /// Branch the queue merges into
    pub base: String,
    /// PR at the tip of the group
    pub pr_number: u64,
    /// Base commit the group was built on
    pub sha: String,
}

impl MergeGroupRef {
    /// Parse `gh-readonly-queue/<base>/pr-<number>-<sha>`
    pub fn parse(branch: &str) -> Option<Self> {
        let caps = MERGE_GROUP_BRANCH.captures(branch)?;
        Some(Self {
            base: caps["base"].to_string(),
            pr_number: caps["number"].parse().ok()?,
            sha: caps["sha"].to_string(),
        })
    }
}

impl WorkflowRun {
    /// Merge group this run belongs to, if it ran on a queue branch
    pub fn merge_group(&self) -> Option<MergeGroupRef> {
        self.head_branch.as_deref().and_then(MergeGroupRef::parse)
    }
}

/// Result of asking the platform to enqueue a PR via auto-merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The mutation succeeded; the platform decides when to merge
    Accepted,
    /// The platform refused the PR outright
    Rejected(String),
}

impl EnqueueOutcome {
    /// Whether the platform accepted the request
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

//! Platform services for the hosted merge queue
//!
//! Every harness operation receives a `&dyn MergeQueuePlatform` explicitly,
//! so scenario logic never touches a global client and can run against a
//! test double.

mod factory;
mod github;

pub use factory::create_platform_service;
pub use github::GitHubService;

use crate::error::Result;
use crate::provision::RulesetDefinition;
use crate::types::{
    CheckRun, EnqueueOutcome, FileCommit, PullRequest, QueueEntry, RulesetSummary, WorkflowRun,
};
use async_trait::async_trait;

/// A file write on a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    /// Branch receiving the commit
    pub branch: String,
    /// Repository-relative path
    pub path: String,
    /// Commit message
    pub message: String,
    /// Raw file content (encoded for transport by the implementation)
    pub content: String,
    /// Blob SHA of the file being replaced; `None` creates the file
    pub sha: Option<String>,
}

/// One page of merge queue entries
#[derive(Debug, Clone, Default)]
pub struct QueuePage {
    /// Entries on this page
    pub entries: Vec<QueueEntry>,
    /// Cursor to pass for the next page
    pub end_cursor: Option<String>,
    /// Whether another page exists
    pub has_next_page: bool,
}

/// Remote operations the harness needs from the hosting platform
///
/// Implementations choose which identity performs each call: policy,
/// workflow and branch writes need the automation identity; pull request
/// creation, auto-merge and reads act as the user.
#[async_trait]
pub trait MergeQueuePlatform: Send + Sync {
    // =========================================================================
    // Refs
    // =========================================================================

    /// Head commit of the repository's default branch
    async fn default_branch_head(&self) -> Result<String>;

    /// Names of all branches in the repository
    async fn list_branches(&self) -> Result<Vec<String>>;

    /// Head commit of `branch`
    async fn branch_head(&self, branch: &str) -> Result<String>;

    /// Create `branch` pointing at `sha`
    async fn create_branch(&self, branch: &str, sha: &str) -> Result<()>;

    /// Delete `branch` (closes any PRs using it as head)
    async fn delete_branch(&self, branch: &str) -> Result<()>;

    // =========================================================================
    // Contents
    // =========================================================================

    /// Blob SHA of `path` on `branch`; `Error::NotFound` if absent
    async fn file_sha(&self, branch: &str, path: &str) -> Result<String>;

    /// Create or update a file; a stale `sha` yields `Error::Conflict`
    async fn put_file(&self, write: &FileWrite) -> Result<FileCommit>;

    /// Merge `head` into `base` server-side, returning the merge commit SHA
    /// (`None` when `base` already contained `head`)
    async fn merge_branches(&self, base: &str, head: &str, message: &str)
    -> Result<Option<String>>;

    /// Messages of the commits reachable from `head` but not from `base`
    async fn compare_commits(&self, base: &str, head: &str) -> Result<Vec<String>>;

    // =========================================================================
    // Rulesets
    // =========================================================================

    /// Rulesets defined on the repository itself (not inherited)
    async fn list_rulesets(&self) -> Result<Vec<RulesetSummary>>;

    /// Create a ruleset, returning its id
    async fn create_ruleset(&self, ruleset: &RulesetDefinition) -> Result<u64>;

    /// Overwrite ruleset `id`
    async fn update_ruleset(&self, id: u64, ruleset: &RulesetDefinition) -> Result<()>;

    // =========================================================================
    // Pull requests and the queue
    // =========================================================================

    /// Open a PR from `head` into `base`
    async fn create_pull_request(&self, head: &str, base: &str, title: &str)
    -> Result<PullRequest>;

    /// Current state of PR `number`
    async fn pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Enable auto-merge, which enqueues the PR when a merge queue is active
    async fn enable_auto_merge(&self, node_id: &str) -> Result<EnqueueOutcome>;

    /// One page of the merge queue for `branch`
    async fn queue_page(&self, branch: &str, cursor: Option<&str>) -> Result<QueuePage>;

    // =========================================================================
    // CI
    // =========================================================================

    /// Check runs attached to commit `sha`
    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>>;

    /// All workflow runs triggered by `event`
    async fn workflow_runs(&self, event: &str) -> Result<Vec<WorkflowRun>>;
}

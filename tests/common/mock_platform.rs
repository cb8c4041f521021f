//! Mock platform service for testing
//!
//! An in-memory repository: branches carry a commit log and a file map,
//! PRs and rulesets live in maps, and the merge queue is scripted as a
//! sequence of snapshots. Queue and merge behavior never happens on its
//! own; tests script exactly what the platform reports.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use merge_queue_probe::error::{Error, Result};
use merge_queue_probe::platform::{FileWrite, MergeQueuePlatform, QueuePage};
use merge_queue_probe::provision::RulesetDefinition;
use merge_queue_probe::types::{
    CheckRun, EnqueueOutcome, FileCommit, PullRequest, QueueEntry, RulesetSummary, WorkflowRun,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

/// Name of the repository default branch
pub const DEFAULT_BRANCH: &str = "main";

/// Head commit of the default branch
pub const DEFAULT_HEAD: &str = "base-sha";

/// Call record for `create_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrCall {
    pub head: String,
    pub base: String,
    pub title: String,
}

/// Call record for `merge_branches`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeBranchesCall {
    pub base: String,
    pub head: String,
    pub message: String,
}

/// Call record for `create_ruleset` / `update_ruleset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesetWrite {
    /// `None` for creation
    pub id: Option<u64>,
    pub definition: RulesetDefinition,
}

/// Call record for `queue_page`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePageCall {
    pub branch: String,
    pub cursor: Option<String>,
}

/// Error to inject into a mock method
#[derive(Debug, Clone)]
pub enum MockError {
    NotFound,
    Conflict,
    Api(String),
}

impl MockError {
    fn to_error(&self, method: &str) -> Error {
        match self {
            Self::NotFound => Error::NotFound(format!("injected by {method}")),
            Self::Conflict => Error::Conflict(format!("injected by {method}")),
            Self::Api(msg) => Error::GitHubApi(msg.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MockBranch {
    head: String,
    /// (sha, message), oldest first
    log: Vec<(String, String)>,
    /// path -> (blob sha, content)
    files: HashMap<String, (String, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    counter: u64,
    branches: HashMap<String, MockBranch>,
    rulesets: Vec<(u64, RulesetDefinition)>,
    pulls: HashMap<u64, PullRequest>,
    next_pr: u64,
    /// Remaining reads of a PR before it reports merged
    merge_schedule: HashMap<u64, u32>,
    merged_at: HashMap<u64, DateTime<Utc>>,
    /// Mergeable state reported for unmerged PRs
    mergeable_states: HashMap<u64, String>,
    enqueue_responses: HashMap<String, EnqueueOutcome>,
    /// Per queue branch: snapshots served one per full fetch, the last one sticks
    queue_snapshots: HashMap<String, VecDeque<Vec<QueueEntry>>>,
    /// Snapshot currently being paged through
    queue_current: HashMap<String, Vec<QueueEntry>>,
    queue_page_size: usize,
    check_runs: HashMap<String, Vec<CheckRun>>,
    workflow_runs: Vec<WorkflowRun>,
    failures: HashMap<&'static str, MockError>,
}

impl MockState {
    fn next_id(&mut self, kind: &str) -> String {
        self.counter += 1;
        format!("{kind}-{}", self.counter)
    }
}

/// Simple mock platform service for testing
///
/// Features:
/// - In-memory branches, files and commit logs
/// - Auto-incrementing PR and ruleset ids
/// - Scripted queue snapshots, merge timing and enqueue responses
/// - Call tracking for verification
/// - Error injection per method
pub struct MockPlatform {
    state: Mutex<MockState>,
    // Call tracking
    calls: Mutex<Vec<&'static str>>,
    deleted_branches: Mutex<Vec<String>>,
    created_branches: Mutex<Vec<(String, String)>>,
    file_writes: Mutex<Vec<FileWrite>>,
    ruleset_writes: Mutex<Vec<RulesetWrite>>,
    create_pr_calls: Mutex<Vec<CreatePrCall>>,
    enqueue_calls: Mutex<Vec<(String, Instant)>>,
    merge_calls: Mutex<Vec<MergeBranchesCall>>,
    queue_page_calls: Mutex<Vec<QueuePageCall>>,
    pull_request_reads: Mutex<Vec<u64>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// A repository holding only the default branch
    pub fn new() -> Self {
        let mut state = MockState {
            next_pr: 1,
            queue_page_size: 100,
            ..MockState::default()
        };
        state.branches.insert(
            DEFAULT_BRANCH.to_string(),
            MockBranch {
                head: DEFAULT_HEAD.to_string(),
                log: vec![(DEFAULT_HEAD.to_string(), "Initial commit".to_string())],
                files: HashMap::new(),
            },
        );

        Self {
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
            deleted_branches: Mutex::new(Vec::new()),
            created_branches: Mutex::new(Vec::new()),
            file_writes: Mutex::new(Vec::new()),
            ruleset_writes: Mutex::new(Vec::new()),
            create_pr_calls: Mutex::new(Vec::new()),
            enqueue_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            queue_page_calls: Mutex::new(Vec::new()),
            pull_request_reads: Mutex::new(Vec::new()),
        }
    }

    fn enter(&self, method: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(method);
        match self.state.lock().unwrap().failures.get(method) {
            Some(err) => Err(err.to_error(method)),
            None => Ok(()),
        }
    }

    // === Error injection methods ===

    /// Make every call to `method` fail with `err`
    pub fn fail(&self, method: &'static str, err: MockError) {
        self.state.lock().unwrap().failures.insert(method, err);
    }

    /// Stop failing `method`
    pub fn recover(&self, method: &'static str) {
        self.state.lock().unwrap().failures.remove(method);
    }

    // === Scripting methods ===

    /// Add a branch with a single commit
    pub fn add_branch(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let sha = state.next_id("commit");
        state.branches.insert(
            name.to_string(),
            MockBranch {
                head: sha.clone(),
                log: vec![(sha, format!("Create {name}"))],
                files: HashMap::new(),
            },
        );
    }

    /// Add an existing ruleset
    pub fn add_ruleset(&self, id: u64, definition: RulesetDefinition) {
        self.state.lock().unwrap().rulesets.push((id, definition));
    }

    /// Serve the merge queue for `branch` as these snapshots, one per full
    /// fetch; the last snapshot is repeated forever
    pub fn script_queue(&self, branch: &str, snapshots: Vec<Vec<QueueEntry>>) {
        self.state
            .lock()
            .unwrap()
            .queue_snapshots
            .insert(branch.to_string(), snapshots.into());
    }

    /// Entries per queue page
    pub fn set_queue_page_size(&self, size: usize) {
        self.state.lock().unwrap().queue_page_size = size;
    }

    /// Report PR `number` merged from its `reads`th read onwards
    pub fn merge_on_read(&self, number: u64, reads: u32) {
        self.state.lock().unwrap().merge_schedule.insert(number, reads);
    }

    /// Timestamp to report when PR `number` merges
    pub fn set_merged_at(&self, number: u64, at: DateTime<Utc>) {
        self.state.lock().unwrap().merged_at.insert(number, at);
    }

    /// Mergeable state to report for PR `number` while it is unmerged
    pub fn set_mergeable_state(&self, number: u64, mergeable_state: &str) {
        self.state
            .lock()
            .unwrap()
            .mergeable_states
            .insert(number, mergeable_state.to_string());
    }

    /// Response to `enable_auto_merge` for the PR with `node_id`
    pub fn set_enqueue_response(&self, node_id: &str, outcome: EnqueueOutcome) {
        self.state
            .lock()
            .unwrap()
            .enqueue_responses
            .insert(node_id.to_string(), outcome);
    }

    /// Check runs reported for commit `sha`
    pub fn set_check_runs(&self, sha: &str, runs: Vec<CheckRun>) {
        self.state
            .lock()
            .unwrap()
            .check_runs
            .insert(sha.to_string(), runs);
    }

    /// Workflow runs reported for every event filter that matches
    pub fn set_workflow_runs(&self, runs: Vec<WorkflowRun>) {
        self.state.lock().unwrap().workflow_runs = runs;
    }

    // === Inspection methods ===

    /// Whether `branch` exists
    pub fn has_branch(&self, branch: &str) -> bool {
        self.state.lock().unwrap().branches.contains_key(branch)
    }

    /// Content of `path` on `branch`
    pub fn file_content(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .and_then(|b| b.files.get(path))
            .map(|(_, content)| content.clone())
    }

    /// Commit messages on `branch`, oldest first
    pub fn commit_messages(&self, branch: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .map(|b| b.log.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Rulesets currently defined
    pub fn rulesets(&self) -> Vec<(u64, RulesetDefinition)> {
        self.state.lock().unwrap().rulesets.clone()
    }

    // === Call verification methods ===

    /// Method names in call order
    pub fn get_calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls to `method`
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    pub fn get_deleted_branches(&self) -> Vec<String> {
        self.deleted_branches.lock().unwrap().clone()
    }

    pub fn get_created_branches(&self) -> Vec<(String, String)> {
        self.created_branches.lock().unwrap().clone()
    }

    pub fn get_file_writes(&self) -> Vec<FileWrite> {
        self.file_writes.lock().unwrap().clone()
    }

    pub fn get_ruleset_writes(&self) -> Vec<RulesetWrite> {
        self.ruleset_writes.lock().unwrap().clone()
    }

    pub fn get_create_pr_calls(&self) -> Vec<CreatePrCall> {
        self.create_pr_calls.lock().unwrap().clone()
    }

    /// Node ids passed to `enable_auto_merge`, with the (tokio) time of the call
    pub fn get_enqueue_calls(&self) -> Vec<(String, Instant)> {
        self.enqueue_calls.lock().unwrap().clone()
    }

    pub fn get_merge_calls(&self) -> Vec<MergeBranchesCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn get_queue_page_calls(&self) -> Vec<QueuePageCall> {
        self.queue_page_calls.lock().unwrap().clone()
    }

    pub fn get_pull_request_reads(&self) -> Vec<u64> {
        self.pull_request_reads.lock().unwrap().clone()
    }

    /// Assert that `create_pull_request` was called with specific head and base
    pub fn assert_create_pr_called(&self, head: &str, base: &str) {
        let calls = self.get_create_pr_calls();
        assert!(
            calls.iter().any(|c| c.head == head && c.base == base),
            "Expected create_pull_request({head}, {base}) but got: {calls:?}"
        );
    }

    /// Assert that a file was written to `path` on `branch`
    pub fn assert_file_written(&self, branch: &str, path: &str) {
        let writes = self.get_file_writes();
        assert!(
            writes.iter().any(|w| w.branch == branch && w.path == path),
            "Expected put_file({branch}, {path}) but got: {writes:?}"
        );
    }
}

#[async_trait]
impl MergeQueuePlatform for MockPlatform {
    async fn default_branch_head(&self) -> Result<String> {
        self.enter("default_branch_head")?;
        let state = self.state.lock().unwrap();
        Ok(state.branches[DEFAULT_BRANCH].head.clone())
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        self.enter("list_branches")?;
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.branches.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn branch_head(&self, branch: &str) -> Result<String> {
        self.enter("branch_head")?;
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .map(|b| b.head.clone())
            .ok_or_else(|| Error::NotFound(format!("branch {branch}")))
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<()> {
        self.enter("create_branch")?;
        self.created_branches
            .lock()
            .unwrap()
            .push((branch.to_string(), sha.to_string()));

        let mut state = self.state.lock().unwrap();
        if state.branches.contains_key(branch) {
            return Err(Error::GitHubApi("Reference already exists".to_string()));
        }
        let source = state
            .branches
            .values()
            .find(|b| b.head == sha)
            .cloned()
            .unwrap_or_else(|| MockBranch {
                head: sha.to_string(),
                ..MockBranch::default()
            });
        state.branches.insert(branch.to_string(), source);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.enter("delete_branch")?;
        let mut state = self.state.lock().unwrap();
        if state.branches.remove(branch).is_none() {
            return Err(Error::NotFound(format!("branch {branch}")));
        }
        drop(state);
        self.deleted_branches.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn file_sha(&self, branch: &str, path: &str) -> Result<String> {
        self.enter("file_sha")?;
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .and_then(|b| b.files.get(path))
            .map(|(sha, _)| sha.clone())
            .ok_or_else(|| Error::NotFound(format!("{branch}:{path}")))
    }

    async fn put_file(&self, write: &FileWrite) -> Result<FileCommit> {
        self.enter("put_file")?;
        self.file_writes.lock().unwrap().push(write.clone());

        let mut state = self.state.lock().unwrap();
        let blob = state.next_id("blob");
        let commit = state.next_id("commit");
        let branch = state
            .branches
            .get_mut(&write.branch)
            .ok_or_else(|| Error::NotFound(format!("branch {}", write.branch)))?;

        match (branch.files.get(&write.path), &write.sha) {
            (Some((current, _)), Some(given)) if current != given => {
                return Err(Error::Conflict(format!("{} is at {current}", write.path)));
            }
            (Some(_), None) => {
                return Err(Error::GitHubApi("\"sha\" wasn't supplied.".to_string()));
            }
            (None, Some(_)) => {
                return Err(Error::Conflict(format!("{} does not exist", write.path)));
            }
            _ => {}
        }

        branch
            .files
            .insert(write.path.clone(), (blob.clone(), write.content.clone()));
        branch.log.push((commit.clone(), write.message.clone()));
        branch.head.clone_from(&commit);

        Ok(FileCommit {
            commit_sha: commit,
            content_sha: Some(blob),
        })
    }

    async fn merge_branches(&self, base: &str, head: &str, message: &str) -> Result<Option<String>> {
        self.enter("merge_branches")?;
        self.merge_calls.lock().unwrap().push(MergeBranchesCall {
            base: base.to_string(),
            head: head.to_string(),
            message: message.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        let incoming = state
            .branches
            .get(head)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("branch {head}")))?;
        let commit = state.next_id("commit");
        let target = state
            .branches
            .get_mut(base)
            .ok_or_else(|| Error::NotFound(format!("branch {base}")))?;

        if target.log.iter().any(|(sha, _)| *sha == incoming.head) {
            return Ok(None);
        }

        for (path, file) in incoming.files {
            target.files.entry(path).or_insert(file);
        }
        for entry in incoming.log {
            if !target.log.contains(&entry) {
                target.log.push(entry);
            }
        }
        target.log.push((commit.clone(), message.to_string()));
        target.head.clone_from(&commit);
        Ok(Some(commit))
    }

    async fn compare_commits(&self, base: &str, head: &str) -> Result<Vec<String>> {
        self.enter("compare_commits")?;
        let state = self.state.lock().unwrap();
        let branch = state
            .branches
            .get(head)
            .ok_or_else(|| Error::NotFound(format!("branch {head}")))?;
        let start = branch
            .log
            .iter()
            .position(|(sha, _)| sha == base)
            .map_or(0, |i| i + 1);
        Ok(branch.log[start..].iter().map(|(_, m)| m.clone()).collect())
    }

    async fn list_rulesets(&self) -> Result<Vec<RulesetSummary>> {
        self.enter("list_rulesets")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .rulesets
            .iter()
            .map(|(id, def)| RulesetSummary {
                id: *id,
                name: def.name.clone(),
            })
            .collect())
    }

    async fn create_ruleset(&self, ruleset: &RulesetDefinition) -> Result<u64> {
        self.enter("create_ruleset")?;
        self.ruleset_writes.lock().unwrap().push(RulesetWrite {
            id: None,
            definition: ruleset.clone(),
        });
        let mut state = self.state.lock().unwrap();
        let id = 1000 + state.rulesets.len() as u64;
        state.rulesets.push((id, ruleset.clone()));
        Ok(id)
    }

    async fn update_ruleset(&self, id: u64, ruleset: &RulesetDefinition) -> Result<()> {
        self.enter("update_ruleset")?;
        self.ruleset_writes.lock().unwrap().push(RulesetWrite {
            id: Some(id),
            definition: ruleset.clone(),
        });
        let mut state = self.state.lock().unwrap();
        let existing = state
            .rulesets
            .iter_mut()
            .find(|(existing, _)| *existing == id)
            .ok_or_else(|| Error::NotFound(format!("ruleset {id}")))?;
        existing.1 = ruleset.clone();
        Ok(())
    }

    async fn create_pull_request(&self, head: &str, base: &str, title: &str) -> Result<PullRequest> {
        self.enter("create_pull_request")?;
        self.create_pr_calls.lock().unwrap().push(CreatePrCall {
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        if !state.branches.contains_key(head) || !state.branches.contains_key(base) {
            return Err(Error::GitHubApi(format!("cannot open PR {head} -> {base}")));
        }
        let number = state.next_pr;
        state.next_pr += 1;
        let pr = PullRequest {
            number,
            node_id: Some(format!("PR_node_{number}")),
            head_ref: head.to_string(),
            base_ref: base.to_string(),
            title: title.to_string(),
            merged: false,
            merged_at: None,
            mergeable: Some(true),
            mergeable_state: Some("blocked".to_string()),
        };
        state.pulls.insert(number, pr.clone());
        Ok(pr)
    }

    async fn pull_request(&self, number: u64) -> Result<PullRequest> {
        self.enter("pull_request")?;
        self.pull_request_reads.lock().unwrap().push(number);

        let mut state = self.state.lock().unwrap();
        let merge_now = match state.merge_schedule.get_mut(&number) {
            Some(remaining) if *remaining <= 1 => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        };
        if merge_now {
            state.merge_schedule.remove(&number);
            let at = state.merged_at.get(&number).copied().unwrap_or_else(Utc::now);
            if let Some(pr) = state.pulls.get_mut(&number) {
                pr.merged = true;
                pr.merged_at = Some(at);
                pr.mergeable = None;
                pr.mergeable_state = Some("unknown".to_string());
            }
        }
        if let Some(mergeable_state) = state.mergeable_states.get(&number).cloned() {
            if let Some(pr) = state.pulls.get_mut(&number).filter(|pr| !pr.merged) {
                pr.mergeable_state = Some(mergeable_state);
            }
        }

        state
            .pulls
            .get(&number)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("PR #{number}")))
    }

    async fn enable_auto_merge(&self, node_id: &str) -> Result<EnqueueOutcome> {
        self.enter("enable_auto_merge")?;
        self.enqueue_calls
            .lock()
            .unwrap()
            .push((node_id.to_string(), Instant::now()));
        let state = self.state.lock().unwrap();
        Ok(state
            .enqueue_responses
            .get(node_id)
            .cloned()
            .unwrap_or(EnqueueOutcome::Accepted))
    }

    async fn queue_page(&self, branch: &str, cursor: Option<&str>) -> Result<QueuePage> {
        self.enter("queue_page")?;
        self.queue_page_calls.lock().unwrap().push(QueuePageCall {
            branch: branch.to_string(),
            cursor: cursor.map(str::to_string),
        });

        let mut state = self.state.lock().unwrap();
        if cursor.is_none() {
            let snapshot = match state.queue_snapshots.get_mut(branch) {
                Some(snapshots) if snapshots.len() > 1 => snapshots.pop_front().unwrap_or_default(),
                Some(snapshots) => snapshots.front().cloned().unwrap_or_default(),
                None => Vec::new(),
            };
            state.queue_current.insert(branch.to_string(), snapshot);
        }

        let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let size = state.queue_page_size;
        let current = state.queue_current.get(branch).cloned().unwrap_or_default();
        let end = (start + size).min(current.len());
        let has_next_page = end < current.len();

        Ok(QueuePage {
            entries: current[start.min(end)..end].to_vec(),
            end_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }

    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        self.enter("check_runs")?;
        let state = self.state.lock().unwrap();
        Ok(state.check_runs.get(sha).cloned().unwrap_or_default())
    }

    async fn workflow_runs(&self, event: &str) -> Result<Vec<WorkflowRun>> {
        self.enter("workflow_runs")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .workflow_runs
            .iter()
            .filter(|run| run.event == event)
            .cloned()
            .collect())
    }
}

/// A queue entry for `pr_number` at `position`
pub fn queue_entry(pr_number: u64, position: u32, head_commit: Option<&str>) -> QueueEntry {
    QueueEntry {
        id: format!("MQE_{pr_number}"),
        position,
        pr_number,
        base_commit: Some(DEFAULT_HEAD.to_string()),
        head_commit: head_commit.map(str::to_string),
        solo: false,
        state: "AWAITING_CHECKS".to_string(),
    }
}

/// A check run named after the CI job
pub fn check_run(id: u64, status: &str) -> CheckRun {
    CheckRun {
        id,
        name: "merge_queue_check".to_string(),
        status: status.to_string(),
        conclusion: None,
    }
}

/// A merge-group workflow run on `head_branch`
pub fn merge_group_run(id: u64, head_branch: &str, status: &str) -> WorkflowRun {
    WorkflowRun {
        id,
        head_branch: Some(head_branch.to_string()),
        event: "merge_group".to_string(),
        status: Some(status.to_string()),
        conclusion: None,
    }
}

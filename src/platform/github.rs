//! GitHub platform service implementation

use crate::error::{Error, Result};
use crate::platform::{FileWrite, MergeQueuePlatform, QueuePage};
use crate::provision::RulesetDefinition;
use crate::types::{
    CheckRun, EnqueueOutcome, FileCommit, PullRequest, QueueEntry, RulesetSummary, WorkflowRun,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// Page size for every paginated REST listing
const PER_PAGE: usize = 100;

// GraphQL envelope

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    /// Error messages, if GitHub reported any
    fn error_messages(&self) -> Option<String> {
        self.errors
            .as_ref()
            .filter(|errors| !errors.is_empty())
            .map(|errors| {
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
    }

    fn into_data(self) -> Result<T> {
        if let Some(messages) = self.error_messages() {
            return Err(Error::GitHubApi(format!("GraphQL error: {messages}")));
        }
        self.data
            .ok_or_else(|| Error::GitHubApi("No data in GraphQL response".to_string()))
    }
}

// GraphQL payloads

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultBranchData {
    repository: DefaultBranchRepository,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultBranchRepository {
    default_branch_ref: Option<RefTarget>,
}

#[derive(Deserialize)]
struct RefTarget {
    target: Oid,
}

#[derive(Deserialize)]
struct Oid {
    oid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeQueueData {
    repository: MergeQueueRepository,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeQueueRepository {
    merge_queue: Option<MergeQueueNode>,
}

#[derive(Deserialize)]
struct MergeQueueNode {
    entries: EntryConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryConnection {
    nodes: Vec<GraphQlQueueEntry>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlQueueEntry {
    id: String,
    position: u32,
    pull_request: Option<PrNumber>,
    base_commit: Option<Oid>,
    head_commit: Option<Oid>,
    solo: bool,
    state: String,
}

#[derive(Deserialize)]
struct PrNumber {
    number: u64,
}

impl GraphQlQueueEntry {
    fn into_entry(self) -> Option<QueueEntry> {
        // Entries whose PR was deleted have nothing to correlate against
        let pr_number = self.pull_request?.number;
        Some(QueueEntry {
            id: self.id,
            position: self.position,
            pr_number,
            base_commit: self.base_commit.map(|c| c.oid),
            head_commit: self.head_commit.map(|c| c.oid),
            solo: self.solo,
            state: self.state,
        })
    }
}

const DEFAULT_BRANCH_QUERY: &str = r"
    query($owner: String!, $name: String!) {
        repository(owner: $owner, name: $name) {
            defaultBranchRef {
                target {
                    oid
                }
            }
        }
    }
";

const ENABLE_AUTO_MERGE_MUTATION: &str = r"
    mutation ($pullRequestId: ID!) {
        enablePullRequestAutoMerge(input: { pullRequestId: $pullRequestId }) {
            clientMutationId
        }
    }
";

const MERGE_QUEUE_QUERY: &str = r"
    query($owner: String!, $name: String!, $queue_branch: String!, $cursor: String) {
        repository(owner: $owner, name: $name) {
            mergeQueue(branch: $queue_branch) {
                entries(first: 100, after: $cursor) {
                    nodes {
                        id
                        position
                        pullRequest { number }
                        baseCommit { oid }
                        headCommit { oid }
                        solo
                        state
                    }
                    pageInfo {
                        endCursor
                        hasNextPage
                    }
                }
            }
        }
    }
";

// REST payloads

#[derive(Deserialize)]
struct BranchItem {
    name: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Serialize)]
struct CreateRefPayload<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct PutFilePayload<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PutFileResponse {
    commit: GitObject,
    content: Option<GitObject>,
}

#[derive(Serialize)]
struct MergePayload<'a> {
    base: &'a str,
    head: &'a str,
    commit_message: &'a str,
}

#[derive(Deserialize)]
struct CompareResponse {
    commits: Vec<CompareCommit>,
}

#[derive(Deserialize)]
struct CompareCommit {
    commit: CommitMessage,
}

#[derive(Deserialize)]
struct CommitMessage {
    message: String,
}

#[derive(Deserialize)]
struct CreatedRuleset {
    id: u64,
}

#[derive(Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct WorkflowRunsResponse {
    workflow_runs: Vec<WorkflowRun>,
}

/// GitHub service using octocrab, acting as two identities
///
/// `app` is the automation app installation: it is the ruleset's bypass
/// actor and performs policy, workflow and branch writes. `user` holds a
/// personal token and performs everything a contributor would: opening PRs,
/// enabling auto-merge, and reads.
pub struct GitHubService {
    app: Octocrab,
    user: Octocrab,
    owner: String,
    repo: String,
}

impl GitHubService {
    /// Create a new GitHub service from two authenticated clients
    pub const fn new(app: Octocrab, user: Octocrab, owner: String, repo: String) -> Self {
        Self {
            app,
            user,
            owner,
            repo,
        }
    }

    /// `/repos/{owner}/{repo}{rest}`
    fn route(&self, rest: &str) -> String {
        format!("/repos/{}/{}{rest}", self.owner, self.repo)
    }

    async fn user_graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQlResponse<T>> {
        self.user
            .graphql(&serde_json::json!({
                "query": query,
                "variables": variables,
            }))
            .await
            .map_err(|e| Error::GitHubApi(format!("GraphQL request failed: {e}")))
    }
}

/// Encode each segment of a branch name for use in a URL path
fn encode_branch(branch: &str) -> String {
    branch
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map 404 and 409 onto the crate's not-found and conflict variants
fn classify(err: octocrab::Error, what: impl FnOnce() -> String) -> Error {
    let err = Error::from(err);
    match err.status_code() {
        Some(404) => Error::NotFound(what()),
        Some(409) => Error::Conflict(what()),
        _ => err,
    }
}

/// Fetch pages of `PER_PAGE` until a short page comes back
async fn paginate<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;
    loop {
        let batch = fetch(page).await?;
        let last = batch.len() < PER_PAGE;
        items.extend(batch);
        if last {
            return Ok(items);
        }
        page += 1;
    }
}

/// Helper to convert octocrab PR to our `PullRequest` type
fn pr_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PullRequest {
    PullRequest {
        number: pr.number,
        node_id: pr.node_id.clone(),
        head_ref: pr.head.ref_field.clone(),
        base_ref: pr.base.ref_field.clone(),
        title: pr.title.clone().unwrap_or_default(),
        merged: pr.merged.unwrap_or(false) || pr.merged_at.is_some(),
        merged_at: pr.merged_at,
        mergeable: pr.mergeable,
        mergeable_state: pr
            .mergeable_state
            .as_ref()
            .and_then(|state| serde_json::to_value(state).ok())
            .and_then(|value| value.as_str().map(ToString::to_string)),
    }
}

#[async_trait]
impl MergeQueuePlatform for GitHubService {
    async fn default_branch_head(&self) -> Result<String> {
        debug!("fetching default branch head");
        let response: GraphQlResponse<DefaultBranchData> = self
            .user_graphql(
                DEFAULT_BRANCH_QUERY,
                serde_json::json!({ "owner": self.owner, "name": self.repo }),
            )
            .await?;

        let oid = response
            .into_data()?
            .repository
            .default_branch_ref
            .ok_or_else(|| Error::GitHubApi("repository has no default branch".to_string()))?
            .target
            .oid;
        debug!(%oid, "default branch head");
        Ok(oid)
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        debug!("listing branches");
        let route = self.route("/branches");
        let branches = paginate(|page| {
            let route = &route;
            async move {
                let params = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
                let items: Vec<BranchItem> = self.user.get(route, Some(&params)).await?;
                Ok(items)
            }
        })
        .await?;

        let names: Vec<String> = branches.into_iter().map(|b| b.name).collect();
        debug!(count = names.len(), "listed branches");
        Ok(names)
    }

    async fn branch_head(&self, branch: &str) -> Result<String> {
        debug!(branch, "fetching branch head");
        let route = self.route(&format!("/git/ref/heads/{}", encode_branch(branch)));
        let git_ref: GitRef = self
            .user
            .get(&route, None::<&()>)
            .await
            .map_err(|e| classify(e, || format!("branch {branch}")))?;
        Ok(git_ref.object.sha)
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<()> {
        debug!(branch, sha, "creating branch");
        let payload = CreateRefPayload {
            ref_name: format!("refs/heads/{branch}"),
            sha,
        };
        let _: serde_json::Value = self
            .app
            .post(self.route("/git/refs"), Some(&payload))
            .await?;
        debug!(branch, "created branch");
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "deleting branch");
        let route = self.route(&format!("/git/refs/heads/{}", encode_branch(branch)));
        let response = self.app._delete(route.as_str(), None::<&()>).await?;
        octocrab::map_github_error(response).await.map_err(|e| {
            // GitHub answers 422 "Reference does not exist" for missing refs
            match classify(e, || format!("branch {branch}")) {
                err if err.status_code() == Some(422) => {
                    Error::NotFound(format!("branch {branch}"))
                }
                err => err,
            }
        })?;
        debug!(branch, "deleted branch");
        Ok(())
    }

    async fn file_sha(&self, branch: &str, path: &str) -> Result<String> {
        debug!(branch, path, "fetching file");
        let route = self.route(&format!("/contents/{path}"));
        let params = [("ref", branch)];
        let content: serde_json::Value = self
            .user
            .get(&route, Some(&params))
            .await
            .map_err(|e| classify(e, || format!("{branch}:{path}")))?;

        if content.is_array() {
            return Err(Error::GitHubApi(format!(
                "{path} on {branch} is a directory, not a file"
            )));
        }

        content
            .get("sha")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::GitHubApi(format!("no sha for {path} on {branch}")))
    }

    async fn put_file(&self, write: &FileWrite) -> Result<FileCommit> {
        debug!(
            branch = %write.branch,
            path = %write.path,
            update = write.sha.is_some(),
            "writing file"
        );
        let payload = PutFilePayload {
            message: &write.message,
            content: BASE64.encode(write.content.as_bytes()),
            branch: &write.branch,
            sha: write.sha.as_deref(),
        };
        let response: PutFileResponse = self
            .app
            .put(self.route(&format!("/contents/{}", write.path)), Some(&payload))
            .await
            .map_err(|e| classify(e, || format!("{}:{}", write.branch, write.path)))?;

        let commit = FileCommit {
            commit_sha: response.commit.sha,
            content_sha: response.content.map(|c| c.sha),
        };
        debug!(commit = %commit.commit_sha, "wrote file");
        Ok(commit)
    }

    async fn merge_branches(
        &self,
        base: &str,
        head: &str,
        message: &str,
    ) -> Result<Option<String>> {
        debug!(base, head, "merging branches");
        let payload = MergePayload {
            base,
            head,
            commit_message: message,
        };
        let response = self
            .app
            ._post(self.route("/merges").as_str(), Some(&payload))
            .await?;
        let response = octocrab::map_github_error(response)
            .await
            .map_err(|e| classify(e, || format!("merge {head} into {base}")))?;

        // 204: base already contains head
        if response.status().as_u16() == 204 {
            debug!(base, head, "nothing to merge");
            return Ok(None);
        }

        let body = self.app.body_to_string(response).await?;
        let commit: GitObject = serde_json::from_str(&body)
            .map_err(|e| Error::GitHubApi(format!("Failed to parse merge response: {e}")))?;
        debug!(base, head, sha = %commit.sha, "merged branches");
        Ok(Some(commit.sha))
    }

    async fn compare_commits(&self, base: &str, head: &str) -> Result<Vec<String>> {
        debug!(base, head, "comparing commits");
        let route = self.route(&format!(
            "/compare/{}...{}",
            encode_branch(base),
            encode_branch(head)
        ));
        let response: CompareResponse = self.user.get(&route, None::<&()>).await?;
        Ok(response
            .commits
            .into_iter()
            .map(|c| c.commit.message)
            .collect())
    }

    async fn list_rulesets(&self) -> Result<Vec<RulesetSummary>> {
        debug!("listing rulesets");
        let route = self.route("/rulesets");
        let rulesets = paginate(|page| {
            let route = &route;
            async move {
                let params = [
                    ("includes_parents", "false".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ];
                let items: Vec<RulesetSummary> = self.app.get(route, Some(&params)).await?;
                Ok(items)
            }
        })
        .await?;
        debug!(count = rulesets.len(), "listed rulesets");
        Ok(rulesets)
    }

    async fn create_ruleset(&self, ruleset: &RulesetDefinition) -> Result<u64> {
        debug!(name = %ruleset.name, "creating ruleset");
        let created: CreatedRuleset = self
            .app
            .post(self.route("/rulesets"), Some(ruleset))
            .await?;
        debug!(id = created.id, "created ruleset");
        Ok(created.id)
    }

    async fn update_ruleset(&self, id: u64, ruleset: &RulesetDefinition) -> Result<()> {
        debug!(id, name = %ruleset.name, "updating ruleset");
        let _: serde_json::Value = self
            .app
            .put(self.route(&format!("/rulesets/{id}")), Some(ruleset))
            .await?;
        debug!(id, "updated ruleset");
        Ok(())
    }

    async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
    ) -> Result<PullRequest> {
        debug!(head, base, "creating PR");
        let pr = self
            .user
            .pulls(&self.owner, &self.repo)
            .create(title, head, base)
            .send()
            .await?;

        let result = pr_from_octocrab(&pr);
        debug!(pr_number = result.number, "created PR");
        Ok(result)
    }

    async fn pull_request(&self, number: u64) -> Result<PullRequest> {
        debug!(pr_number = number, "getting PR");
        let pr = self
            .user
            .pulls(&self.owner, &self.repo)
            .get(number)
            .await
            .map_err(|e| classify(e, || format!("PR #{number}")))?;

        let result = pr_from_octocrab(&pr);
        debug!(
            pr_number = number,
            merged = result.merged,
            mergeable_state = ?result.mergeable_state,
            "got PR"
        );
        Ok(result)
    }

    async fn enable_auto_merge(&self, node_id: &str) -> Result<EnqueueOutcome> {
        debug!(node_id, "enabling auto-merge");
        let response: GraphQlResponse<serde_json::Value> = self
            .user_graphql(
                ENABLE_AUTO_MERGE_MUTATION,
                serde_json::json!({ "pullRequestId": node_id }),
            )
            .await?;

        // GraphQL-level errors are the platform refusing the PR, not a transport fault
        if let Some(messages) = response.error_messages() {
            debug!(node_id, %messages, "auto-merge rejected");
            return Ok(EnqueueOutcome::Rejected(messages));
        }

        debug!(node_id, "auto-merge enabled");
        Ok(EnqueueOutcome::Accepted)
    }

    async fn queue_page(&self, branch: &str, cursor: Option<&str>) -> Result<QueuePage> {
        debug!(branch, ?cursor, "fetching merge queue page");
        let response: GraphQlResponse<MergeQueueData> = self
            .user_graphql(
                MERGE_QUEUE_QUERY,
                serde_json::json!({
                    "owner": self.owner,
                    "name": self.repo,
                    "queue_branch": branch,
                    "cursor": cursor,
                }),
            )
            .await?;

        let Some(queue) = response.into_data()?.repository.merge_queue else {
            debug!(branch, "branch has no merge queue");
            return Ok(QueuePage::default());
        };

        let connection = queue.entries;
        Ok(QueuePage {
            entries: connection
                .nodes
                .into_iter()
                .filter_map(GraphQlQueueEntry::into_entry)
                .collect(),
            end_cursor: connection.page_info.end_cursor,
            has_next_page: connection.page_info.has_next_page,
        })
    }

    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        debug!(sha, "listing check runs");
        let route = self.route(&format!("/commits/{sha}/check-runs"));
        let runs = paginate(|page| {
            let route = &route;
            async move {
                let params = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
                let response: CheckRunsResponse = self.user.get(route, Some(&params)).await?;
                Ok(response.check_runs)
            }
        })
        .await?;
        debug!(sha, count = runs.len(), "listed check runs");
        Ok(runs)
    }

    async fn workflow_runs(&self, event: &str) -> Result<Vec<WorkflowRun>> {
        debug!(event, "listing workflow runs");
        let route = self.route("/actions/runs");
        let runs = paginate(|page| {
            let route = &route;
            async move {
                let params = [
                    ("event", event.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ];
                let response: WorkflowRunsResponse = self.app.get(route, Some(&params)).await?;
                Ok(response.workflow_runs)
            }
        })
        .await?;
        debug!(event, count = runs.len(), "listed workflow runs");
        Ok(runs)
    }
}

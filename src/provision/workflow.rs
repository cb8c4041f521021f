//! CI workflow document
//!
//! The workflow is written as JSON, which is also valid YAML. Its only job
//! sleeps for a configurable time, then fails if any commit subject in the
//! incoming range carries the conflict marker.

use crate::types::{CHECK_NAME, CONFLICT_MARKER};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default CI duration in seconds
pub const DEFAULT_WAIT_SECS: u64 = 10;

#[derive(Serialize)]
struct WorkflowDocument {
    on: [&'static str; 2],
    jobs: BTreeMap<&'static str, Job>,
}

#[derive(Serialize)]
struct Job {
    #[serde(rename = "if")]
    condition: &'static str,
    #[serde(rename = "runs-on")]
    runs_on: &'static str,
    steps: Vec<Step>,
}

#[derive(Serialize)]
struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    uses: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    with: Option<CheckoutOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<String>,
}

#[derive(Serialize)]
struct CheckoutOptions {
    #[serde(rename = "fetch-depth")]
    fetch_depth: u32,
}

impl Step {
    const fn run(command: String) -> Self {
        Self {
            uses: None,
            with: None,
            run: Some(command),
        }
    }
}

/// Render the workflow for a scenario
///
/// The job is skipped for `pull_request` events so that only merge-group
/// runs report the required check.
pub fn render_workflow(branch_prefix: &str, wait_seconds: u64) -> String {
    let job = Job {
        condition: "github.event_name != 'pull_request'",
        runs_on: "ubuntu-latest",
        steps: vec![
            Step {
                uses: Some("actions/checkout@v4"),
                with: Some(CheckoutOptions { fetch_depth: 0 }),
                run: None,
            },
            Step::run(format!("sleep {wait_seconds}")),
            Step::run(format!(
                "! git log --format=%s origin/{branch_prefix}/main..HEAD | grep '{CONFLICT_MARKER}'"
            )),
        ],
    };

    let document = WorkflowDocument {
        on: ["pull_request", "merge_group"],
        jobs: BTreeMap::from([(CHECK_NAME, job)]),
    };

    // Serializing plain structs of strings and integers cannot fail
    serde_json::to_string(&document).unwrap_or_default()
}

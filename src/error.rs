//! Error types for merge-queue-probe

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by provisioning, polling and scenario execution
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the GitHub API client
    #[error("GitHub API error: {0}")]
    GitHub(#[from] octocrab::Error),

    /// The requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A write was rejected because its precondition (e.g. blob SHA) is stale
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected or malformed GitHub response
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Credentials could not be turned into an authenticated client
    #[error("authentication error: {0}")]
    Auth(String),

    /// A scenario phase ran past its wall-clock budget
    #[error("{phase} phase exceeded its {budget:?} budget")]
    PhaseTimeout {
        /// Phase name (cleanup, setup, observe)
        phase: &'static str,
        /// The budget that was exceeded
        budget: Duration,
    },

    /// Scenario precondition violated (e.g. missing node id on a created PR)
    #[error("scenario error: {0}")]
    Scenario(String),
}

impl Error {
    /// HTTP status reported by GitHub, when this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::GitHub(octocrab::Error::GitHub { source, .. }) => {
                Some(source.status_code.as_u16())
            }
            _ => None,
        }
    }

    /// Whether a write lost a race with another writer
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_)) || self.status_code() == Some(409)
    }

    /// Whether the resource was missing (a mapped or raw 404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || self.status_code() == Some(404)
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

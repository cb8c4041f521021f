//! merge-queue-probe - observe how GitHub's merge queue actually behaves
//!
//! The harness provisions isolated scenarios in a live repository (a
//! ruleset, a CI workflow and a pair of feature PRs per branch prefix),
//! enqueues the PRs, then polls the platform and records what happened.
//! Outcomes are data; the live test suite compares them to snapshots.

pub mod config;
pub mod driver;
pub mod error;
pub mod matrix;
pub mod platform;
pub mod poll;
pub mod provision;
pub mod scenario;
pub mod types;

pub use error::{Error, Result};

//! Scenario matrix - the filtered Cartesian product of queue configurations
//!
//! Each surviving tuple becomes one scenario, isolated from the others by
//! its branch prefix.

use crate::types::{GroupingStrategy, MergeMethod, MergeQueueParameters};
use serde::Serialize;
use std::fmt;

/// Check response timeout applied to every matrix ruleset, in minutes
pub const CHECK_RESPONSE_TIMEOUT_MINUTES: u32 = 5;

/// One point in the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScenarioParams {
    /// Queue merge method
    pub merge_method: MergeMethod,
    /// Whether feature 1's commit carries the conflict marker
    pub conflicting1: bool,
    /// Whether feature 2's commit carries the conflict marker
    pub conflicting2: bool,
    /// Minimum group size before merging
    pub min_entries: u32,
    /// Maximum group size
    pub max_entries: u32,
    /// Maximum concurrent builds
    pub max_builds: u32,
    /// Check gating strategy
    pub grouping_strategy: GroupingStrategy,
    /// Seconds between enqueueing PR 1 and PR 2
    pub delay_seconds: u64,
    /// Minutes to wait for `min_entries` before merging anyway
    pub wait_minutes: u32,
}

impl ScenarioParams {
    /// Branch namespace for this scenario
    pub fn branch_prefix(&self) -> String {
        format!(
            "merge-queue/mergeMethod/{}/conflicting1@{}/conflicting2@{}/min-entries@{}/max-entries@{}/max-builds@{}/grouping-strategy@{}/delay@{}/wait-minutes@{}",
            self.merge_method,
            self.conflicting1,
            self.conflicting2,
            self.min_entries,
            self.max_entries,
            self.max_builds,
            self.grouping_strategy,
            self.delay_seconds,
            self.wait_minutes,
        )
    }

    /// Ruleset parameters for this scenario
    pub const fn queue_parameters(&self) -> MergeQueueParameters {
        MergeQueueParameters {
            merge_method: self.merge_method,
            min_entries_to_merge: self.min_entries,
            max_entries_to_merge: self.max_entries,
            max_entries_to_build: self.max_builds,
            min_entries_to_merge_wait_minutes: self.wait_minutes,
            grouping_strategy: self.grouping_strategy,
            check_response_timeout_minutes: CHECK_RESPONSE_TIMEOUT_MINUTES,
        }
    }

    /// Whether `feature` (1 or 2) is the conflicting one
    pub const fn is_conflicting(&self, feature: u8) -> bool {
        match feature {
            1 => self.conflicting1,
            2 => self.conflicting2,
            _ => false,
        }
    }
}

impl fmt::Display for ScenarioParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mergeMethod: {}, conflicting 1: {}, conflicting 2: {}, minEntries: {}, maxEntries: {}, maxBuilds: {}, groupingStrategy: {}, delay: {}, waitMinutes: {}",
            self.merge_method,
            self.conflicting1,
            self.conflicting2,
            self.min_entries,
            self.max_entries,
            self.max_builds,
            self.grouping_strategy,
            self.delay_seconds,
            self.wait_minutes,
        )
    }
}

/// Values for each axis of the matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixAxes {
    /// Merge methods
    pub merge_methods: Vec<MergeMethod>,
    /// Conflict flags, used for both features
    pub conflicting: Vec<bool>,
    /// Minimum group sizes
    pub min_entries: Vec<u32>,
    /// Maximum group sizes
    pub max_entries: Vec<u32>,
    /// Maximum concurrent builds
    pub max_builds: Vec<u32>,
    /// Grouping strategies
    pub grouping_strategies: Vec<GroupingStrategy>,
    /// Enqueue delays in seconds
    pub delays_seconds: Vec<u64>,
    /// Minimum-entries wait times in minutes
    pub wait_minutes: Vec<u32>,
}

impl Default for MatrixAxes {
    fn default() -> Self {
        Self {
            merge_methods: vec![MergeMethod::Merge],
            conflicting: vec![true, false],
            min_entries: vec![1, 2],
            max_entries: vec![1, 2],
            max_builds: vec![1, 2],
            grouping_strategies: vec![GroupingStrategy::AllGreen, GroupingStrategy::HeadGreen],
            delays_seconds: vec![0, 15],
            wait_minutes: vec![1],
        }
    }
}

impl MatrixAxes {
    /// Every axis combination, in axis order with the last axis varying
    /// fastest, before filtering
    pub fn product(&self) -> Vec<ScenarioParams> {
        let mut out = Vec::new();
        for &merge_method in &self.merge_methods {
            for &conflicting1 in &self.conflicting {
                for &conflicting2 in &self.conflicting {
                    for &min_entries in &self.min_entries {
                        for &max_entries in &self.max_entries {
                            for &max_builds in &self.max_builds {
                                for &grouping_strategy in &self.grouping_strategies {
                                    for &delay_seconds in &self.delays_seconds {
                                        for &wait_minutes in &self.wait_minutes {
                                            out.push(ScenarioParams {
                                                merge_method,
                                                conflicting1,
                                                conflicting2,
                                                min_entries,
                                                max_entries,
                                                max_builds,
                                                grouping_strategy,
                                                delay_seconds,
                                                wait_minutes,
                                            });
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// The filtered matrix, order preserved
    pub fn scenarios(&self) -> Vec<ScenarioParams> {
        self.product().into_iter().filter(is_meaningful).collect()
    }
}

/// Whether a combination is worth running
///
/// Drops, in order: more builds than entries, both features conflicting,
/// and a minimum group size above the maximum.
pub const fn is_meaningful(params: &ScenarioParams) -> bool {
    if params.max_builds > params.max_entries {
        return false;
    }
    if params.conflicting1 && params.conflicting2 {
        return false;
    }
    params.min_entries <= params.max_entries
}

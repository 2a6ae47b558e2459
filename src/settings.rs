//! Solver configuration: one immutable settings value per invocation.
//!
//! Settings come from a trusted internal caller, so out-of-range values are
//! clamped to the nearest valid value instead of raised as errors. The
//! execution strategy is a tagged payload ([`DispatchMode`]) rather than
//! per-generation settings structs.

use crate::ordering::{CellOrdering, ShuffleStrategy};
use crate::pruning::PruneFlags;

/// Tail exact-cover solver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailSettings {
    pub enable: bool,
    /// Hand off to the exact-cover solver once this few cells remain open.
    pub threshold: usize,
    /// Per-handoff budget; on expiry the backtracking engine resumes.
    /// 0 means unbounded.
    pub timeout_ms: u64,
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            enable: true,
            threshold: 24,
            timeout_ms: 250,
        }
    }
}

/// Which execution strategy runs the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One engine on the calling thread.
    Sequential,
    /// `workers` independent racing engines with distinct seeds; the first
    /// finisher cancels its siblings.
    Parallel { workers: usize },
    /// Expand the tree to `prefix_depth`, then run each prefix as a
    /// budget-bounded unit; units that exhaust `unit_budget` checkpoint
    /// back for the next round.
    Massive { prefix_depth: usize, unit_budget: u64 },
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Sequential
    }
}

/// Immutable configuration for one solve invocation.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Stop after this many solutions; 0 = unlimited.
    pub max_solutions: usize,
    /// Global wall-clock budget in milliseconds; 0 = unlimited.
    pub timeout_ms: u64,
    pub ordering: CellOrdering,
    pub pruning: PruneFlags,
    /// Break ordering ties at random (seeded) instead of by cell index.
    pub randomize_ties: bool,
    pub seed: u64,
    pub shuffle: ShuffleStrategy,
    pub tail: TailSettings,
    /// Memoize visited (open cells, used counts) states. Defaults off: the
    /// table trades exactness of duplicate solutions for speed.
    pub transposition_table: bool,
    /// Reject placements without floor contact or support from below.
    pub gravity: bool,
    /// Progress callback cadence; 0 disables progress reporting.
    pub status_interval_ms: u64,
    pub dispatch: DispatchMode,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_solutions: 1,
            timeout_ms: 0,
            ordering: CellOrdering::default(),
            pruning: PruneFlags::default(),
            randomize_ties: false,
            seed: 0,
            shuffle: ShuffleStrategy::default(),
            tail: TailSettings::default(),
            transposition_table: false,
            gravity: false,
            status_interval_ms: 500,
            dispatch: DispatchMode::Sequential,
        }
    }
}

/// Ceiling on racing workers; beyond this the extra contention buys nothing.
const MAX_WORKERS: usize = 256;
/// Ceiling on prefix depth; the prefix set grows combinatorially with it.
const MAX_PREFIX_DEPTH: usize = 8;
/// Floor on the per-unit operation budget.
const MIN_UNIT_BUDGET: u64 = 100;
/// Floor on restart intervals so a restart cannot fire before any work.
const MIN_RESTART_NODES: u64 = 100;
const MIN_RESTART_MS: u64 = 10;

impl SolverSettings {
    /// Returns a copy with every out-of-range field clamped to the nearest
    /// valid value.
    pub fn clamped(&self) -> Self {
        let mut settings = self.clone();

        settings.dispatch = match settings.dispatch {
            DispatchMode::Sequential => DispatchMode::Sequential,
            DispatchMode::Parallel { workers } => DispatchMode::Parallel {
                workers: workers.clamp(1, MAX_WORKERS),
            },
            DispatchMode::Massive {
                prefix_depth,
                unit_budget,
            } => DispatchMode::Massive {
                prefix_depth: prefix_depth.clamp(1, MAX_PREFIX_DEPTH),
                unit_budget: unit_budget.max(MIN_UNIT_BUDGET),
            },
        };

        settings.shuffle = match settings.shuffle {
            ShuffleStrategy::PeriodicRestart { interval_nodes } => {
                ShuffleStrategy::PeriodicRestart {
                    interval_nodes: interval_nodes.max(MIN_RESTART_NODES),
                }
            }
            ShuffleStrategy::PeriodicRestartTime { interval_ms } => {
                ShuffleStrategy::PeriodicRestartTime {
                    interval_ms: interval_ms.max(MIN_RESTART_MS),
                }
            }
            ShuffleStrategy::Adaptive {
                depth_threshold,
                max_reshuffles,
            } => ShuffleStrategy::Adaptive {
                depth_threshold,
                max_reshuffles: max_reshuffles.max(1),
            },
            other => other,
        };

        settings
    }

    /// Number of solutions after which the search stops, as a usable bound.
    pub fn solution_limit(&self) -> usize {
        if self.max_solutions == 0 {
            usize::MAX
        } else {
            self.max_solutions
        }
    }
}

//! Backtracking search engine.
//!
//! The driver ties the ordering heuristic, move generator, and pruning
//! oracle together: pick the next cell, try each candidate placement in
//! shuffle order, prune, recurse, backtrack. Restart strategies abandon the
//! whole stack and begin again with a reshuffled piece order; losing that
//! work is the price of escaping unproductive regions. Execution is
//! cooperative: timeouts, cancellation, restarts, and progress reporting
//! are all observed at per-node checkpoints, never mid-mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashSet;

use crate::container::{CellSet, Container};
use crate::moves::{format_packing, MoveTable, Placement};
use crate::ordering::{choose_cell, identity_rank, order_candidates, shuffled_rank, ShuffleStrategy};
use crate::pieces::Catalog;
use crate::pruning::PruneOracle;
use crate::settings::SolverSettings;
use crate::state::SearchState;
use crate::tail::{self, TailOutcome};

/// Terminal status of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// At least one solution was emitted; carries the count.
    SolutionFound(usize),
    /// The search space was fully covered: provably no (further) solution
    /// under the given settings.
    Exhausted,
    /// The global wall-clock budget elapsed before the space was covered.
    TimedOut,
    /// The caller, or a racing sibling's win, stopped the search.
    Cancelled,
}

/// A completed packing: the placement stack at the moment no cell was open.
#[derive(Debug, Clone)]
pub struct SolutionRecord {
    pub placements: Vec<Placement>,
}

impl SolutionRecord {
    /// Plain-text rendering as side-by-side z-slices.
    pub fn render(&self, container: &Container) -> String {
        format_packing(container, &self.placements)
    }
}

/// Counters accumulated over one engine run (including restarts).
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Placements pushed (search tree nodes visited).
    pub nodes_explored: u64,
    pub backtracks: u64,
    /// Branches rejected by the pruning oracle.
    pub pruned: u64,
    /// States skipped because the transposition table had seen them.
    pub table_hits: u64,
    pub restarts: u64,
    pub tail_handoffs: u64,
    /// Tail handoffs that expired and fell back to backtracking.
    pub tail_timeouts: u64,
    pub solutions: u64,
}

/// Progress callback: `(nodes_explored, elapsed_ms)`.
pub type ProgressFn<'cb> = dyn FnMut(u64, u64) + 'cb;

/// Solution callback; return `false` to stop the search. The engine calls
/// it synchronously, so a caller that wants to pause on each solution can
/// simply block before returning.
pub type SolutionFn<'cb> = dyn FnMut(&SolutionRecord) -> bool + 'cb;

/// Why the depth-first walk unwound early.
enum Abort {
    Timeout,
    Cancelled,
    /// Solution limit reached or the solution callback declined to go on.
    Stopped,
    /// A restart trigger fired; the driver loop reshuffles and reruns.
    Restart,
}

/// Checkpoint stride: how many explored nodes between deadline, cancel,
/// restart, and status checks.
const CHECKPOINT_STRIDE: u64 = 256;

/// One backtracking search over a container/catalog pair.
///
/// Owns its `SearchState` exclusively; nothing here is shared with sibling
/// engines except the read-only tables and the cancellation flag.
pub struct Engine<'a> {
    container: &'a Container,
    catalog: &'a Catalog,
    table: &'a MoveTable,
    settings: SolverSettings,
    oracle: PruneOracle<'a>,
    state: SearchState,
    rng: StdRng,
    /// Current piece-preference permutation applied to candidate lists.
    piece_rank: Vec<usize>,
    /// Visited (open cells, used counts) states; cleared on restart so a
    /// half-explored subtree is never mistaken for an exhausted one.
    seen: FxHashSet<(CellSet, Vec<u8>)>,
    stats: Statistics,
    cancel: Option<&'a AtomicBool>,
    start: Instant,
    deadline: Option<Instant>,
    /// Restart window: node count and/or instant at which a restart fires.
    window_nodes: Option<u64>,
    window_deadline: Option<Instant>,
    next_checkpoint: u64,
    next_status: Option<Instant>,
    solutions_found: usize,
}

impl<'a> Engine<'a> {
    pub fn new(
        container: &'a Container,
        catalog: &'a Catalog,
        table: &'a MoveTable,
        settings: &SolverSettings,
        seed: u64,
        cancel: Option<&'a AtomicBool>,
    ) -> Self {
        let settings = settings.clamped();
        let oracle = PruneOracle::new(container, catalog, settings.pruning);
        let state = SearchState::new(container, catalog);
        let rng = StdRng::seed_from_u64(seed);
        let piece_rank = identity_rank(catalog.len());
        Self {
            container,
            catalog,
            table,
            settings,
            oracle,
            state,
            rng,
            piece_rank,
            seen: FxHashSet::default(),
            stats: Statistics::default(),
            cancel,
            start: Instant::now(),
            deadline: None,
            window_nodes: None,
            window_deadline: None,
            next_checkpoint: CHECKPOINT_STRIDE,
            next_status: None,
            solutions_found: 0,
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Runs the search to a terminal status, emitting solutions and
    /// progress through the callbacks.
    pub fn run(
        &mut self,
        on_progress: &mut ProgressFn<'_>,
        on_solution: &mut SolutionFn<'_>,
    ) -> Status {
        self.start = Instant::now();
        self.deadline = match self.settings.timeout_ms {
            0 => None,
            ms => Some(self.start + Duration::from_millis(ms)),
        };
        self.next_status = match self.settings.status_interval_ms {
            0 => None,
            ms => Some(self.start + Duration::from_millis(ms)),
        };

        if self.settings.shuffle.shuffles_initially() {
            self.piece_rank = shuffled_rank(self.catalog.len(), &mut self.rng);
        }

        loop {
            self.open_restart_window();
            match self.dfs(on_progress, on_solution) {
                Ok(()) => {
                    return if self.solutions_found > 0 {
                        Status::SolutionFound(self.solutions_found)
                    } else {
                        Status::Exhausted
                    };
                }
                Err(Abort::Restart) => {
                    self.stats.restarts += 1;
                    debug!(
                        "restart {} after {} nodes",
                        self.stats.restarts, self.stats.nodes_explored
                    );
                    self.state = SearchState::new(self.container, self.catalog);
                    self.seen.clear();
                    self.piece_rank = shuffled_rank(self.catalog.len(), &mut self.rng);
                }
                Err(Abort::Stopped) => return Status::SolutionFound(self.solutions_found),
                Err(Abort::Timeout) => {
                    return if self.solutions_found > 0 {
                        Status::SolutionFound(self.solutions_found)
                    } else {
                        Status::TimedOut
                    };
                }
                Err(Abort::Cancelled) => return Status::Cancelled,
            }
        }
    }

    /// Starts a fresh restart window for the active shuffle strategy.
    fn open_restart_window(&mut self) {
        match self.settings.shuffle {
            ShuffleStrategy::PeriodicRestart { interval_nodes } => {
                self.window_nodes = Some(self.stats.nodes_explored + interval_nodes);
                self.window_deadline = None;
            }
            ShuffleStrategy::PeriodicRestartTime { interval_ms } => {
                self.window_nodes = None;
                self.window_deadline = Some(Instant::now() + Duration::from_millis(interval_ms));
            }
            _ => {
                self.window_nodes = None;
                self.window_deadline = None;
            }
        }
    }

    /// Depth-first walk of the subtree under the current state.
    ///
    /// `Ok(())` means the subtree is exhausted (every solution in it was
    /// emitted); `Err` unwinds the whole stack.
    fn dfs(
        &mut self,
        on_progress: &mut ProgressFn<'_>,
        on_solution: &mut SolutionFn<'_>,
    ) -> Result<(), Abort> {
        self.checkpoint(on_progress)?;

        if self.oracle.check(&self.state).is_some() {
            self.stats.pruned += 1;
            return Ok(());
        }

        if self.settings.transposition_table && !self.seen.insert(self.state.table_key()) {
            self.stats.table_hits += 1;
            return Ok(());
        }

        if self.state.is_complete() {
            return self.emit(on_solution);
        }

        if self.try_tail(on_solution)? {
            return Ok(());
        }

        let tie_rng = if self.settings.randomize_ties {
            Some(&mut self.rng)
        } else {
            None
        };
        let Some(cell) = choose_cell(self.settings.ordering, &self.state, self.table, tie_rng)
        else {
            return Ok(());
        };

        let mut candidates = Vec::new();
        self.table.legal_moves(&self.state, cell, &mut candidates);
        if candidates.is_empty() {
            return Ok(());
        }
        order_candidates(&mut candidates, self.table, &self.piece_rank);

        let mut reshuffles = 0u32;
        let mut index = 0;
        while index < candidates.len() {
            let id = candidates[index];
            self.stats.nodes_explored += 1;
            self.state.push(id, self.table.placement(id));
            let result = self.dfs(on_progress, on_solution);
            self.state.pop(self.table);
            result?;
            self.stats.backtracks += 1;

            // Adaptive reshuffle: above the depth threshold, failed
            // subtrees earn the untried candidates a fresh order, a
            // bounded number of times per node.
            if let ShuffleStrategy::Adaptive {
                depth_threshold,
                max_reshuffles,
            } = self.settings.shuffle
            {
                if self.state.depth() < depth_threshold
                    && reshuffles < max_reshuffles
                    && index + 1 < candidates.len()
                {
                    candidates[index + 1..].shuffle(&mut self.rng);
                    reshuffles += 1;
                }
            }
            index += 1;
        }
        Ok(())
    }

    /// Hands the residual off to the exact-cover solver when it is small
    /// enough and expressible. Returns `Ok(true)` if the subtree was fully
    /// resolved (exhausted), `Ok(false)` to continue backtracking.
    fn try_tail(&mut self, on_solution: &mut SolutionFn<'_>) -> Result<bool, Abort> {
        let tail = self.settings.tail;
        if !tail.enable
            || self.state.open_count() > tail.threshold
            || !tail::applicable(self.table, &self.state, self.settings.gravity)
        {
            return Ok(false);
        }

        self.stats.tail_handoffs += 1;
        let tail_deadline = match (tail.timeout_ms, self.deadline) {
            (0, global) => global,
            (ms, global) => {
                let own = Instant::now() + Duration::from_millis(ms);
                Some(global.map_or(own, |g| g.min(own)))
            }
        };

        let table = self.table;
        let container = self.container;
        let state = &self.state;
        let limit = self.settings.solution_limit();
        let solutions_found = &mut self.solutions_found;
        let stats = &mut self.stats;
        let mut stopped = false;

        let outcome = tail::solve_tail(table, state, tail_deadline, &mut |rows| {
            let mut placements: Vec<Placement> = state
                .stack()
                .iter()
                .chain(rows.iter())
                .map(|&id| table.placement(id).clone())
                .collect();
            placements.sort_by_key(|p| p.cells[0]);
            let record = SolutionRecord { placements };
            assert_exact_cover(container, &record);
            *solutions_found += 1;
            stats.solutions += 1;
            let keep_going = on_solution(&record) && *solutions_found < limit;
            stopped = !keep_going;
            keep_going
        });

        match outcome {
            TailOutcome::Exhausted => Ok(true),
            TailOutcome::LimitReached => Err(Abort::Stopped),
            TailOutcome::OutOfTime => {
                self.stats.tail_timeouts += 1;
                if stopped {
                    Err(Abort::Stopped)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Emits the completed stack as a solution.
    fn emit(&mut self, on_solution: &mut SolutionFn<'_>) -> Result<(), Abort> {
        let record = SolutionRecord {
            placements: self
                .state
                .stack()
                .iter()
                .map(|&id| self.table.placement(id).clone())
                .collect(),
        };
        assert_exact_cover(self.container, &record);
        self.solutions_found += 1;
        self.stats.solutions += 1;
        if !on_solution(&record) || self.solutions_found >= self.settings.solution_limit() {
            return Err(Abort::Stopped);
        }
        Ok(())
    }

    /// Cooperative checkpoint: cancellation, deadline, restart triggers,
    /// and the progress callback, gated to every `CHECKPOINT_STRIDE` nodes.
    fn checkpoint(&mut self, on_progress: &mut ProgressFn<'_>) -> Result<(), Abort> {
        if let Some(window) = self.window_nodes {
            // Node-based restarts are exact, not stride-gated.
            if self.stats.nodes_explored >= window {
                return Err(Abort::Restart);
            }
        }
        if self.stats.nodes_explored < self.next_checkpoint {
            return Ok(());
        }
        self.next_checkpoint = self.stats.nodes_explored + CHECKPOINT_STRIDE;

        if self.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(Abort::Cancelled);
        }
        let now = Instant::now();
        if self.deadline.is_some_and(|d| now >= d) {
            return Err(Abort::Timeout);
        }
        if self.window_deadline.is_some_and(|d| now >= d) {
            return Err(Abort::Restart);
        }
        if let Some(due) = self.next_status {
            if now >= due {
                let elapsed_ms = (now - self.start).as_millis() as u64;
                on_progress(self.stats.nodes_explored, elapsed_ms);
                self.next_status =
                    Some(now + Duration::from_millis(self.settings.status_interval_ms));
            }
        }
        Ok(())
    }
}

/// Exact-cover invariant: the placements cover the container exactly, with
/// no cell covered twice. An overlap here is a programming defect, so debug
/// builds fail loudly.
fn assert_exact_cover(container: &Container, record: &SolutionRecord) {
    if cfg!(debug_assertions) {
        let mut covered = container.empty_set();
        for placement in &record.placements {
            assert!(
                covered.is_disjoint(&placement.mask),
                "placements overlap in emitted solution"
            );
            covered.union_with(&placement.mask);
        }
        assert_eq!(
            covered,
            container.full_set(),
            "emitted solution does not cover the container"
        );
    }
}

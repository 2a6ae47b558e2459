//! Dispatch coordinator: runs the engine sequentially, as racing parallel
//! workers, or as a massively parallel prefix search.
//!
//! Workers never share mutable search state. The only shared pieces are the
//! read-only container/catalog/move tables, a cancellation flag, and a
//! result channel; isolation, not locking, is the correctness mechanism.
//! The massive mode expands the tree to a fixed prefix depth and runs each
//! prefix as a budget-bounded unit on a host thread pool, the same
//! data-parallel model a device executor would use; units have no restart
//! or shuffle logic of their own and checkpoint back to the host when their
//! budget runs out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use log::debug;
use rustc_hash::FxHashSet;

use crate::container::Container;
use crate::engine::{Engine, SolutionRecord, Status};
use crate::moves::{MoveTable, PlacementId};
use crate::ordering::choose_cell;
use crate::pieces::Catalog;
use crate::pruning::PruneOracle;
use crate::settings::{DispatchMode, SolverSettings};
use crate::state::SearchState;

/// Solves the packing problem described by `container` and `catalog` under
/// `settings`, reporting progress and solutions through the callbacks.
///
/// `on_progress(nodes_explored, elapsed_ms)` fires at the configured status
/// interval. `on_solution` fires once per solution, up to `max_solutions`;
/// returning `false` stops the search.
pub fn solve(
    container: &Container,
    catalog: &Catalog,
    settings: &SolverSettings,
    mut on_progress: impl FnMut(u64, u64),
    mut on_solution: impl FnMut(&SolutionRecord) -> bool,
) -> Status {
    let settings = settings.clamped();
    let table = MoveTable::build(container, catalog, settings.gravity);

    match settings.dispatch {
        DispatchMode::Sequential => {
            let mut engine = Engine::new(container, catalog, &table, &settings, settings.seed, None);
            engine.run(&mut on_progress, &mut on_solution)
        }
        DispatchMode::Parallel { workers } => solve_parallel(
            container,
            catalog,
            &table,
            &settings,
            workers,
            &mut on_progress,
            &mut on_solution,
        ),
        DispatchMode::Massive {
            prefix_depth,
            unit_budget,
        } => solve_massive(
            container,
            catalog,
            &table,
            &settings,
            prefix_depth,
            unit_budget,
            &mut on_progress,
            &mut on_solution,
        ),
    }
}

/// Messages sent from racing workers to the coordinator.
enum WorkerEvent {
    Progress { worker: usize, nodes: u64 },
    Solution(SolutionRecord),
    Done { worker: usize, status: Status },
}

/// N independent engines race from distinct seeds; the first solution
/// (subject to the global limit) cancels the siblings.
fn solve_parallel(
    container: &Container,
    catalog: &Catalog,
    table: &MoveTable,
    settings: &SolverSettings,
    workers: usize,
    on_progress: &mut dyn FnMut(u64, u64),
    on_solution: &mut dyn FnMut(&SolutionRecord) -> bool,
) -> Status {
    let cancel = AtomicBool::new(false);
    let (event_tx, event_rx) = unbounded::<WorkerEvent>();
    let start = Instant::now();
    let limit = settings.solution_limit();

    let mut found = 0usize;
    let mut statuses = Vec::with_capacity(workers);
    let mut nodes_by_worker = vec![0u64; workers];
    // Workers cover overlapping spaces, so the same packing can arrive
    // from several of them; the caller sees each one once.
    let mut seen: FxHashSet<Vec<(usize, Vec<u16>)>> = FxHashSet::default();

    thread::scope(|scope| {
        for worker in 0..workers {
            let tx = event_tx.clone();
            let cancel = &cancel;
            let settings = settings;
            scope.spawn(move || {
                let seed = settings.seed.wrapping_add(worker as u64);
                let mut engine =
                    Engine::new(container, catalog, table, settings, seed, Some(cancel));
                let mut report_progress = |nodes: u64, _elapsed: u64| {
                    let _ = tx.send(WorkerEvent::Progress { worker, nodes });
                };
                let mut report_solution = |record: &SolutionRecord| {
                    let _ = tx.send(WorkerEvent::Solution(record.clone()));
                    !cancel.load(Ordering::Relaxed)
                };
                let status = engine.run(&mut report_progress, &mut report_solution);
                debug!("worker {worker} finished: {status:?}");
                let _ = tx.send(WorkerEvent::Done { worker, status });
            });
        }
        drop(event_tx);

        // Drain events on the calling thread; callbacks never run on a
        // worker.
        for event in event_rx.iter() {
            match event {
                WorkerEvent::Progress { worker, nodes } => {
                    nodes_by_worker[worker] = nodes;
                    let total: u64 = nodes_by_worker.iter().sum();
                    on_progress(total, start.elapsed().as_millis() as u64);
                }
                WorkerEvent::Solution(record) => {
                    if found >= limit {
                        // A sibling crossed the line first; drop the extra.
                        continue;
                    }
                    let mut key: Vec<(usize, Vec<u16>)> = record
                        .placements
                        .iter()
                        .map(|p| (p.piece, p.cells.clone()))
                        .collect();
                    key.sort();
                    if !seen.insert(key) {
                        continue;
                    }
                    found += 1;
                    let keep_going = on_solution(&record);
                    if !keep_going || found >= limit {
                        cancel.store(true, Ordering::Relaxed);
                    }
                }
                WorkerEvent::Done { worker: _, status } => {
                    statuses.push(status);
                }
            }
        }
    });

    combine_statuses(found, &statuses)
}

/// Folds the racing workers' terminal statuses into one.
fn combine_statuses(found: usize, statuses: &[Status]) -> Status {
    if found > 0 {
        return Status::SolutionFound(found);
    }
    if statuses.iter().any(|s| matches!(s, Status::Exhausted)) {
        // One worker covering the whole space proves unsolvability.
        return Status::Exhausted;
    }
    if statuses.iter().any(|s| matches!(s, Status::TimedOut)) {
        return Status::TimedOut;
    }
    Status::Cancelled
}

/// A prefix of the search tree being explored by one execution unit: its
/// own `SearchState` plus the explicit walk stack, so an exhausted budget
/// can checkpoint the whole position back to the host.
struct Unit {
    state: SearchState,
    frames: Vec<Frame>,
}

/// One level of a unit's iterative walk.
struct Frame {
    candidates: Vec<PlacementId>,
    next: usize,
    /// Whether this frame's most recent candidate is currently applied to
    /// the state.
    placed: bool,
}

/// What a unit reports back to the host after a dispatch.
enum UnitOutcome {
    /// The unit's subtree is fully explored.
    Exhausted { nodes: u64 },
    /// A full solution; the unit checkpoints so it can be redispatched for
    /// further solutions.
    Solved {
        record: SolutionRecord,
        resumed: Unit,
        nodes: u64,
    },
    /// Budget ran out; redispatch the checkpoint next round.
    OutOfBudget { resumed: Unit, nodes: u64 },
}

impl Unit {
    fn new(state: SearchState, table: &MoveTable, settings: &SolverSettings) -> Self {
        let mut frames = Vec::new();
        if let Some(cell) = choose_cell(settings.ordering, &state, table, None) {
            let mut candidates = Vec::new();
            table.legal_moves(&state, cell, &mut candidates);
            frames.push(Frame {
                candidates,
                next: 0,
                placed: false,
            });
        }
        Self { state, frames }
    }

    /// Runs at most `budget` steps of plain depth-first search. No
    /// shuffling or restarts happen inside a unit.
    fn run(
        mut self,
        table: &MoveTable,
        oracle: &mut PruneOracle<'_>,
        settings: &SolverSettings,
        budget: u64,
    ) -> UnitOutcome {
        let mut nodes = 0u64;
        let mut remaining = budget;

        loop {
            if remaining == 0 {
                return UnitOutcome::OutOfBudget {
                    resumed: self,
                    nodes,
                };
            }
            remaining -= 1;

            let Some(depth) = self.frames.len().checked_sub(1) else {
                return UnitOutcome::Exhausted { nodes };
            };

            if self.frames[depth].placed {
                self.state.pop(table);
                self.frames[depth].placed = false;
            }

            if self.frames[depth].next >= self.frames[depth].candidates.len() {
                self.frames.pop();
                continue;
            }

            let id = self.frames[depth].candidates[self.frames[depth].next];
            self.frames[depth].next += 1;
            self.state.push(id, table.placement(id));
            self.frames[depth].placed = true;
            nodes += 1;

            if oracle.check(&self.state).is_some() {
                continue;
            }

            if self.state.is_complete() {
                let record = SolutionRecord {
                    placements: self
                        .state
                        .stack()
                        .iter()
                        .map(|&p| table.placement(p).clone())
                        .collect(),
                };
                return UnitOutcome::Solved {
                    record,
                    resumed: self,
                    nodes,
                };
            }

            let Some(cell) = choose_cell(settings.ordering, &self.state, table, None) else {
                continue;
            };
            let mut candidates = Vec::new();
            table.legal_moves(&self.state, cell, &mut candidates);
            self.frames.push(Frame {
                candidates,
                next: 0,
                placed: false,
            });
        }
    }
}

/// Expands the search tree to `prefix_depth`, pruning as it goes, and
/// returns the surviving prefix states. Complete states encountered during
/// expansion are emitted through `on_complete`.
fn expand_prefixes(
    container: &Container,
    catalog: &Catalog,
    table: &MoveTable,
    settings: &SolverSettings,
    prefix_depth: usize,
    on_complete: &mut dyn FnMut(&SearchState),
) -> Vec<SearchState> {
    let mut oracle = PruneOracle::new(container, catalog, settings.pruning);
    let mut layer = vec![SearchState::new(container, catalog)];

    for _ in 0..prefix_depth {
        let mut next_layer = Vec::new();
        for state in layer {
            if oracle.check(&state).is_some() {
                continue;
            }
            if state.is_complete() {
                on_complete(&state);
                continue;
            }
            let Some(cell) = choose_cell(settings.ordering, &state, table, None) else {
                continue;
            };
            let mut candidates = Vec::new();
            table.legal_moves(&state, cell, &mut candidates);
            for id in candidates {
                let mut child = state.clone();
                child.push(id, table.placement(id));
                next_layer.push(child);
            }
        }
        layer = next_layer;
        if layer.is_empty() {
            break;
        }
    }

    // Final prune of the frontier so no unit starts on a dead prefix.
    layer.retain(|state| oracle.check(state).is_none());
    layer
}

/// Host loop for the massive mode: dispatch rounds of budget-bounded units
/// across a thread pool, requeueing checkpoints until the queue drains.
#[allow(clippy::too_many_arguments)]
fn solve_massive(
    container: &Container,
    catalog: &Catalog,
    table: &MoveTable,
    settings: &SolverSettings,
    prefix_depth: usize,
    unit_budget: u64,
    on_progress: &mut dyn FnMut(u64, u64),
    on_solution: &mut dyn FnMut(&SolutionRecord) -> bool,
) -> Status {
    let start = Instant::now();
    let deadline = match settings.timeout_ms {
        0 => None,
        ms => Some(start + Duration::from_millis(ms)),
    };
    let limit = settings.solution_limit();
    let mut found = 0usize;
    let mut total_nodes = 0u64;

    // Solutions completed during prefix expansion (tiny puzzles).
    let mut early_stop = false;
    let mut queue: Vec<Unit> = {
        let mut emit = |state: &SearchState| {
            if early_stop || found >= limit {
                return;
            }
            let record = SolutionRecord {
                placements: state
                    .stack()
                    .iter()
                    .map(|&p| table.placement(p).clone())
                    .collect(),
            };
            found += 1;
            if !on_solution(&record) {
                early_stop = true;
            }
        };
        let prefixes = expand_prefixes(
            container,
            catalog,
            table,
            settings,
            prefix_depth,
            &mut emit,
        );
        let mut units = Vec::with_capacity(prefixes.len());
        for state in prefixes {
            // A catalog no larger than the prefix depth can complete during
            // expansion itself.
            if state.is_complete() {
                emit(&state);
            } else {
                units.push(Unit::new(state, table, settings));
            }
        }
        units
    };
    debug!("massive dispatch: {} prefix units", queue.len());

    if early_stop || found >= limit {
        return Status::SolutionFound(found);
    }

    let pool_size = thread::available_parallelism().map_or(1, |n| n.get());
    let mut next_status = match settings.status_interval_ms {
        0 => None,
        ms => Some(start + Duration::from_millis(ms)),
    };
    let mut round = 0u64;

    while !queue.is_empty() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return if found > 0 {
                Status::SolutionFound(found)
            } else {
                Status::TimedOut
            };
        }
        round += 1;

        // One dispatch round: every queued unit gets one budget slice.
        let (unit_tx, unit_rx) = unbounded::<Unit>();
        let (result_tx, result_rx) = unbounded::<UnitOutcome>();
        let in_flight = queue.len();
        for unit in queue.drain(..) {
            unit_tx.send(unit).expect("unit queue closed prematurely");
        }
        drop(unit_tx);

        thread::scope(|scope| {
            for _ in 0..pool_size.min(in_flight) {
                let unit_rx = unit_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    let mut oracle = PruneOracle::new(container, catalog, settings.pruning);
                    for unit in unit_rx.iter() {
                        let outcome = unit.run(table, &mut oracle, settings, unit_budget);
                        if result_tx.send(outcome).is_err() {
                            return;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        for outcome in result_rx.iter() {
            match outcome {
                UnitOutcome::Exhausted { nodes } => total_nodes += nodes,
                UnitOutcome::Solved {
                    record,
                    resumed,
                    nodes,
                } => {
                    total_nodes += nodes;
                    if found >= limit || early_stop {
                        continue;
                    }
                    found += 1;
                    if !on_solution(&record) {
                        early_stop = true;
                    }
                    if found < limit && !early_stop {
                        queue.push(resumed);
                    }
                }
                UnitOutcome::OutOfBudget { resumed, nodes } => {
                    total_nodes += nodes;
                    queue.push(resumed);
                }
            }
        }

        if early_stop || found >= limit {
            return Status::SolutionFound(found);
        }

        if let Some(due) = next_status {
            let now = Instant::now();
            if now >= due {
                on_progress(total_nodes, start.elapsed().as_millis() as u64);
                next_status = Some(now + Duration::from_millis(settings.status_interval_ms));
            }
        }
    }

    debug!("massive dispatch drained after {round} rounds, {total_nodes} nodes");
    if found > 0 {
        Status::SolutionFound(found)
    } else {
        Status::Exhausted
    }
}

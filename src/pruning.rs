//! Pruning oracle: cheap-to-expensive feasibility checks on a search state.
//!
//! Each check is a necessary condition for solvability, so a failure proves
//! the branch dead. The oracle runs them cheapest first and stops at the
//! first failure. Soundness matters more than power here: none of these may
//! ever reject a state that still has a completion.

use crate::container::{CellSet, Container};
use crate::pieces::Catalog;
use crate::state::SearchState;

/// Independently togglable pruning checks, ordered cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneFlags {
    /// Reject when the open-cell count cannot be a sum of piece sizes or
    /// exceeds the remaining inventory.
    pub multiple_of_n: bool,
    /// Reject when some open cell has no open neighbor and no piece is a
    /// single cube.
    pub neighbor_touch: bool,
    /// Reject when the checkerboard imbalance of the open cells exceeds
    /// what the remaining pieces can produce.
    pub parity: bool,
    /// Flood-fill the open cells and reject components that cannot be
    /// filled on their own. The most expensive check and the most
    /// effective.
    pub connectivity: bool,
}

impl Default for PruneFlags {
    fn default() -> Self {
        Self {
            multiple_of_n: true,
            neighbor_touch: true,
            parity: false,
            connectivity: true,
        }
    }
}

impl PruneFlags {
    /// All checks off; the search degenerates to plain backtracking.
    pub fn none() -> Self {
        Self {
            multiple_of_n: false,
            neighbor_touch: false,
            parity: false,
            connectivity: false,
        }
    }
}

/// Why a branch was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneCause {
    /// Open-cell count is not a multiple of the piece-size gcd.
    IndivisibleRemainder,
    /// Remaining pieces hold fewer cells than remain open.
    ShortInventory,
    /// An open cell is unreachable by any multi-cell piece.
    IsolatedCell,
    /// Checkerboard imbalance no remaining piece combination can match.
    ColorImbalance,
    /// A connected component of open cells is unfillable.
    SplitComponent,
}

/// Runs the enabled checks against a state. Holds flood-fill scratch space
/// so repeated checks in the search hot loop stay allocation-free.
pub struct PruneOracle<'a> {
    container: &'a Container,
    catalog: &'a Catalog,
    flags: PruneFlags,
    visited: CellSet,
    queue: Vec<u16>,
}

impl<'a> PruneOracle<'a> {
    pub fn new(container: &'a Container, catalog: &'a Catalog, flags: PruneFlags) -> Self {
        Self {
            container,
            catalog,
            flags,
            visited: container.empty_set(),
            queue: Vec::with_capacity(container.len()),
        }
    }

    /// Returns the first failing check, or `None` if the state passes.
    pub fn check(&mut self, state: &SearchState) -> Option<PruneCause> {
        if state.is_complete() {
            return None;
        }
        if self.flags.multiple_of_n {
            if let Some(cause) = self.check_remainder(state) {
                return Some(cause);
            }
        }
        if self.flags.neighbor_touch {
            if let Some(cause) = self.check_neighbor_touch(state) {
                return Some(cause);
            }
        }
        if self.flags.parity {
            if let Some(cause) = self.check_parity(state) {
                return Some(cause);
            }
        }
        if self.flags.connectivity {
            if let Some(cause) = self.check_connectivity(state) {
                return Some(cause);
            }
        }
        None
    }

    /// Open-cell count must be a multiple of the piece-size gcd and no
    /// larger than the cells the remaining inventory can supply.
    fn check_remainder(&self, state: &SearchState) -> Option<PruneCause> {
        let gcd = self.catalog.size_gcd();
        if gcd > 1 && state.open_count() % gcd != 0 {
            return Some(PruneCause::IndivisibleRemainder);
        }
        let available: usize = self
            .catalog
            .pieces()
            .iter()
            .enumerate()
            .map(|(i, p)| p.size * p.copies.saturating_sub(state.used(i)) as usize)
            .sum();
        if available < state.open_count() {
            return Some(PruneCause::ShortInventory);
        }
        None
    }

    /// Every open cell needs an open neighbor unless a remaining piece is a
    /// single cube.
    fn check_neighbor_touch(&self, state: &SearchState) -> Option<PruneCause> {
        if self.min_remaining_size(state) <= 1 {
            return None;
        }
        let open = state.open();
        for cell in open.iter() {
            if !self.container.neighbors(cell).any(|n| open.contains(n)) {
                return Some(PruneCause::IsolatedCell);
            }
        }
        None
    }

    /// The open region's checkerboard imbalance must be achievable: each
    /// remaining copy contributes at most its orientation-maximal imbalance.
    fn check_parity(&self, state: &SearchState) -> Option<PruneCause> {
        let open = state.open();
        let mut odd = 0usize;
        for cell in open.iter() {
            if self.container.color(cell) {
                odd += 1;
            }
        }
        let even = state.open_count() - odd;
        let imbalance = odd.abs_diff(even);

        let achievable: usize = self
            .catalog
            .pieces()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.max_color_imbalance * p.copies.saturating_sub(state.used(i)) as usize
            })
            .sum();

        if imbalance > achievable {
            return Some(PruneCause::ColorImbalance);
        }
        None
    }

    /// Flood-fills the open cells through face adjacency. A component whose
    /// size is indivisible by the piece-size gcd, or smaller than the
    /// smallest remaining piece, cannot be covered exactly.
    fn check_connectivity(&mut self, state: &SearchState) -> Option<PruneCause> {
        let open = state.open();
        let gcd = self.catalog.size_gcd();
        let min_size = self.min_remaining_size(state);

        self.visited = self.container.empty_set();
        for seed in open.iter() {
            if self.visited.contains(seed) {
                continue;
            }
            let mut component_size = 0usize;
            self.queue.clear();
            self.queue.push(seed);
            self.visited.insert(seed);
            while let Some(cell) = self.queue.pop() {
                component_size += 1;
                for neighbor in self.container.neighbors(cell) {
                    if open.contains(neighbor) && !self.visited.contains(neighbor) {
                        self.visited.insert(neighbor);
                        self.queue.push(neighbor);
                    }
                }
            }
            if (gcd > 1 && component_size % gcd != 0) || component_size < min_size {
                return Some(PruneCause::SplitComponent);
            }
        }
        None
    }

    /// Smallest piece size with inventory left; `usize::MAX` when nothing
    /// remains (the remainder check reports that case).
    fn min_remaining_size(&self, state: &SearchState) -> usize {
        self.catalog
            .pieces()
            .iter()
            .enumerate()
            .filter(|(i, p)| state.used(*i) < p.copies)
            .map(|(_, p)| p.size)
            .min()
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::MoveTable;
    use crate::pieces::PieceDef;

    fn tetromino_catalog() -> Catalog {
        Catalog::new(vec![PieceDef::new(
            "square",
            vec![(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)],
        )
        .with_copies(4)])
    }

    #[test]
    fn five_cells_with_tetrominoes_is_indivisible() {
        let container = Container::new(vec![
            (0, 0, 0),
            (1, 0, 0),
            (2, 0, 0),
            (3, 0, 0),
            (4, 0, 0),
        ]);
        let catalog = tetromino_catalog();
        let state = SearchState::new(&container, &catalog);
        let mut oracle = PruneOracle::new(&container, &catalog, PruneFlags::default());
        assert_eq!(oracle.check(&state), Some(PruneCause::IndivisibleRemainder));
    }

    #[test]
    fn insufficient_inventory_is_rejected() {
        let container = Container::cuboid(4, 2, 1);
        let catalog = Catalog::new(vec![PieceDef::new(
            "square",
            vec![(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)],
        )]);
        let state = SearchState::new(&container, &catalog);
        let mut oracle = PruneOracle::new(&container, &catalog, PruneFlags::default());
        assert_eq!(oracle.check(&state), Some(PruneCause::ShortInventory));
    }

    #[test]
    fn isolated_cell_is_rejected() {
        // A 2x2 plate plus one lone cell far away: the lone cell has no
        // open neighbor and the smallest piece has four cells.
        let container = Container::new(vec![
            (0, 0, 0),
            (1, 0, 0),
            (0, 1, 0),
            (1, 1, 0),
            (9, 9, 9),
        ]);
        let catalog = tetromino_catalog();
        let state = SearchState::new(&container, &catalog);
        let mut flags = PruneFlags::none();
        flags.neighbor_touch = true;
        let mut oracle = PruneOracle::new(&container, &catalog, flags);
        assert_eq!(oracle.check(&state), Some(PruneCause::IsolatedCell));
    }

    #[test]
    fn two_fillable_components_pass_all_checks() {
        // Two disjoint 2x2 plates, two square copies: every check passes.
        let container = Container::new(vec![
            (0, 0, 0),
            (1, 0, 0),
            (0, 1, 0),
            (1, 1, 0),
            (5, 5, 5),
            (6, 5, 5),
            (5, 6, 5),
            (6, 6, 5),
        ]);
        let catalog = tetromino_catalog();
        let state = SearchState::new(&container, &catalog);
        let mut flags = PruneFlags::default();
        flags.parity = true;
        let mut oracle = PruneOracle::new(&container, &catalog, flags);
        assert_eq!(oracle.check(&state), None);
    }

    #[test]
    fn split_component_of_bad_size_is_rejected() {
        // A 2-cell fragment and a 4-cell square, tetromino-only catalog:
        // the fragment is smaller than any piece.
        let container = Container::new(vec![
            (0, 0, 0),
            (1, 0, 0),
            (0, 0, 5),
            (1, 0, 5),
            (0, 1, 5),
            (1, 1, 5),
        ]);
        let catalog = tetromino_catalog();
        let state = SearchState::new(&container, &catalog);
        let mut flags = PruneFlags::default();
        flags.multiple_of_n = false;
        flags.neighbor_touch = false;
        let mut oracle = PruneOracle::new(&container, &catalog, flags);
        assert_eq!(oracle.check(&state), Some(PruneCause::SplitComponent));
    }

    #[test]
    fn parity_rejects_unbalanceable_region() {
        // Four cells all of the same checkerboard color, catalog of
        // balanced dominoes only (imbalance 0 each).
        let container = Container::new(vec![
            (0, 0, 0),
            (2, 0, 0),
            (0, 2, 0),
            (2, 2, 0),
        ]);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(2),
        ]);
        let state = SearchState::new(&container, &catalog);
        let mut flags = PruneFlags::none();
        flags.parity = true;
        let mut oracle = PruneOracle::new(&container, &catalog, flags);
        assert_eq!(oracle.check(&state), Some(PruneCause::ColorImbalance));
    }

    #[test]
    fn connectivity_never_rejects_a_solvable_state() {
        // 2x2x2 cube, two square tetrominoes: solvable, and every state
        // reachable by one placement must also pass.
        let container = Container::cuboid(2, 2, 2);
        let catalog = Catalog::new(vec![PieceDef::new(
            "square",
            vec![(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)],
        )
        .with_copies(2)]);
        let table = MoveTable::build(&container, &catalog, false);
        let mut state = SearchState::new(&container, &catalog);
        let mut oracle = PruneOracle::new(&container, &catalog, PruneFlags::default());

        assert_eq!(oracle.check(&state), None);

        let mut moves = Vec::new();
        table.legal_moves(&state, 0, &mut moves);
        assert!(!moves.is_empty());
        // Pushing the bottom square leaves the top square open; both the
        // child state and the restored parent must pass.
        let flat_bottom = moves
            .iter()
            .find(|&&id| {
                table.placement(id).cells.iter().all(|&c| {
                    let (_, _, z) = container.cell(c);
                    z == 0
                })
            })
            .copied()
            .unwrap();
        state.push(flat_bottom, table.placement(flat_bottom));
        assert_eq!(oracle.check(&state), None);
        state.pop(&table);
        assert_eq!(oracle.check(&state), None);
    }
}

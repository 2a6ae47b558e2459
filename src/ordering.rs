//! Ordering heuristics: which cell to fill next, and in what order to try
//! the candidate placements for it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::moves::{MoveTable, PlacementId};
use crate::state::SearchState;

/// How the next open cell is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellOrdering {
    /// Open cell with the fewest legal placements. Minimizes the branching
    /// factor; the recommended default.
    #[default]
    MostConstrained,
    /// First open cell in index order. Much slower; useful for debugging.
    Naive,
    /// Cell whose fillers are the pieces with the lowest remaining
    /// inventory, tie-broken by fewest legal placements.
    PieceScarcity,
}

/// When (if ever) the candidate piece order is randomized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShuffleStrategy {
    /// Stable catalog order; fully deterministic.
    #[default]
    None,
    /// One seeded shuffle at search start, deterministic thereafter.
    Initial,
    /// Abandon and restart the search with a fresh shuffle every
    /// `interval_nodes` explored nodes.
    PeriodicRestart { interval_nodes: u64 },
    /// As `PeriodicRestart`, but triggered by wall-clock time.
    PeriodicRestartTime { interval_ms: u64 },
    /// Reshuffle a node's untried candidates when the search backtracks to
    /// it from below `depth_threshold`, at most `max_reshuffles` times per
    /// node.
    Adaptive {
        depth_threshold: usize,
        max_reshuffles: u32,
    },
}

impl ShuffleStrategy {
    /// True if the initial piece order should be shuffled.
    pub fn shuffles_initially(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Picks the next cell to fill, or `None` when the state is complete.
///
/// With `tie_rng` supplied, ties between equally good cells are broken at
/// random; otherwise the lowest-index cell wins, keeping runs bit-identical.
///
/// Under gravity, only cells on the lowest open level are considered.
/// Everything beneath that level is covered, so any placement that could
/// ever cover such a cell is supported right now; a zero-count cell there
/// proves the branch dead, which does not hold for cells higher up.
pub fn choose_cell(
    ordering: CellOrdering,
    state: &SearchState,
    table: &MoveTable,
    mut tie_rng: Option<&mut StdRng>,
) -> Option<u16> {
    if state.is_complete() {
        return None;
    }
    let min_level = if table.gravity() {
        state.open().iter().map(|c| table.level(c)).min()
    } else {
        None
    };
    let eligible = |cell: u16| min_level.map_or(true, |m| table.level(cell) == m);
    match ordering {
        CellOrdering::Naive => state.open().iter().find(|&c| eligible(c)),
        CellOrdering::MostConstrained => {
            let mut best: Option<(usize, u16)> = None;
            let mut ties = 0u32;
            for cell in state.open().iter() {
                if !eligible(cell) {
                    continue;
                }
                // A count equal to the current best is a genuine tie, so
                // the early exit must trip strictly above it.
                let limit = best.map_or(usize::MAX, |(count, _)| count + 1);
                let count = table.count_legal(state, cell, limit);
                if count == 0 {
                    // Dead cell: let the engine fail this branch at once.
                    return Some(cell);
                }
                match best {
                    Some((b, _)) if count > b => {}
                    Some((b, _)) if count == b => {
                        ties += 1;
                        if let Some(rng) = tie_rng.as_deref_mut() {
                            // Reservoir choice among equal cells.
                            if rng.gen_range(0..=ties) == 0 {
                                best = Some((count, cell));
                            }
                        }
                    }
                    _ => {
                        ties = 0;
                        best = Some((count, cell));
                    }
                }
            }
            best.map(|(_, cell)| cell)
        }
        CellOrdering::PieceScarcity => {
            let mut best: Option<(u8, usize, u16)> = None;
            for cell in state.open().iter() {
                if !eligible(cell) {
                    continue;
                }
                let Some(scarcity) = table.min_scarcity(state, cell) else {
                    return Some(cell);
                };
                let count_limit = match best {
                    Some((s, c, _)) if s == scarcity => c + 1,
                    Some((s, _, _)) if s < scarcity => continue,
                    _ => usize::MAX,
                };
                let count = table.count_legal(state, cell, count_limit);
                let candidate = (scarcity, count, cell);
                if best.map_or(true, |b| candidate < b) {
                    best = Some(candidate);
                }
            }
            best.map(|(_, _, cell)| cell)
        }
    }
}

/// The identity piece permutation.
pub fn identity_rank(num_pieces: usize) -> Vec<usize> {
    (0..num_pieces).collect()
}

/// A seeded random piece permutation.
pub fn shuffled_rank(num_pieces: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut rank = identity_rank(num_pieces);
    rank.shuffle(rng);
    rank
}

/// Stable-sorts candidate placements by the rank of their piece. Candidates
/// of the same piece keep their table order.
pub fn order_candidates(candidates: &mut [PlacementId], table: &MoveTable, rank: &[usize]) {
    candidates.sort_by_key(|&id| rank[table.placement(id).piece]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::pieces::{Catalog, PieceDef};
    use rand::SeedableRng;

    fn l_plane() -> (Container, Catalog, MoveTable) {
        // 3x2 plane with a domino and a straight tromino.
        let container = Container::cuboid(3, 2, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(3),
            PieceDef::new("bar3", vec![(0, 0, 0), (1, 0, 0), (2, 0, 0)]).with_copies(2),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        (container, catalog, table)
    }

    #[test]
    fn naive_picks_first_open_cell() {
        let (container, catalog, table) = l_plane();
        let state = SearchState::new(&container, &catalog);
        assert_eq!(
            choose_cell(CellOrdering::Naive, &state, &table, None),
            Some(0)
        );
    }

    #[test]
    fn most_constrained_prefers_corner_over_center() {
        // On a 3x3 plane with dominoes, corners have 2 placements and the
        // center has 4.
        let container = Container::cuboid(3, 3, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(5),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);

        let chosen = choose_cell(CellOrdering::MostConstrained, &state, &table, None).unwrap();
        assert_eq!(table.count_legal(&state, chosen, usize::MAX), 2);
    }

    #[test]
    fn most_constrained_is_deterministic_without_rng() {
        let (container, catalog, table) = l_plane();
        let state = SearchState::new(&container, &catalog);
        let a = choose_cell(CellOrdering::MostConstrained, &state, &table, None);
        let b = choose_cell(CellOrdering::MostConstrained, &state, &table, None);
        assert_eq!(a, b);
    }

    #[test]
    fn tie_rng_stays_within_tied_cells() {
        let container = Container::cuboid(2, 1, 1);
        let catalog = Catalog::new(vec![PieceDef::new(
            "domino",
            vec![(0, 0, 0), (1, 0, 0)],
        )]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        let mut rng = StdRng::seed_from_u64(7);
        // Both cells admit exactly the one placement; any choice is a tie.
        let chosen =
            choose_cell(CellOrdering::MostConstrained, &state, &table, Some(&mut rng)).unwrap();
        assert!(chosen < 2);
    }

    #[test]
    fn randomized_ties_stay_among_minimal_cells() {
        // On a 3x3 plane of dominoes, corners have 2 placements, edges 3,
        // the center 4. Whatever the seed, only a 2-placement cell may win.
        let container = Container::cuboid(3, 3, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(5),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let chosen =
                choose_cell(CellOrdering::MostConstrained, &state, &table, Some(&mut rng))
                    .unwrap();
            assert_eq!(
                table.count_legal(&state, chosen, usize::MAX),
                2,
                "seed {seed}: chose a non-minimal cell {chosen}"
            );
        }
    }

    #[test]
    fn gravity_chooses_from_the_lowest_open_level() {
        // 1x1x4 tower of vertical dominoes: the upper cells have no
        // supported placement yet, but the branch is alive from the floor.
        let container = Container::cuboid(1, 1, 4);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (0, 0, 1)]).with_copies(2),
        ]);
        let table = MoveTable::build(&container, &catalog, true);
        let state = SearchState::new(&container, &catalog);

        for ordering in [
            CellOrdering::MostConstrained,
            CellOrdering::Naive,
            CellOrdering::PieceScarcity,
        ] {
            let chosen = choose_cell(ordering, &state, &table, None).unwrap();
            assert_eq!(table.level(chosen), 0);
            assert!(table.count_legal(&state, chosen, usize::MAX) > 0);
        }
    }

    #[test]
    fn shuffled_rank_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut rank = shuffled_rank(10, &mut rng);
        rank.sort_unstable();
        assert_eq!(rank, identity_rank(10));
    }

    #[test]
    fn order_candidates_groups_by_rank() {
        let (container, catalog, table) = l_plane();
        let state = SearchState::new(&container, &catalog);
        let mut candidates = Vec::new();
        table.legal_moves(&state, 0, &mut candidates);
        assert!(candidates.len() > 2);

        // Rank the tromino ahead of the domino.
        let rank = vec![1, 0];
        order_candidates(&mut candidates, &table, &rank);
        let pieces: Vec<usize> = candidates
            .iter()
            .map(|&id| table.placement(id).piece)
            .collect();
        let first_domino = pieces.iter().position(|&p| p == 0).unwrap();
        assert!(pieces[..first_domino].iter().all(|&p| p == 1));
        assert!(pieces[first_domino..].iter().all(|&p| p == 0));
    }
}

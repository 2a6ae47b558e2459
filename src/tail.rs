//! Tail exact-cover solver: Dancing Links over the residual open cells.
//!
//! Once the backtracking engine has collapsed the branching factor, the
//! remaining subproblem is a pure exact cover: rows are the legal remaining
//! placements, primary columns are the open cells, and each piece type with
//! one copy left contributes a secondary (at-most-once) column. Knuth's
//! toroidal doubly-linked representation makes cover/uncover O(updates).
//!
//! The handoff precondition is checked by [`applicable`]: no piece type may
//! have two or more copies remaining (identical-copy columns cannot be
//! expressed as at-most-once constraints), and gravity must be off (support
//! depends on placement order, which exact cover cannot see).

use std::time::Instant;

use crate::moves::{MoveTable, PlacementId};
use crate::state::SearchState;

/// How a tail handoff ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailOutcome {
    /// The residual space was fully enumerated; every solution in it was
    /// reported (possibly none).
    Exhausted,
    /// The solution visitor asked to stop.
    LimitReached,
    /// The tail budget expired with the residual space unresolved; the
    /// caller should resume backtracking.
    OutOfTime,
}

/// Whether the residual state can be handed to the exact-cover solver.
pub fn applicable(table: &MoveTable, state: &SearchState, gravity: bool) -> bool {
    !gravity && (0..table.num_pieces()).all(|piece| table.remaining(piece, state) <= 1)
}

/// Solves the residual exact cover, invoking `on_solution` with each set of
/// placements that exactly covers the open cells. The visitor returns
/// `false` to stop early.
pub fn solve_tail(
    table: &MoveTable,
    state: &SearchState,
    deadline: Option<Instant>,
    on_solution: &mut dyn FnMut(&[PlacementId]) -> bool,
) -> TailOutcome {
    debug_assert!(applicable(table, state, table.gravity()));

    let mut rows = Vec::new();
    table.all_legal_moves(state, &mut rows);

    let mut matrix = Matrix::build(table, state, &rows);
    matrix.search(deadline, on_solution)
}

/// One node in the toroidal incidence structure. Column headers and the
/// root reuse the same layout; `row` is meaningless for them.
#[derive(Clone, Copy)]
struct Node {
    left: u32,
    right: u32,
    up: u32,
    down: u32,
    column: u32,
    row: u32,
}

const NO_ROW: u32 = u32::MAX;

/// Dancing-Links matrix: node 0 is the root, nodes `1..=columns` are the
/// column headers (secondary headers are not linked into the root ring),
/// and the rest are row entries.
struct Matrix {
    nodes: Vec<Node>,
    /// Remaining rows per column, indexed by header.
    sizes: Vec<u32>,
    /// Placements currently selected.
    selection: Vec<PlacementId>,
    /// Cover operations since the last deadline check.
    ops: u32,
    timed_out: bool,
    stopped: bool,
}

/// Deadline polling stride, in cover operations.
const DEADLINE_STRIDE: u32 = 1 << 12;

impl Matrix {
    fn build(table: &MoveTable, state: &SearchState, rows: &[PlacementId]) -> Self {
        let open: Vec<u16> = state.open().iter().collect();

        // Column layout: open cells first (primary), then one secondary
        // column per piece type with a copy remaining and a row using it.
        let mut cell_column = vec![0u32; open.last().map_or(0, |&c| c as usize + 1)];
        for (i, &cell) in open.iter().enumerate() {
            cell_column[cell as usize] = 1 + i as u32;
        }
        let primary = open.len() as u32;

        let mut piece_column = vec![0u32; table.num_pieces()];
        let mut columns = primary;
        for &row in rows {
            let piece = table.placement(row).piece;
            if piece_column[piece] == 0 {
                columns += 1;
                piece_column[piece] = columns;
            }
        }

        // Root and headers.
        let mut nodes = Vec::with_capacity(1 + columns as usize);
        nodes.push(Node {
            left: primary,
            right: if primary > 0 { 1 } else { 0 },
            up: 0,
            down: 0,
            column: 0,
            row: NO_ROW,
        });
        for header in 1..=columns {
            let in_ring = header <= primary;
            nodes.push(Node {
                left: if in_ring { header - 1 } else { header },
                right: if in_ring {
                    if header == primary {
                        0
                    } else {
                        header + 1
                    }
                } else {
                    header
                },
                up: header,
                down: header,
                column: header,
                row: NO_ROW,
            });
        }
        let mut sizes = vec![0u32; columns as usize + 1];

        // Row nodes: each placement contributes one node per open cell it
        // covers plus one for its piece column. Nodes carry the placement
        // id itself, so a finished selection needs no translation.
        for &row in rows {
            let placement = table.placement(row);
            let mut row_columns: Vec<u32> = placement
                .cells
                .iter()
                .map(|&cell| cell_column[cell as usize])
                .collect();
            row_columns.push(piece_column[placement.piece]);

            let first = nodes.len() as u32;
            for (i, &column) in row_columns.iter().enumerate() {
                let index = nodes.len() as u32;
                let up = nodes[column as usize].up;
                nodes.push(Node {
                    left: if i == 0 { index } else { index - 1 },
                    right: first,
                    up,
                    down: column,
                    column,
                    row,
                });
                nodes[up as usize].down = index;
                nodes[column as usize].up = index;
                if i > 0 {
                    nodes[(index - 1) as usize].right = index;
                }
                sizes[column as usize] += 1;
            }
            // Close the ring leftward too; uncover walks via `left`.
            let last = nodes.len() as u32 - 1;
            nodes[first as usize].left = last;
        }

        Self {
            nodes,
            sizes,
            selection: Vec::new(),
            ops: 0,
            timed_out: false,
            stopped: false,
        }
    }

    fn cover(&mut self, column: u32) {
        self.ops += 1;
        let (left, right) = {
            let h = &self.nodes[column as usize];
            (h.left, h.right)
        };
        self.nodes[left as usize].right = right;
        self.nodes[right as usize].left = left;

        let mut i = self.nodes[column as usize].down;
        while i != column {
            let mut j = self.nodes[i as usize].right;
            while j != i {
                let node = self.nodes[j as usize];
                self.nodes[node.up as usize].down = node.down;
                self.nodes[node.down as usize].up = node.up;
                self.sizes[node.column as usize] -= 1;
                j = node.right;
            }
            i = self.nodes[i as usize].down;
        }
    }

    fn uncover(&mut self, column: u32) {
        let mut i = self.nodes[column as usize].up;
        while i != column {
            let mut j = self.nodes[i as usize].left;
            while j != i {
                let node = self.nodes[j as usize];
                self.nodes[node.up as usize].down = j;
                self.nodes[node.down as usize].up = j;
                self.sizes[node.column as usize] += 1;
                j = node.left;
            }
            i = self.nodes[i as usize].up;
        }
        let (left, right) = {
            let h = &self.nodes[column as usize];
            (h.left, h.right)
        };
        self.nodes[left as usize].right = column;
        self.nodes[right as usize].left = column;
    }

    /// Smallest primary column, or `None` when all are covered.
    fn choose_column(&self) -> Option<u32> {
        let mut best: Option<(u32, u32)> = None;
        let mut column = self.nodes[0].right;
        while column != 0 {
            let size = self.sizes[column as usize];
            if best.is_none_or(|(s, _)| size < s) {
                best = Some((size, column));
            }
            column = self.nodes[column as usize].right;
        }
        best.map(|(_, c)| c)
    }

    fn out_of_time(&mut self, deadline: Option<Instant>) -> bool {
        if self.ops >= DEADLINE_STRIDE {
            self.ops = 0;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.timed_out = true;
            }
        }
        self.timed_out
    }

    fn search(
        &mut self,
        deadline: Option<Instant>,
        on_solution: &mut dyn FnMut(&[PlacementId]) -> bool,
    ) -> TailOutcome {
        let mut rows_scratch = Vec::new();
        self.recurse(deadline, on_solution, &mut rows_scratch);
        if self.timed_out {
            TailOutcome::OutOfTime
        } else if self.stopped {
            TailOutcome::LimitReached
        } else {
            TailOutcome::Exhausted
        }
    }

    fn recurse(
        &mut self,
        deadline: Option<Instant>,
        on_solution: &mut dyn FnMut(&[PlacementId]) -> bool,
        rows: &mut Vec<PlacementId>,
    ) {
        if self.out_of_time(deadline) {
            return;
        }
        let Some(column) = self.choose_column() else {
            rows.clear();
            rows.extend(self.selection.iter().copied());
            if !on_solution(rows) {
                self.stopped = true;
            }
            return;
        };

        self.cover(column);
        let mut r = self.nodes[column as usize].down;
        while r != column {
            self.selection.push(self.nodes[r as usize].row);
            let mut j = self.nodes[r as usize].right;
            while j != r {
                let col = self.nodes[j as usize].column;
                self.cover(col);
                j = self.nodes[j as usize].right;
            }

            self.recurse(deadline, on_solution, rows);

            let mut j = self.nodes[r as usize].left;
            while j != r {
                let col = self.nodes[j as usize].column;
                self.uncover(col);
                j = self.nodes[j as usize].left;
            }
            self.selection.pop();

            if self.timed_out || self.stopped {
                break;
            }
            r = self.nodes[r as usize].down;
        }
        self.uncover(column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::pieces::{Catalog, PieceDef};

    /// Runs the tail solver from a fresh state, collecting every solution.
    fn enumerate(table: &MoveTable, state: &SearchState) -> Vec<Vec<PlacementId>> {
        let mut solutions = Vec::new();
        let outcome = solve_tail(table, state, None, &mut |selection| {
            let mut ids = selection.to_vec();
            ids.sort_unstable();
            solutions.push(ids);
            true
        });
        assert_eq!(outcome, TailOutcome::Exhausted);
        solutions
    }

    #[test]
    fn single_piece_exact_fit() {
        // 4-cell container formed exactly like one piece orientation.
        let container = Container::new(vec![(0, 0, 0), (1, 0, 0), (2, 0, 0), (0, 1, 0)]);
        let catalog = Catalog::new(vec![PieceDef::new(
            "ell",
            vec![(0, 0, 0), (1, 0, 0), (2, 0, 0), (0, 1, 0)],
        )]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);

        let solutions = enumerate(&table, &state);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].len(), 1);
        assert_eq!(table.placement(solutions[0][0]).cells.len(), 4);
    }

    #[test]
    fn unsolvable_residual_is_exhausted_with_no_solutions() {
        // 3-cell strip, one domino: no exact cover.
        let container = Container::cuboid(3, 1, 1);
        let catalog = Catalog::new(vec![PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)])]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        assert!(enumerate(&table, &state).is_empty());
    }

    #[test]
    fn piece_columns_forbid_reuse() {
        // 2x2 plane, a single domino copy: two dominoes would tile it, but
        // only one copy exists, so there is no solution.
        let container = Container::cuboid(2, 2, 1);
        let catalog = Catalog::new(vec![PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)])]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        assert!(enumerate(&table, &state).is_empty());
    }

    #[test]
    fn unwinding_a_solution_leaves_the_matrix_intact() {
        // 1x4 strip, two labeled dominoes: one matching, two labelings.
        // Finding the second solution requires fully unwinding the first,
        // so any corruption of the row rings shows up here.
        let container = Container::cuboid(4, 1, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("a", vec![(0, 0, 0), (1, 0, 0)]),
            PieceDef::new("b", vec![(0, 0, 0), (1, 0, 0)]),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        assert_eq!(enumerate(&table, &state).len(), 2);
    }

    #[test]
    fn two_distinct_pieces_tile_the_square() {
        let container = Container::cuboid(2, 2, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("a", vec![(0, 0, 0), (1, 0, 0)]),
            PieceDef::new("b", vec![(0, 0, 0), (1, 0, 0)]),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        // Two tilings (horizontal pair, vertical pair), and the two labeled
        // dominoes can swap roles in each: 4 solutions.
        assert_eq!(enumerate(&table, &state).len(), 4);
    }

    #[test]
    fn visitor_can_stop_enumeration() {
        let container = Container::cuboid(2, 2, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("a", vec![(0, 0, 0), (1, 0, 0)]),
            PieceDef::new("b", vec![(0, 0, 0), (1, 0, 0)]),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);

        let mut seen = 0;
        let outcome = solve_tail(&table, &state, None, &mut |_| {
            seen += 1;
            false
        });
        assert_eq!(outcome, TailOutcome::LimitReached);
        assert_eq!(seen, 1);
    }

    #[test]
    fn multi_copy_inventory_is_not_applicable() {
        let container = Container::cuboid(2, 2, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(2),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        assert!(!applicable(&table, &state, false));
        assert!(!applicable(&table, &state, true));
    }
}

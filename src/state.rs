//! Mutable per-search state: open cells, piece inventory, placement stack.
//!
//! A `SearchState` is exclusively owned by the search instance mutating it;
//! workers never share one. The exact-cover invariant (open cells plus the
//! cells of every stacked placement partition the container) is enforced
//! with debug assertions on every push and pop.

use crate::container::{CellSet, Container};
use crate::moves::{MoveTable, Placement, PlacementId};
use crate::pieces::Catalog;

/// The mutable record of a search in progress.
#[derive(Debug, Clone)]
pub struct SearchState {
    /// Cells not yet covered by any placement.
    open: CellSet,
    /// Cached `open.count()`, kept in sync by push/pop.
    open_count: usize,
    /// Copies of each piece placed so far, indexed by piece.
    used: Vec<u8>,
    /// Placements in the order they were made.
    stack: Vec<PlacementId>,
}

impl SearchState {
    /// A fresh state with the whole container open and no pieces used.
    pub fn new(container: &Container, catalog: &Catalog) -> Self {
        Self {
            open: container.full_set(),
            open_count: container.len(),
            used: vec![0; catalog.len()],
            stack: Vec::with_capacity(catalog.len()),
        }
    }

    #[inline]
    pub fn open(&self) -> &CellSet {
        &self.open
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    #[inline]
    pub fn used(&self, piece: usize) -> u8 {
        self.used[piece]
    }

    #[inline]
    pub fn stack(&self) -> &[PlacementId] {
        &self.stack
    }

    /// Number of placements on the stack.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True once every container cell is covered.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.open_count == 0
    }

    /// Applies a placement: marks its cells covered and consumes one copy of
    /// its piece.
    pub fn push(&mut self, id: PlacementId, placement: &Placement) {
        debug_assert!(
            self.open.is_superset(&placement.mask),
            "placement overlaps covered cells"
        );
        self.open.subtract(&placement.mask);
        self.open_count -= placement.cells.len();
        self.used[placement.piece] += 1;
        self.stack.push(id);
    }

    /// Reverts the most recent placement. Panics if the stack is empty.
    pub fn pop(&mut self, table: &MoveTable) -> PlacementId {
        let id = self.stack.pop().expect("pop on empty placement stack");
        let placement = table.placement(id);
        debug_assert!(
            self.open.is_disjoint(&placement.mask),
            "popped placement's cells were not covered"
        );
        self.open.union_with(&placement.mask);
        self.open_count += placement.cells.len();
        self.used[placement.piece] -= 1;
        id
    }

    /// Transposition-table key: open cells and used piece counts jointly.
    ///
    /// Keying on open cells alone is unsound: a dead state under one
    /// remaining inventory can be live under another.
    pub fn table_key(&self) -> (CellSet, Vec<u8>) {
        (self.open.clone(), self.used.clone())
    }
}

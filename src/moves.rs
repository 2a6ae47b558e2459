//! Move generation: every legal placement, precomputed per (cell, piece).
//!
//! All placements that fit the container are enumerated once up front, the
//! way the original bitmask solver precomputed its placement table. Each
//! placement stores both a `CellSet` mask (for word-wise collision checks)
//! and its covered cell indices (for building solutions). Out-of-bounds
//! anchors are rejected during construction, so the search never sees them.

use crate::container::{CellSet, Container, NO_CELL};
use crate::geometry::{translate, Coord};
use crate::pieces::Catalog;
use crate::state::SearchState;

/// Index into a [`MoveTable`]'s placement arena.
pub type PlacementId = u32;

/// A concrete (piece, orientation, anchor) assignment covering specific
/// container cells.
#[derive(Debug, Clone)]
pub struct Placement {
    pub piece: usize,
    pub orientation: usize,
    /// Translation applied to the orientation's offsets.
    pub anchor: Coord,
    /// Covered container cell indices, ascending.
    pub cells: Vec<u16>,
    /// Bitset form of `cells`.
    pub mask: CellSet,
    /// True if some cell of this placement rests on the container floor.
    touches_floor: bool,
}

/// Precomputed legal placements for one container/catalog pair.
///
/// Shared read-only across all search workers.
#[derive(Debug)]
pub struct MoveTable {
    placements: Vec<Placement>,
    /// `by_cell[cell][piece]` lists the placements of `piece` covering `cell`.
    by_cell: Vec<Vec<Vec<PlacementId>>>,
    /// Copies available per piece, copied out of the catalog.
    copies: Vec<u8>,
    /// Cell directly beneath each container cell (`NO_CELL` at the floor).
    below: Vec<u16>,
    /// z coordinate of each container cell, for bottom-up ordering under
    /// gravity.
    level: Vec<i32>,
    gravity: bool,
}

impl MoveTable {
    /// Enumerates every placement of every catalog piece that fits the
    /// container.
    ///
    /// With `gravity` set, placements whose cells have no support (neither
    /// floor contact nor a covered cell beneath) are filtered out of
    /// [`legal_moves`](Self::legal_moves) dynamically; floor contact is
    /// precomputed here.
    pub fn build(container: &Container, catalog: &Catalog, gravity: bool) -> Self {
        let mut placements = Vec::new();
        let mut by_cell = vec![vec![Vec::new(); catalog.len()]; container.len()];

        for (piece, entry) in catalog.pieces().iter().enumerate() {
            for (orientation, offsets) in entry.orientations.iter().enumerate() {
                // Anchoring the orientation's first offset to each container
                // cell enumerates every translation exactly once.
                let base = offsets[0];
                for &cell in container.cells() {
                    let anchor = (cell.0 - base.0, cell.1 - base.1, cell.2 - base.2);
                    if let Some(placement) =
                        resolve_placement(container, piece, orientation, anchor, offsets)
                    {
                        let id = placements.len() as PlacementId;
                        for &covered in &placement.cells {
                            by_cell[covered as usize][piece].push(id);
                        }
                        placements.push(placement);
                    }
                }
            }
        }

        let below = (0..container.len() as u16)
            .map(|i| container.below(i).unwrap_or(NO_CELL))
            .collect();

        Self {
            placements,
            by_cell,
            copies: catalog.pieces().iter().map(|p| p.copies).collect(),
            below,
            level: container.cells().iter().map(|&(_, _, z)| z).collect(),
            gravity,
        }
    }

    #[inline]
    pub fn placement(&self, id: PlacementId) -> &Placement {
        &self.placements[id as usize]
    }

    /// Total placements in the table (all pieces, all cells).
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn gravity(&self) -> bool {
        self.gravity
    }

    /// z coordinate of a container cell.
    #[inline]
    pub fn level(&self, cell: u16) -> i32 {
        self.level[cell as usize]
    }

    pub fn num_pieces(&self) -> usize {
        self.copies.len()
    }

    /// Copies of `piece` not yet placed in `state`.
    #[inline]
    pub fn remaining(&self, piece: usize, state: &SearchState) -> u8 {
        self.copies[piece].saturating_sub(state.used(piece))
    }

    /// Appends to `out` every placement legal in `state` that covers
    /// `target`: piece inventory remaining, all cells open, and (under
    /// gravity) supported. Results are grouped by piece in catalog order.
    pub fn legal_moves(&self, state: &SearchState, target: u16, out: &mut Vec<PlacementId>) {
        for (piece, ids) in self.by_cell[target as usize].iter().enumerate() {
            if self.remaining(piece, state) == 0 {
                continue;
            }
            for &id in ids {
                if self.is_legal(id, state) {
                    out.push(id);
                }
            }
        }
    }

    /// Counts legal placements covering `target`, stopping early once
    /// `limit` is reached. Used by the most-constrained-cell heuristic,
    /// where only counts below the current minimum matter.
    pub fn count_legal(&self, state: &SearchState, target: u16, limit: usize) -> usize {
        let mut count = 0;
        for (piece, ids) in self.by_cell[target as usize].iter().enumerate() {
            if self.remaining(piece, state) == 0 {
                continue;
            }
            for &id in ids {
                if self.is_legal(id, state) {
                    count += 1;
                    if count >= limit {
                        return count;
                    }
                }
            }
        }
        count
    }

    /// Appends every placement legal in `state`, each exactly once, in
    /// table order. Used when building the tail solver's incidence matrix.
    pub fn all_legal_moves(&self, state: &SearchState, out: &mut Vec<PlacementId>) {
        for (id, placement) in self.placements.iter().enumerate() {
            if self.remaining(placement.piece, state) > 0 && self.is_legal(id as PlacementId, state)
            {
                out.push(id as PlacementId);
            }
        }
    }

    /// Smallest remaining-copy count among pieces with a legal placement
    /// covering `target`; `None` if no piece can fill it. Drives the
    /// piece-scarcity ordering.
    pub fn min_scarcity(&self, state: &SearchState, target: u16) -> Option<u8> {
        let mut scarcest: Option<u8> = None;
        for (piece, ids) in self.by_cell[target as usize].iter().enumerate() {
            let remaining = self.remaining(piece, state);
            if remaining == 0 || scarcest.is_some_and(|s| s <= remaining) {
                continue;
            }
            if ids.iter().any(|&id| self.is_legal(id, state)) {
                scarcest = Some(remaining);
            }
        }
        scarcest
    }

    #[inline]
    fn is_legal(&self, id: PlacementId, state: &SearchState) -> bool {
        let placement = &self.placements[id as usize];
        state.open().is_superset(&placement.mask)
            && (!self.gravity || self.is_supported(placement, state))
    }

    /// Gravity filter: a placement needs floor contact or at least one cell
    /// resting on an already-covered cell. Cells of the placement itself do
    /// not count as support.
    fn is_supported(&self, placement: &Placement, state: &SearchState) -> bool {
        if placement.touches_floor {
            return true;
        }
        placement.cells.iter().any(|&cell| {
            let below = self.below[cell as usize];
            below != NO_CELL
                && !placement.mask.contains(below)
                && !state.open().contains(below)
        })
    }
}

/// Translates `offsets` by `anchor`; `None` if any cell falls outside the
/// container (boundary reject).
fn resolve_placement(
    container: &Container,
    piece: usize,
    orientation: usize,
    anchor: Coord,
    offsets: &[Coord],
) -> Option<Placement> {
    let mut cells = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        cells.push(container.index_of(translate(offset, anchor))?);
    }
    cells.sort_unstable();

    let mut mask = container.empty_set();
    for &cell in &cells {
        mask.insert(cell);
    }

    let touches_floor = cells.iter().any(|&c| container.rests_on_floor(c));

    Some(Placement {
        piece,
        orientation,
        anchor,
        cells,
        mask,
        touches_floor,
    })
}

/// Formats a (partial) packing as side-by-side z-slices.
///
/// Rows run from the highest y down. Container cells show the 1-based piece
/// number of the placement covering them ('A'.. above 9), '.' when open;
/// positions outside the container show a space.
pub fn format_packing(container: &Container, placements: &[Placement]) -> String {
    if container.is_empty() {
        return String::new();
    }

    let cells = container.cells();
    let min = cells.iter().fold((i32::MAX, i32::MAX, i32::MAX), |m, c| {
        (m.0.min(c.0), m.1.min(c.1), m.2.min(c.2))
    });
    let max = cells.iter().fold((i32::MIN, i32::MIN, i32::MIN), |m, c| {
        (m.0.max(c.0), m.1.max(c.1), m.2.max(c.2))
    });
    let width = (max.0 - min.0 + 1) as usize;

    let mut owner = vec![0u8; container.len()];
    for placement in placements {
        for &cell in &placement.cells {
            owner[cell as usize] = (placement.piece + 1) as u8;
        }
    }

    let mut output = String::new();
    for (i, z) in (min.2..=max.2).enumerate() {
        if i > 0 {
            output.push_str("  ");
        }
        output.push_str(&format!("z={:<w$}", z, w = width));
    }
    output.push('\n');

    for y in (min.1..=max.1).rev() {
        for (i, z) in (min.2..=max.2).enumerate() {
            if i > 0 {
                output.push_str("  ");
            }
            for x in min.0..=max.0 {
                let symbol = match container.index_of((x, y, z)) {
                    None => ' ',
                    Some(idx) => match owner[idx as usize] {
                        0 => '.',
                        n if n < 10 => char::from(b'0' + n),
                        n => char::from(b'A' + n - 10),
                    },
                };
                output.push(symbol);
            }
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pieces::PieceDef;

    fn domino_catalog() -> Catalog {
        Catalog::new(vec![PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)])])
    }

    #[test]
    fn table_enumerates_each_translation_once() {
        let container = Container::cuboid(2, 1, 1);
        let table = MoveTable::build(&container, &domino_catalog(), false);
        // One domino, three axis orientations, but only the x-aligned one
        // fits a 2x1x1 container, in exactly one position.
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn legal_moves_cover_the_target() {
        let container = Container::cuboid(3, 3, 1);
        let catalog = domino_catalog();
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);

        let target = container.index_of((1, 1, 0)).unwrap();
        let mut moves = Vec::new();
        table.legal_moves(&state, target, &mut moves);
        // Center cell of a 3x3 plane: 4 domino placements cover it.
        assert_eq!(moves.len(), 4);
        for id in moves {
            assert!(table.placement(id).cells.contains(&target));
        }
    }

    #[test]
    fn exhausted_inventory_yields_no_moves() {
        let container = Container::cuboid(2, 2, 1);
        let catalog = domino_catalog();
        let table = MoveTable::build(&container, &catalog, false);
        let mut state = SearchState::new(&container, &catalog);

        let mut moves = Vec::new();
        table.legal_moves(&state, 0, &mut moves);
        state.push(moves[0], table.placement(moves[0]));

        // Only copy of the domino is used: no moves anywhere.
        let remaining = state.open().first().unwrap();
        let mut more = Vec::new();
        table.legal_moves(&state, remaining, &mut more);
        assert!(more.is_empty());
    }

    #[test]
    fn occupied_cells_block_placements() {
        let container = Container::cuboid(3, 1, 1);
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(2),
        ]);
        let table = MoveTable::build(&container, &catalog, false);
        let mut state = SearchState::new(&container, &catalog);

        // Cover cells 0 and 1; the lone open cell has no legal domino.
        let mut moves = Vec::new();
        table.legal_moves(&state, 0, &mut moves);
        let covering_origin = moves
            .iter()
            .find(|&&id| table.placement(id).cells == vec![0, 1])
            .copied()
            .unwrap();
        state.push(covering_origin, table.placement(covering_origin));

        let open = state.open().first().unwrap();
        let mut more = Vec::new();
        table.legal_moves(&state, open, &mut more);
        assert!(more.is_empty());
    }

    #[test]
    fn count_legal_respects_limit() {
        let container = Container::cuboid(3, 3, 1);
        let catalog = domino_catalog();
        let table = MoveTable::build(&container, &catalog, false);
        let state = SearchState::new(&container, &catalog);
        let target = container.index_of((1, 1, 0)).unwrap();
        assert_eq!(table.count_legal(&state, target, 2), 2);
        assert_eq!(table.count_legal(&state, target, 100), 4);
    }

    #[test]
    fn gravity_rejects_unsupported_placements() {
        // 1x1x3 tower with a single-cube piece: under gravity only the
        // bottom cell admits a placement while the column is empty.
        let container = Container::cuboid(1, 1, 3);
        let catalog = Catalog::new(vec![
            PieceDef::new("cube", vec![(0, 0, 0)]).with_copies(3),
        ]);
        let table = MoveTable::build(&container, &catalog, true);
        let mut state = SearchState::new(&container, &catalog);

        let bottom = container.index_of((0, 0, 0)).unwrap();
        let middle = container.index_of((0, 0, 1)).unwrap();

        let mut moves = Vec::new();
        table.legal_moves(&state, middle, &mut moves);
        assert!(moves.is_empty(), "floating cube should be rejected");

        table.legal_moves(&state, bottom, &mut moves);
        assert_eq!(moves.len(), 1);

        // Once the bottom cell is covered, the middle cell is supported.
        state.push(moves[0], table.placement(moves[0]));
        let mut more = Vec::new();
        table.legal_moves(&state, middle, &mut more);
        assert_eq!(more.len(), 1);
    }

    #[test]
    fn vertical_piece_supports_itself_via_floor() {
        // A vertical domino in a 1x1x2 tower touches the floor with its
        // lower cell, so gravity admits it.
        let container = Container::cuboid(1, 1, 2);
        let catalog = domino_catalog();
        let table = MoveTable::build(&container, &catalog, true);
        let state = SearchState::new(&container, &catalog);

        let top = container.index_of((0, 0, 1)).unwrap();
        let mut moves = Vec::new();
        table.legal_moves(&state, top, &mut moves);
        assert_eq!(moves.len(), 1);
    }

    #[test]
    fn format_marks_pieces_and_open_cells() {
        let container = Container::cuboid(2, 1, 1);
        let catalog = domino_catalog();
        let table = MoveTable::build(&container, &catalog, false);
        let mut state = SearchState::new(&container, &catalog);

        let mut moves = Vec::new();
        table.legal_moves(&state, 0, &mut moves);
        state.push(moves[0], table.placement(moves[0]));

        let placements: Vec<Placement> = state
            .stack()
            .iter()
            .map(|&id| table.placement(id).clone())
            .collect();
        let text = format_packing(&container, &placements);
        assert!(text.contains("11"));
    }
}

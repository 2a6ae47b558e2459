//! Piece catalog: each piece's precomputed orientations and inventory.
//!
//! The catalog is immutable once built and shared read-only across all
//! search workers. Built-in Soma and Bedlam piece sets are provided for the
//! CLI and tests; arbitrary catalogs can be built from base shapes or from
//! already-computed orientation lists.

use crate::geometry::{all_orientations, Coord};

/// A piece to include in a catalog: a base shape and how many copies of it
/// the solver may place.
#[derive(Debug, Clone)]
pub struct PieceDef {
    pub name: String,
    pub cells: Vec<Coord>,
    pub copies: u8,
}

impl PieceDef {
    pub fn new(name: impl Into<String>, cells: Vec<Coord>) -> Self {
        Self {
            name: name.into(),
            cells,
            copies: 1,
        }
    }

    pub fn with_copies(mut self, copies: u8) -> Self {
        self.copies = copies;
        self
    }
}

/// One piece in a catalog, with its orientation list expanded.
#[derive(Debug, Clone)]
pub struct CatalogPiece {
    pub name: String,
    /// Cells per copy of this piece.
    pub size: usize,
    /// All distinct rotations, each normalized to the origin.
    pub orientations: Vec<Vec<Coord>>,
    /// How many copies may be placed.
    pub copies: u8,
    /// Largest checkerboard-color imbalance any orientation can produce,
    /// used by the parity prune.
    pub max_color_imbalance: usize,
}

/// Immutable mapping from piece index to orientations and inventory.
#[derive(Debug, Clone)]
pub struct Catalog {
    pieces: Vec<CatalogPiece>,
    /// Greatest common divisor of all piece sizes.
    size_gcd: usize,
    min_size: usize,
}

impl Catalog {
    /// Builds a catalog from base shapes, generating all 24-rotation
    /// orientations for each.
    pub fn new(defs: impl IntoIterator<Item = PieceDef>) -> Self {
        Self::from_orientations(defs.into_iter().map(|def| {
            let orientations = all_orientations(&def.cells);
            (def.name, orientations, def.copies)
        }))
    }

    /// Builds a catalog from already-computed orientation lists.
    ///
    /// Each piece's orientations must be non-empty and uniform in size;
    /// pieces with zero copies are allowed (they simply never place).
    pub fn from_orientations(
        pieces: impl IntoIterator<Item = (String, Vec<Vec<Coord>>, u8)>,
    ) -> Self {
        let pieces: Vec<CatalogPiece> = pieces
            .into_iter()
            .map(|(name, orientations, copies)| {
                assert!(!orientations.is_empty(), "piece {name} has no orientations");
                let size = orientations[0].len();
                assert!(size > 0, "piece {name} has an empty orientation");
                assert!(
                    orientations.iter().all(|o| o.len() == size),
                    "piece {name} has orientations of differing size"
                );
                let max_color_imbalance = orientations
                    .iter()
                    .map(|o| color_imbalance(o))
                    .max()
                    .unwrap_or(0);
                CatalogPiece {
                    name,
                    size,
                    orientations,
                    copies,
                    max_color_imbalance,
                }
            })
            .collect();

        let size_gcd = pieces.iter().map(|p| p.size).fold(0, gcd);
        let min_size = pieces.iter().map(|p| p.size).min().unwrap_or(0);

        Self {
            pieces,
            size_gcd,
            min_size,
        }
    }

    pub fn pieces(&self) -> &[CatalogPiece] {
        &self.pieces
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    #[inline]
    pub fn piece(&self, index: usize) -> &CatalogPiece {
        &self.pieces[index]
    }

    /// Greatest common divisor of piece sizes (0 for an empty catalog).
    ///
    /// Any reachable open-cell count is a sum of piece sizes, so a count
    /// that is not a multiple of this gcd is unfillable.
    pub fn size_gcd(&self) -> usize {
        self.size_gcd
    }

    /// Size of the smallest piece (0 for an empty catalog).
    pub fn min_piece_size(&self) -> usize {
        self.min_size
    }

    /// Total cells available across all copies of all pieces.
    pub fn total_cells(&self) -> usize {
        self.pieces
            .iter()
            .map(|p| p.size * p.copies as usize)
            .sum()
    }

    /// The seven Soma pieces (fills a 3x3x3 cube).
    pub fn soma() -> Self {
        Self::new(
            SOMA_SHAPES
                .iter()
                .map(|&(name, cells)| PieceDef::new(name, cells.to_vec())),
        )
    }

    /// The thirteen Bedlam pieces (fills a 4x4x4 cube).
    pub fn bedlam() -> Self {
        Self::new(
            BEDLAM_SHAPES
                .iter()
                .map(|&(name, cells)| PieceDef::new(name, cells.to_vec())),
        )
    }
}

/// |cells on odd checkerboard color - cells on even color| for one
/// orientation. Translation flips both counts together, so the magnitude is
/// placement-invariant.
fn color_imbalance(cells: &[Coord]) -> usize {
    let odd = cells
        .iter()
        .filter(|(x, y, z)| (x + y + z) & 1 == 1)
        .count();
    let even = cells.len() - odd;
    odd.abs_diff(even)
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// The seven Soma cube pieces, normalized so minimum coordinates are at the
/// origin.
pub const SOMA_SHAPES: &[(&str, &[Coord])] = &[
    ("L", &[(0, 0, 0), (1, 0, 0), (2, 0, 0), (0, 1, 0)]),
    ("T", &[(0, 0, 0), (1, 0, 0), (2, 0, 0), (1, 1, 0)]),
    ("S", &[(0, 0, 0), (1, 0, 0), (1, 1, 0), (2, 1, 0)]),
    ("V", &[(0, 0, 0), (1, 0, 0), (0, 1, 0)]),
    ("A", &[(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 0, 1)]),
    ("B", &[(0, 0, 0), (1, 0, 0), (0, 1, 0), (0, 0, 1)]),
    ("P", &[(0, 0, 0), (1, 0, 0), (0, 1, 0), (0, 1, 1)]),
];

/// The thirteen Bedlam cube pieces.
pub const BEDLAM_SHAPES: &[(&str, &[Coord])] = &[
    (
        "little-corner",
        &[(0, 0, 0), (0, 1, 0), (1, 0, 0), (0, 0, 1)],
    ),
    (
        "long-stick",
        &[(0, 0, 0), (1, 0, 0), (2, 0, 0), (3, 0, 0), (3, 1, 0)],
    ),
    (
        "hat",
        &[(0, 0, 0), (0, 1, 0), (1, 1, 0), (1, 2, 0), (2, 2, 0)],
    ),
    (
        "bucket",
        &[(0, 0, 0), (0, 1, 0), (1, 1, 0), (1, 2, 0), (1, 1, 1)],
    ),
    (
        "screw",
        &[(0, 0, 0), (1, 0, 0), (1, 0, 1), (1, 1, 1), (2, 1, 1)],
    ),
    (
        "twist",
        &[(0, 0, 0), (1, 0, 0), (1, 1, 0), (1, 1, 1), (2, 1, 1)],
    ),
    (
        "signpost",
        &[(0, 0, 0), (1, 0, 0), (2, 0, 0), (1, 1, 0), (1, 0, 1)],
    ),
    (
        "ducktail",
        &[(0, 0, 0), (1, 0, 0), (1, 1, 0), (2, 1, 0), (1, 0, 1)],
    ),
    (
        "plane",
        &[(0, 0, 0), (0, 1, 0), (1, 1, 0), (2, 1, 0), (1, 2, 0)],
    ),
    (
        "bridge",
        &[(0, 0, 0), (1, 0, 0), (2, 0, 0), (0, 1, 0), (2, 1, 0)],
    ),
    (
        "staircase",
        &[(0, 0, 0), (1, 0, 0), (1, 1, 0), (2, 1, 0), (2, 2, 0)],
    ),
    (
        "spikey-zag",
        &[(0, 0, 1), (0, 1, 0), (0, 1, 1), (1, 1, 0), (1, 2, 0)],
    ),
    (
        "middle-zig",
        &[(0, 0, 0), (0, 1, 0), (0, 1, 1), (1, 1, 0), (1, 2, 0)],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soma_catalog_shape() {
        let catalog = Catalog::soma();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.total_cells(), 27);
        // six tetracubes and one tricube
        assert_eq!(catalog.size_gcd(), 1);
        assert_eq!(catalog.min_piece_size(), 3);
    }

    #[test]
    fn bedlam_catalog_shape() {
        let catalog = Catalog::bedlam();
        assert_eq!(catalog.len(), 13);
        assert_eq!(catalog.total_cells(), 64);
    }

    #[test]
    fn uniform_piece_sizes_give_their_gcd() {
        let catalog = Catalog::new(vec![
            PieceDef::new("bar", vec![(0, 0, 0), (1, 0, 0), (2, 0, 0), (3, 0, 0)]),
            PieceDef::new("square", vec![(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)]),
        ]);
        assert_eq!(catalog.size_gcd(), 4);
    }

    #[test]
    fn copies_multiply_total_cells() {
        let catalog = Catalog::new(vec![
            PieceDef::new("domino", vec![(0, 0, 0), (1, 0, 0)]).with_copies(3)
        ]);
        assert_eq!(catalog.total_cells(), 6);
    }

    #[test]
    fn straight_bar_imbalance() {
        // A 1x1x3 bar always covers two cells of one color and one of the
        // other, in every orientation.
        let catalog = Catalog::new(vec![PieceDef::new(
            "bar3",
            vec![(0, 0, 0), (1, 0, 0), (2, 0, 0)],
        )]);
        assert_eq!(catalog.piece(0).max_color_imbalance, 1);
    }

    #[test]
    fn l_tetracube_is_balanced() {
        let catalog = Catalog::new(vec![PieceDef::new(
            "s",
            vec![(0, 0, 0), (1, 0, 0), (1, 1, 0), (2, 1, 0)],
        )]);
        assert_eq!(catalog.piece(0).max_color_imbalance, 0);
    }
}

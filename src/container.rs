//! Container model: the fixed set of lattice cells to be exactly covered.
//!
//! Cells are stored sorted and deduplicated, addressed by dense `u16`
//! indices. Occupancy during search is tracked with [`CellSet`], a block
//! bitset over those indices, so collision checks stay a handful of AND/OR
//! word operations regardless of container shape.

use rustc_hash::FxHashMap;

use crate::geometry::Coord;

/// Sentinel index meaning "no such cell in the container".
pub const NO_CELL: u16 = u16::MAX;

/// The six face-adjacent lattice directions.
const DIRECTIONS: [Coord; 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// An immutable, deduplicated set of lattice cells defining the puzzle volume.
///
/// Created once at puzzle load and shared read-only across all search
/// workers. Adjacency and floor-contact information is precomputed here so
/// the pruning oracle and gravity filter never touch coordinate hash maps in
/// the hot loop.
#[derive(Debug, Clone)]
pub struct Container {
    /// Cells in ascending coordinate order; position is the cell's index.
    cells: Vec<Coord>,
    /// Coordinate lookup, inverse of `cells`.
    index: FxHashMap<Coord, u16>,
    /// Face-adjacent cell indices per cell; `NO_CELL` pads missing neighbors.
    neighbors: Vec<[u16; 6]>,
    /// Index of the cell directly beneath (z - 1), or `NO_CELL` if the
    /// position below is outside the container (i.e. this cell rests on the
    /// floor).
    below: Vec<u16>,
}

impl Container {
    /// Builds a container from an arbitrary collection of cells.
    ///
    /// Duplicates are discarded. Containers are limited to `u16::MAX - 1`
    /// cells so indices fit the dense bitset representation.
    pub fn new(cells: impl IntoIterator<Item = Coord>) -> Self {
        let mut cells: Vec<Coord> = cells.into_iter().collect();
        cells.sort_unstable();
        cells.dedup();
        assert!(
            cells.len() < NO_CELL as usize,
            "container exceeds {} cells",
            NO_CELL
        );

        let index: FxHashMap<Coord, u16> = cells
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u16))
            .collect();

        let neighbors = cells
            .iter()
            .map(|&(x, y, z)| {
                let mut adjacent = [NO_CELL; 6];
                for (slot, &(dx, dy, dz)) in adjacent.iter_mut().zip(&DIRECTIONS) {
                    if let Some(&i) = index.get(&(x + dx, y + dy, z + dz)) {
                        *slot = i;
                    }
                }
                adjacent
            })
            .collect();

        let below = cells
            .iter()
            .map(|&(x, y, z)| index.get(&(x, y, z - 1)).copied().unwrap_or(NO_CELL))
            .collect();

        Self {
            cells,
            index,
            neighbors,
            below,
        }
    }

    /// Builds a solid axis-aligned box container with the given dimensions.
    pub fn cuboid(dim_x: usize, dim_y: usize, dim_z: usize) -> Self {
        let mut cells = Vec::with_capacity(dim_x * dim_y * dim_z);
        for x in 0..dim_x as i32 {
            for y in 0..dim_y as i32 {
                for z in 0..dim_z as i32 {
                    cells.push((x, y, z));
                }
            }
        }
        Self::new(cells)
    }

    /// Number of cells in the container.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells in ascending coordinate order.
    pub fn cells(&self) -> &[Coord] {
        &self.cells
    }

    /// The coordinate of the cell at `index`.
    #[inline]
    pub fn cell(&self, index: u16) -> Coord {
        self.cells[index as usize]
    }

    /// The index of `coord`, if it lies in the container.
    #[inline]
    pub fn index_of(&self, coord: Coord) -> Option<u16> {
        self.index.get(&coord).copied()
    }

    #[inline]
    pub fn contains(&self, coord: Coord) -> bool {
        self.index.contains_key(&coord)
    }

    /// Face-adjacent cell indices of `index` that lie in the container.
    #[inline]
    pub fn neighbors(&self, index: u16) -> impl Iterator<Item = u16> + '_ {
        self.neighbors[index as usize]
            .iter()
            .copied()
            .filter(|&n| n != NO_CELL)
    }

    /// The cell directly beneath `index`, if the container has one there.
    #[inline]
    pub fn below(&self, index: u16) -> Option<u16> {
        match self.below[index as usize] {
            NO_CELL => None,
            i => Some(i),
        }
    }

    /// Whether the cell at `index` rests on the container floor (no
    /// container cell directly beneath it).
    #[inline]
    pub fn rests_on_floor(&self, index: u16) -> bool {
        self.below[index as usize] == NO_CELL
    }

    /// Checkerboard color of the cell at `index` (x + y + z parity).
    #[inline]
    pub fn color(&self, index: u16) -> bool {
        let (x, y, z) = self.cells[index as usize];
        (x + y + z) & 1 == 1
    }

    /// A bitset with every container cell set.
    pub fn full_set(&self) -> CellSet {
        CellSet::full(self.cells.len())
    }

    /// A bitset with no cells set, sized for this container.
    pub fn empty_set(&self) -> CellSet {
        CellSet::empty(self.cells.len())
    }
}

/// A fixed-capacity bitset over container cell indices.
///
/// Bit `i` corresponds to the container cell with index `i`. All sets
/// derived from the same container have the same word count, so the binary
/// operations below never need bounds reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellSet {
    words: Vec<u64>,
}

impl CellSet {
    /// An empty set with capacity for `len` cells.
    pub fn empty(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// A set with bits `0..len` all set.
    pub fn full(len: usize) -> Self {
        let mut set = Self::empty(len);
        for (i, word) in set.words.iter_mut().enumerate() {
            let bits_before = i * 64;
            let bits_here = (len - bits_before).min(64);
            *word = if bits_here == 64 {
                u64::MAX
            } else {
                (1u64 << bits_here) - 1
            };
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, index: u16) {
        self.words[index as usize / 64] |= 1 << (index % 64);
    }

    #[inline]
    pub fn remove(&mut self, index: u16) {
        self.words[index as usize / 64] &= !(1 << (index % 64));
    }

    #[inline]
    pub fn contains(&self, index: u16) -> bool {
        self.words[index as usize / 64] & (1 << (index % 64)) != 0
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// True if the two sets share no cells.
    #[inline]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & b == 0)
    }

    /// True if every cell of `other` is also in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & b == *b)
    }

    /// Adds every cell of `other` to `self`.
    #[inline]
    pub fn union_with(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Removes every cell of `other` from `self`.
    #[inline]
    pub fn subtract(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    /// The lowest set index, if any.
    pub fn first(&self) -> Option<u16> {
        for (i, &word) in self.words.iter().enumerate() {
            if word != 0 {
                return Some((i * 64 + word.trailing_zeros() as usize) as u16);
            }
        }
        None
    }

    /// Iterates over set indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros();
                remaining &= remaining - 1;
                Some((i * 64 + bit as usize) as u16)
            })
        })
    }
}

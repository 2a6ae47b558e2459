//! Lattice coordinates and the cube rotation group.
//!
//! A cube has 24 rotational orientations: 6 choices of which face points up,
//! times 4 rotations around the vertical axis. Piece catalogs are built by
//! applying all 24 rotations to a base shape and deduplicating.

/// A lattice cell or relative offset.
pub type Coord = (i32, i32, i32);

/// All 24 rotation functions for a cube.
///
/// - Rotations 0-3: +Z face up
/// - Rotations 4-7: +Y face up
/// - Rotations 8-11: -Z face up
/// - Rotations 12-15: -Y face up
/// - Rotations 16-19: +X face up
/// - Rotations 20-23: -X face up
pub const ROTATIONS: [fn(Coord) -> Coord; 24] = [
    // +Z face up (identity orientation), rotate around Z axis
    |(x, y, z)| (x, y, z),
    |(x, y, z)| (-y, x, z),
    |(x, y, z)| (-x, -y, z),
    |(x, y, z)| (y, -x, z),
    // +Y face up, rotate around Y axis
    |(x, y, z)| (x, -z, y),
    |(x, y, z)| (z, x, y),
    |(x, y, z)| (-x, z, y),
    |(x, y, z)| (-z, -x, y),
    // -Z face up, rotate around Z axis
    |(x, y, z)| (x, -y, -z),
    |(x, y, z)| (y, x, -z),
    |(x, y, z)| (-x, y, -z),
    |(x, y, z)| (-y, -x, -z),
    // -Y face up, rotate around Y axis
    |(x, y, z)| (x, z, -y),
    |(x, y, z)| (-z, x, -y),
    |(x, y, z)| (-x, -z, -y),
    |(x, y, z)| (z, -x, -y),
    // +X face up, rotate around X axis
    |(x, y, z)| (z, y, -x),
    |(x, y, z)| (-y, z, -x),
    |(x, y, z)| (-z, -y, -x),
    |(x, y, z)| (y, -z, -x),
    // -X face up, rotate around X axis
    |(x, y, z)| (-z, y, x),
    |(x, y, z)| (-y, -z, x),
    |(x, y, z)| (z, -y, x),
    |(x, y, z)| (y, z, x),
];

/// Generates all unique orientations of a piece shape.
///
/// Applies all 24 rotations, normalizes each result so the minimum
/// coordinates sit at the origin, sorts the cells within each orientation,
/// then removes duplicates. Symmetric pieces yield fewer than 24.
pub fn all_orientations(shape: &[Coord]) -> Vec<Vec<Coord>> {
    let mut orientations: Vec<Vec<Coord>> = ROTATIONS
        .iter()
        .map(|rotate| {
            let rotated: Vec<Coord> = shape.iter().map(|&c| rotate(c)).collect();
            normalize_to_origin(rotated)
        })
        .collect();

    orientations.sort();
    orientations.dedup();
    orientations
}

/// Translates cells so the minimum x, y, z values are all zero, and sorts.
///
/// Two orientations that differ only by translation (or cell order) become
/// identical after normalization.
fn normalize_to_origin(mut cells: Vec<Coord>) -> Vec<Coord> {
    let min_x = cells.iter().map(|(x, _, _)| *x).min().unwrap();
    let min_y = cells.iter().map(|(_, y, _)| *y).min().unwrap();
    let min_z = cells.iter().map(|(_, _, z)| *z).min().unwrap();

    for (x, y, z) in &mut cells {
        *x -= min_x;
        *y -= min_y;
        *z -= min_z;
    }

    cells.sort_unstable();
    cells
}

/// Translates an offset by an anchor vector.
#[inline]
pub fn translate(offset: Coord, anchor: Coord) -> Coord {
    (offset.0 + anchor.0, offset.1 + anchor.1, offset.2 + anchor.2)
}

//! Polycube Packing Solver Library
//!
//! Packs a catalog of polycube pieces into an arbitrary lattice container
//! by backtracking search, with a pruning oracle, restart strategies, an
//! exact-cover tail solver for small residuals, and sequential, parallel,
//! and massively parallel dispatch modes.

pub mod container;
pub mod dispatch;
pub mod engine;
pub mod geometry;
pub mod moves;
pub mod ordering;
pub mod pieces;
pub mod pruning;
pub mod settings;
pub mod state;
pub mod tail;

pub use container::{CellSet, Container};
pub use dispatch::solve;
pub use engine::{Engine, SolutionRecord, Statistics, Status};
pub use moves::{format_packing, MoveTable, Placement, PlacementId};
pub use ordering::{CellOrdering, ShuffleStrategy};
pub use pieces::{Catalog, PieceDef};
pub use pruning::{PruneCause, PruneFlags};
pub use settings::{DispatchMode, SolverSettings, TailSettings};
pub use state::SearchState;

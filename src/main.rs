//! Polycube Packing Solver
//!
//! Packs the pieces of a chosen catalog into a box-shaped container and
//! prints each packing as side-by-side z-slices. The search strategy,
//! pruning, randomization, and dispatch mode are all selectable from the
//! command line.

use std::time::Instant;

use clap::{Parser, ValueEnum};

use polypack::{
    solve, Catalog, CellOrdering, Container, DispatchMode, PruneFlags, ShuffleStrategy,
    SolverSettings, Status, TailSettings,
};

/// Packs polycube pieces into a lattice container.
#[derive(Parser)]
#[command(name = "polypack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Piece catalog to pack.
    #[arg(value_enum, default_value = "soma")]
    puzzle: Puzzle,

    /// Container dimensions; defaults to the catalog's usual cube.
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
    dims: Option<Vec<usize>>,

    /// Stop after this many solutions (0 = all).
    #[arg(long, default_value_t = 1)]
    max_solutions: usize,

    /// Wall-clock budget in milliseconds (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,

    /// Cell selection heuristic.
    #[arg(long, value_enum, default_value = "most-constrained")]
    ordering: OrderingArg,

    /// Piece-order shuffle / restart strategy.
    #[arg(long, value_enum, default_value = "none")]
    shuffle: ShuffleArg,

    /// Restart interval: nodes for --shuffle restart-nodes, milliseconds
    /// for --shuffle restart-time.
    #[arg(long, default_value_t = 100_000)]
    restart_interval: u64,

    /// Break cell-ordering ties at random instead of by index.
    #[arg(long)]
    randomize_ties: bool,

    /// Seed for all randomized behavior.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Enable the checkerboard parity prune.
    #[arg(long)]
    parity: bool,

    /// Disable all pruning.
    #[arg(long)]
    no_pruning: bool,

    /// Disable the exact-cover tail solver.
    #[arg(long)]
    no_tail: bool,

    /// Memoize visited states (suppresses duplicate subtrees).
    #[arg(long)]
    transposition: bool,

    /// Require placements to rest on the floor or on covered cells.
    #[arg(long)]
    gravity: bool,

    /// Run this many racing workers (1 = sequential).
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Use the massively parallel prefix dispatcher.
    #[arg(long)]
    massive: bool,

    /// Prefix depth for --massive.
    #[arg(long, default_value_t = 2)]
    prefix_depth: usize,

    /// Per-unit step budget for --massive.
    #[arg(long, default_value_t = 100_000)]
    unit_budget: u64,

    /// Progress report cadence in milliseconds (0 = silent).
    #[arg(long, default_value_t = 500)]
    status_interval_ms: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Puzzle {
    /// Seven Soma pieces in a 3x3x3 cube.
    Soma,
    /// Thirteen Bedlam pieces in a 4x4x4 cube.
    Bedlam,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderingArg {
    MostConstrained,
    Naive,
    PieceScarcity,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShuffleArg {
    None,
    Initial,
    RestartNodes,
    RestartTime,
    Adaptive,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let catalog = match cli.puzzle {
        Puzzle::Soma => Catalog::soma(),
        Puzzle::Bedlam => Catalog::bedlam(),
    };
    let (dx, dy, dz) = match cli.dims.as_deref() {
        Some([x, y, z]) => (*x, *y, *z),
        _ => match cli.puzzle {
            Puzzle::Soma => (3, 3, 3),
            Puzzle::Bedlam => (4, 4, 4),
        },
    };
    let container = Container::cuboid(dx, dy, dz);

    if container.len() != catalog.total_cells() {
        eprintln!(
            "container has {} cells but the catalog covers {}",
            container.len(),
            catalog.total_cells()
        );
        std::process::exit(1);
    }

    let settings = SolverSettings {
        max_solutions: cli.max_solutions,
        timeout_ms: cli.timeout_ms,
        ordering: match cli.ordering {
            OrderingArg::MostConstrained => CellOrdering::MostConstrained,
            OrderingArg::Naive => CellOrdering::Naive,
            OrderingArg::PieceScarcity => CellOrdering::PieceScarcity,
        },
        pruning: if cli.no_pruning {
            PruneFlags::none()
        } else {
            PruneFlags {
                parity: cli.parity,
                ..Default::default()
            }
        },
        randomize_ties: cli.randomize_ties,
        seed: cli.seed,
        shuffle: match cli.shuffle {
            ShuffleArg::None => ShuffleStrategy::None,
            ShuffleArg::Initial => ShuffleStrategy::Initial,
            ShuffleArg::RestartNodes => ShuffleStrategy::PeriodicRestart {
                interval_nodes: cli.restart_interval,
            },
            ShuffleArg::RestartTime => ShuffleStrategy::PeriodicRestartTime {
                interval_ms: cli.restart_interval,
            },
            ShuffleArg::Adaptive => ShuffleStrategy::Adaptive {
                depth_threshold: 4,
                max_reshuffles: 8,
            },
        },
        tail: TailSettings {
            enable: !cli.no_tail,
            ..Default::default()
        },
        transposition_table: cli.transposition,
        gravity: cli.gravity,
        status_interval_ms: cli.status_interval_ms,
        dispatch: if cli.massive {
            DispatchMode::Massive {
                prefix_depth: cli.prefix_depth,
                unit_budget: cli.unit_budget,
            }
        } else if cli.workers > 1 {
            DispatchMode::Parallel {
                workers: cli.workers,
            }
        } else {
            DispatchMode::Sequential
        },
    };

    let start = Instant::now();
    let mut count = 0usize;
    let status = solve(
        &container,
        &catalog,
        &settings,
        |nodes, elapsed_ms| {
            eprintln!("... {nodes} nodes explored after {elapsed_ms}ms");
        },
        |record| {
            count += 1;
            println!("Solution {count}:");
            println!("{}", record.render(&container));
            true
        },
    );

    let elapsed = start.elapsed();
    match status {
        Status::SolutionFound(n) => println!("Found {n} solutions in {elapsed:.2?}"),
        Status::Exhausted => println!("No solutions; search space exhausted in {elapsed:.2?}"),
        Status::TimedOut => println!("Timed out after {elapsed:.2?} without a solution"),
        Status::Cancelled => println!("Cancelled after {elapsed:.2?}"),
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use polypack::{solve, Catalog, Container, PieceDef, SolverSettings};

    #[test]
    fn test_cli_definition_is_consistent() {
        super::Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_dims() {
        let cli =
            super::Cli::try_parse_from(["polypack", "soma", "--dims", "9", "3", "1"]).unwrap();
        assert_eq!(cli.dims, Some(vec![9usize, 3, 1]));
    }

    #[test]
    fn test_render_snapshot() {
        // One 2x2 block fills a 1x2x2 container; the rendering is fully
        // deterministic.
        let container = Container::cuboid(1, 2, 2);
        let catalog = Catalog::new(vec![PieceDef::new(
            "block",
            vec![(0, 0, 0), (0, 1, 0), (0, 0, 1), (0, 1, 1)],
        )]);
        let settings = SolverSettings::default();

        let mut output = String::new();
        let status = solve(&container, &catalog, &settings, |_, _| {}, |record| {
            output = record.render(&container);
            true
        });
        assert_eq!(status, polypack::Status::SolutionFound(1));
        insta::assert_snapshot!(output, @r"
        z=0  z=1
        1  1
        1  1
        ");
    }

    #[test]
    fn test_soma_cube_solves() {
        let container = Container::cuboid(3, 3, 3);
        let catalog = Catalog::soma();
        let settings = SolverSettings::default();
        let mut placements = 0;
        let status = solve(&container, &catalog, &settings, |_, _| {}, |record| {
            placements = record.placements.len();
            true
        });
        assert_eq!(status, polypack::Status::SolutionFound(1));
        assert_eq!(placements, 7);
    }
}

//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `error`, `progress`: shared error type and cancellation/progress hooks.
//! - `bitset`, `split`: taxon sets, splits and split systems.
//! - `graph`: arena graph with per-node edge rotations.
//! - `circular`: O(n²) operators between circular split weights and distances.
//! - `alphabet`, `model`, `compare`, `distance`: pairwise sequence comparison
//!   and maximum-likelihood distances.
//! - `filter`: greedy and dimension-bounded split filters.
//! - `equal_angle`: planar layout of circular split networks.
//! - `median_joining`: median-joining haplotype networks.
//! - `snapshot`: split systems from `phylotree` trees.
//! - `io`: FASTA/Newick/NEXUS input and TSV output.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod alphabet;
pub mod bitset;
pub mod circular;
pub mod compare;
pub mod distance;
pub mod equal_angle;
pub mod error;
pub mod filter;
pub mod graph;
pub mod io;
pub mod median_joining;
pub mod model;
pub mod progress;
pub mod snapshot;
pub mod split;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use equal_angle::{EqualAngle, EqualAngleResult};
pub use error::{Result, SplitNetError};
pub use median_joining::{MedianJoining, MedianJoiningNetwork};
pub use progress::{CancelToken, NoProgress, ProgressListener};
pub use snapshot::TreeSnapshot;
pub use split::{Split, SplitSystem};

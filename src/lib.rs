#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate discovers the minimal functional dependencies of a relational
//! table: every statement "the values of columns X determine the value of
//! column A" that holds on the data and has no smaller X that also holds.
//!
//! It implements the hybrid row/column strategy described by this paper:
//!
//! - Papenbrock, Naumann, [A Hybrid Approach to Functional Dependency
//!   Discovery][hyfd], 2016
//!
//! [hyfd]: https://dl.acm.org/doi/10.1145/2882903.2915203
//!
//! Where the paper leaves details open, such as window scheduling or the
//! threshold decay policy, this crate follows the behavior of the publicly
//! available implementations, Metanome's HyFD and Desbordante.
//!
//! The two phases cooperate through shared candidate state: a [`Sampler`]
//! compares rows that already share values and produces *agree-sets*
//! (evidence against families of candidates), the inductor folds that
//! evidence into the [`FdTree`] of surviving candidates, and a [`Validator`]
//! checks the tree level by level against the column indexes, handing
//! violating row pairs back to the sampler. The loop ends when validation
//! runs out of candidates to refute.
//!
//! ```
//! use fundep::{discover, Relation};
//!
//! let relation = Relation::from_rows(
//!     vec!["a", "b", "c"],
//!     &[
//!         &["1", "1", "10"],
//!         &["1", "1", "20"],
//!         &["2", "2", "10"],
//!         &["2", "2", "20"],
//!         &["3", "1", "10"],
//!     ],
//! );
//!
//! let fds = discover(&relation, true, 1).unwrap();
//! // Column a determines column b, and nothing else holds.
//! assert_eq!(fds.len(), 1);
//! assert_eq!(fds[0].lhs.iter().collect::<Vec<_>>(), vec![0]);
//! assert_eq!(fds[0].rhs, 1);
//! ```

mod agree_sets;
mod bitset;
mod inductor;
mod pli;
mod relation;
mod sampler;
mod tree;
mod validator;

pub use crate::agree_sets::{AllColumnCombinations, ColumnCombinationList};
pub use crate::bitset::{AttributeSet, Bits};
pub use crate::inductor::update_fd_tree;
pub use crate::pli::{Cluster, ClusterId, PositionListIndex, NULL_VALUE, SINGLETON};
pub use crate::relation::{CompressedRecords, Relation};
pub use crate::sampler::Sampler;
pub use crate::tree::{FdTree, VertexId};
pub use crate::validator::Validator;

use thiserror::Error as ThisError;
use tracing::debug;

/// A pair of row indices known to violate some candidate, handed from the
/// validator back to the sampler for comparison.
pub type IdPair = (u32, u32);

/// One minimal functional dependency: the columns of `lhs` determine the
/// column `rhs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd {
    /// The determining column set.
    pub lhs: AttributeSet,
    /// The determined column.
    pub rhs: usize,
}

/// Errors reported before discovery starts.
///
/// Anything that goes wrong *during* discovery is a programming error and
/// panics; convergence is signaled through empty results, never through an
/// error.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The relation has no columns.
    #[error("relation has no columns; dependency discovery is meaningless")]
    NoColumns,
    /// The relation has no rows. A zero-row table satisfies every dependency
    /// vacuously, which is never what a caller wants, so it is rejected
    /// rather than answered with an empty set.
    #[error("relation has no rows; dependency discovery is meaningless")]
    NoRows,
    /// The worker thread pool could not be created.
    #[error("failed to build the worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Tuning knobs for one discovery run.
///
/// The thresholds govern when each phase yields to the other; their defaults
/// match the values the hybrid strategy was tuned with, and the exact
/// boundary behavior is deliberately implementation-defined.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether two null cells are considered equal. Applied when the column
    /// indexes are built.
    pub equal_nulls: bool,
    /// Worker thread count; `1` runs every phase sequentially.
    pub threads: usize,
    /// Sampling efficiency below which the sampler first yields to
    /// validation.
    pub initial_efficiency_threshold: f64,
    /// Factor applied to the best current efficiency when the sampler lowers
    /// its threshold on later rounds.
    pub efficiency_decay: f64,
    /// Refuted-per-confirmed ratio above which a validation round ends early
    /// to gather more row-pair evidence.
    pub validation_cutoff: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            equal_nulls: true,
            threads: 1,
            initial_efficiency_threshold: 0.01,
            efficiency_decay: 0.9,
            validation_cutoff: 0.01,
        }
    }
}

/// Discovers all minimal functional dependencies of `relation`.
///
/// `equal_nulls` picks the null semantics and `threads` the worker count;
/// everything else uses the default [`Config`]. The result is deduplicated
/// but in no particular order.
pub fn discover(relation: &Relation, equal_nulls: bool, threads: usize) -> Result<Vec<Fd>, Error> {
    discover_with(
        relation,
        &Config {
            equal_nulls,
            threads,
            ..Config::default()
        },
    )
}

/// Discovers all minimal functional dependencies with explicit tuning.
pub fn discover_with(relation: &Relation, config: &Config) -> Result<Vec<Fd>, Error> {
    if relation.num_attributes() == 0 {
        return Err(Error::NoColumns);
    }
    if relation.num_rows() == 0 {
        return Err(Error::NoRows);
    }

    let attributes = relation.num_attributes();
    let mut plis = relation.build_plis(config.equal_nulls);
    let records = CompressedRecords::from_plis(&plis, relation.num_rows());

    let pool = if config.threads > 1 {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build()?,
        )
    } else {
        None
    };

    let mut tree = FdTree::new(attributes);
    let mut sampler = Sampler::new(
        attributes,
        config.initial_efficiency_threshold,
        config.efficiency_decay,
    );
    let mut validator = Validator::new(config.validation_cutoff);
    let mut suggestions: Vec<IdPair> = Vec::new();

    loop {
        let non_fds = sampler.sample(&mut plis, &records, &suggestions, pool.as_ref());
        update_fd_tree(&mut tree, &non_fds);
        suggestions = validator.validate(&mut tree, &plis, &records, pool.as_ref());
        if suggestions.is_empty() {
            break;
        }
    }

    let fds = tree.fill_fds();
    debug!(fds = fds.len(), "discovery complete");
    Ok(fds)
}

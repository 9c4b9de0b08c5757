//! Breadth-first candidate validation.
//!
//! The validator walks the candidate tree level by level and checks each
//! surviving candidate against the column indexes. Refuted candidates are
//! specialized in place (their one-attribute extensions become next-level
//! candidates), and every refutation at level two or higher yields a concrete
//! violating row pair that is handed back to the sampler as a comparison
//! suggestion. Validation stops early once refutations dominate, since at
//! that point another sampling round is cheaper than grinding on.

use crate::bitset::AttributeSet;
use crate::pli::{ClusterId, PositionListIndex, SINGLETON};
use crate::relation::CompressedRecords;
use crate::tree::{FdTree, VertexId, ROOT};
use crate::IdPair;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of checking one batch of vertices.
#[derive(Default)]
struct Validations {
    /// Refuted candidates: owning vertex, left-hand side, right-hand side.
    invalid: Vec<(VertexId, AttributeSet, usize)>,
    suggestions: Vec<IdPair>,
    validations: usize,
}

impl Validations {
    fn merge(mut self, other: Validations) -> Validations {
        self.invalid.extend(other.invalid);
        self.suggestions.extend(other.suggestions);
        self.validations += other.validations;
        self
    }
}

/// Confirms or refutes candidates level by level.
///
/// The level cursor survives across calls: each call resumes where the
/// previous one left off and returns either comparison suggestions for the
/// sampler (more evidence needed) or an empty list (convergence).
pub struct Validator {
    current_level: usize,
    cutoff: f64,
}

impl Validator {
    /// Creates a validator.
    ///
    /// `cutoff` is the refuted-per-confirmed ratio above which a level ends
    /// the round, provided the refutation count is no longer falling.
    pub fn new(cutoff: f64) -> Self {
        Validator {
            current_level: 0,
            cutoff,
        }
    }

    /// Validates levels until the cutoff trips or candidates run out.
    pub fn validate(
        &mut self,
        tree: &mut FdTree,
        plis: &[PositionListIndex],
        records: &CompressedRecords,
        pool: Option<&ThreadPool>,
    ) -> Vec<IdPair> {
        let attributes = tree.num_attributes();
        let mut level_vertices = if self.current_level == 0 {
            vec![(ROOT, AttributeSet::empty(attributes))]
        } else {
            tree.get_level(self.current_level)
        };

        let mut previous_invalid = 0;
        let mut suggestions: Vec<IdPair> = Vec::new();

        while !level_vertices.is_empty() {
            let level = self.current_level;
            let result = match pool {
                Some(pool) => pool.install(|| {
                    let shared: &FdTree = tree;
                    level_vertices
                        .par_iter()
                        .map(|pair| check_vertex(level, shared, plis, records, pair))
                        .collect::<Vec<_>>()
                        .into_iter()
                        .fold(Validations::default(), Validations::merge)
                }),
                None => level_vertices
                    .iter()
                    .map(|pair| check_vertex(level, tree, plis, records, pair))
                    .fold(Validations::default(), Validations::merge),
            };

            // The tasks above only read the tree; refutations are applied
            // here, before children are collected and candidates extended.
            for &(vertex, _, rhs) in &result.invalid {
                tree.remove_fd(vertex, rhs);
            }
            suggestions.extend(result.suggestions.iter().copied());

            if self.current_level >= attributes {
                break;
            }

            let mut next_level = collect_children(tree, &level_vertices);
            let candidates = extend_from_invalid(tree, &mut next_level, &result.invalid);

            let invalid = result.invalid.len();
            let valid = result.validations - invalid;
            debug!(
                level = self.current_level,
                vertices = level_vertices.len(),
                validations = result.validations,
                invalid,
                candidates,
                "validated level"
            );

            level_vertices = next_level;
            self.current_level += 1;

            // Refutations dominating is only a reason to stop if there is
            // new evidence to hand to the sampler; an empty return means
            // convergence, and levels 0 and 1 never produce witnesses.
            if invalid as f64 > self.cutoff * valid as f64
                && previous_invalid < invalid
                && !suggestions.is_empty()
            {
                return suggestions;
            }
            previous_invalid = invalid;
        }

        Vec::new()
    }
}

fn check_vertex(
    level: usize,
    tree: &FdTree,
    plis: &[PositionListIndex],
    records: &CompressedRecords,
    pair: &(VertexId, AttributeSet),
) -> Validations {
    match level {
        0 => check_empty_lhs(tree, plis, pair),
        1 => check_single_lhs(tree, plis, records, pair),
        _ => check_wider_lhs(tree, plis, records, pair),
    }
}

/// The empty set determines exactly the constant columns.
fn check_empty_lhs(
    tree: &FdTree,
    plis: &[PositionListIndex],
    (vertex, lhs): &(VertexId, AttributeSet),
) -> Validations {
    let mut result = Validations::default();
    for rhs in tree.fds_of(*vertex).iter() {
        result.validations += 1;
        if !plis[rhs].is_constant() {
            result.invalid.push((*vertex, lhs.clone(), rhs));
        }
    }
    result
}

/// A single column determines `rhs` iff every one of its clusters is
/// homogeneous (and not unique) in the `rhs` column.
fn check_single_lhs(
    tree: &FdTree,
    plis: &[PositionListIndex],
    records: &CompressedRecords,
    (vertex, lhs): &(VertexId, AttributeSet),
) -> Validations {
    let lhs_attribute = match lhs.first() {
        Some(attribute) => attribute,
        None => return Validations::default(),
    };

    let mut result = Validations::default();
    for rhs in tree.fds_of(*vertex).iter() {
        result.validations += 1;
        for cluster in plis[lhs_attribute].clusters() {
            let value = records.get(cluster[0], rhs);
            if value == SINGLETON
                || cluster[1..].iter().any(|&row| records.get(row, rhs) != value)
            {
                result.invalid.push((*vertex, lhs.clone(), rhs));
                break;
            }
        }
    }
    result
}

/// Wider candidates are checked by stripping the first attribute, walking its
/// clusters, and grouping rows by the cluster identity of the remaining
/// attributes; rows with the same identity must agree on every candidate
/// right-hand side.
fn check_wider_lhs(
    tree: &FdTree,
    plis: &[PositionListIndex],
    records: &CompressedRecords,
    (vertex, lhs): &(VertexId, AttributeSet),
) -> Validations {
    let rhs_set = tree.fds_of(*vertex).clone();
    if rhs_set.is_empty() {
        return Validations::default();
    }

    let mut result = Validations::default();
    result.validations = rhs_set.count();

    let first_attribute = lhs.first().expect("vertex at level >= 2 has a path");
    let mut rest = lhs.clone();
    rest.clear(first_attribute);

    let valid = refine(
        plis,
        records,
        &rest,
        &rhs_set,
        first_attribute,
        &mut result.suggestions,
    );

    for rhs in rhs_set.iter() {
        if !valid.test(rhs) {
            result.invalid.push((*vertex, lhs.clone(), rhs));
        }
    }
    result
}

/// Checks all candidate right-hand sides of one left-hand side at once,
/// returning the surviving ones and emitting a violating row pair for each
/// refutation.
fn refine(
    plis: &[PositionListIndex],
    records: &CompressedRecords,
    rest: &AttributeSet,
    rhs_set: &AttributeSet,
    first_attribute: usize,
    suggestions: &mut Vec<IdPair>,
) -> AttributeSet {
    let rest_ids: Vec<usize> = rest.iter().collect();
    let rhs_ids: Vec<usize> = rhs_set.iter().collect();
    let mut rank = vec![0; records.num_attributes()];
    for (index, &attribute) in rhs_ids.iter().enumerate() {
        rank[attribute] = index;
    }
    let mut valid = rhs_ids.clone();

    'clusters: for cluster in plis[first_attribute].clusters() {
        let mut groups: HashMap<Vec<ClusterId>, (Vec<ClusterId>, u32)> =
            HashMap::with_capacity(cluster.len());

        for &row in cluster {
            let key = match identity(records.row(row), &rest_ids) {
                Some(key) => key,
                // A unique value anywhere in the identity means no other row
                // can share this left-hand side.
                None => continue,
            };

            match groups.entry(key) {
                Entry::Occupied(entry) => {
                    let (witness_values, witness_row) = entry.get();
                    valid.retain(|&attribute| {
                        let value = records.get(row, attribute);
                        if value == SINGLETON || value != witness_values[rank[attribute]] {
                            suggestions.push((row, *witness_row));
                            false
                        } else {
                            true
                        }
                    });
                    if valid.is_empty() {
                        break 'clusters;
                    }
                }
                Entry::Vacant(entry) => {
                    let values = rhs_ids.iter().map(|&a| records.get(row, a)).collect();
                    entry.insert((values, row));
                }
            }
        }
    }

    let mut surviving = AttributeSet::empty(records.num_attributes());
    for attribute in valid {
        surviving.set(attribute);
    }
    surviving
}

/// The cluster ids of one row restricted to `attributes`, or `None` if any of
/// them is unique.
fn identity(row: &[ClusterId], attributes: &[usize]) -> Option<Vec<ClusterId>> {
    let mut key = Vec::with_capacity(attributes.len());
    for &attribute in attributes {
        let value = row[attribute];
        if value == SINGLETON {
            return None;
        }
        key.push(value);
    }
    Some(key)
}

fn collect_children(
    tree: &FdTree,
    level: &[(VertexId, AttributeSet)],
) -> Vec<(VertexId, AttributeSet)> {
    let mut next = Vec::new();
    for (vertex, lhs) in level {
        for attribute in 0..tree.num_attributes() {
            if let Some(child) = tree.child_at(*vertex, attribute) {
                next.push((child, lhs.with(attribute)));
            }
        }
    }
    next
}

/// Spawns the one-attribute extensions of every refuted candidate as
/// next-level candidates, skipping extensions that are non-minimal or
/// already known. Returns the number of new candidates.
fn extend_from_invalid(
    tree: &mut FdTree,
    next_level: &mut Vec<(VertexId, AttributeSet)>,
    invalid: &[(VertexId, AttributeSet, usize)],
) -> usize {
    let attributes = tree.num_attributes();
    let mut candidates = 0;

    for (_, lhs, rhs) in invalid {
        for attribute in 0..attributes {
            if lhs.test(attribute)
                || *rhs == attribute
                // If the extension attribute is itself determined by this
                // left-hand side, the extension cannot be minimal.
                || tree.find_fd_or_general(lhs, attribute)
                || tree
                    .child_at(ROOT, attribute)
                    .map_or(false, |child| tree.is_fd(child, *rhs))
            {
                continue;
            }

            let extended = lhs.with(attribute);
            if tree.find_fd_or_general(&extended, *rhs) {
                continue;
            }
            if let Some(vertex) = tree.add_fd(&extended, *rhs) {
                next_level.push((vertex, extended));
                candidates += 1;
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Relation;

    fn setup(rows: &[&[&str]]) -> (Vec<PositionListIndex>, CompressedRecords, usize) {
        let names: Vec<String> = (0..rows[0].len()).map(|i| format!("c{}", i)).collect();
        let relation = Relation::from_rows(names, rows);
        let plis = relation.build_plis(true);
        let records = CompressedRecords::from_plis(&plis, relation.num_rows());
        (plis, records, relation.num_attributes())
    }

    #[test]
    fn constant_column_survives_level_zero() {
        let (plis, records, n) = setup(&[&["1", "x"], &["2", "x"], &["3", "x"]]);
        let mut tree = FdTree::new(n);
        let mut validator = Validator::new(0.01);
        let suggestions = validator.validate(&mut tree, &plis, &records, None);

        assert!(suggestions.is_empty());
        let fds = tree.fill_fds();
        // Column 1 is constant: {} -> 1 holds. Column 0 is a key, so every
        // single remaining candidate for it was refuted and specialized away.
        assert!(fds
            .iter()
            .any(|fd| fd.rhs == 1 && fd.lhs.is_empty()));
        assert!(fds.iter().all(|fd| fd.rhs != 0 || !fd.lhs.is_empty()));
    }

    #[test]
    fn wider_refutation_emits_suggestions() {
        // Columns 0 and 1 together do not determine 2 (rows 0/1 share both
        // but differ in 2), which only level-2 validation can notice.
        let (plis, records, n) = setup(&[
            &["a", "p", "1"],
            &["a", "p", "2"],
            &["b", "q", "3"],
            &["b", "r", "4"],
        ]);
        let mut tree = FdTree::new(n);
        // Pretend induction already narrowed candidates down to {0,1} -> 2.
        let empty = AttributeSet::empty(n);
        for rhs in 0..n {
            tree.remove(&empty, rhs);
        }
        let mut lhs = AttributeSet::empty(n);
        lhs.set(0);
        lhs.set(1);
        tree.add_fd(&lhs, 2);

        let mut validator = Validator::new(0.01);
        // Levels 0 and 1 have no candidates; the cursor advances to level 2
        // within the same call and refutes the pair.
        let suggestions = validator.validate(&mut tree, &plis, &records, None);
        assert!(!tree.contains_fd(&lhs, 2));
        assert!(suggestions.contains(&(1, 0)) || suggestions.contains(&(0, 1)));
    }
}

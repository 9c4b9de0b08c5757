//! Focused row sampling.
//!
//! Comparing every pair of rows is quadratic; the sampler instead compares
//! rows that already share a value (neighbors within PLI clusters), because
//! only such pairs can reveal interesting agree-sets. Each attribute keeps a
//! sliding window offset, and a priority queue ranks attributes by how many
//! previously unseen agree-sets their last comparisons produced per
//! comparison spent. Sampling stops once the best attribute's efficiency
//! falls under a decaying threshold, handing control back to validation.

use crate::agree_sets::{AllColumnCombinations, ColumnCombinationList};
use crate::bitset::AttributeSet;
use crate::pli::PositionListIndex;
use crate::relation::CompressedRecords;
use crate::IdPair;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use tracing::debug;

/// Adaptive sampling state for one attribute.
struct Efficiency {
    attribute: usize,
    window: u32,
    comparisons: usize,
    violations: usize,
}

impl Efficiency {
    fn new(attribute: usize) -> Self {
        Efficiency {
            attribute,
            window: 0,
            comparisons: 0,
            violations: 0,
        }
    }

    fn ratio(&self) -> f64 {
        if self.comparisons == 0 {
            0.0
        } else {
            self.violations as f64 / self.comparisons as f64
        }
    }
}

impl PartialEq for Efficiency {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Efficiency {}

impl PartialOrd for Efficiency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Efficiency {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties broken by attribute index to keep heap order deterministic.
        self.ratio()
            .total_cmp(&other.ratio())
            .then_with(|| other.attribute.cmp(&self.attribute))
    }
}

/// Produces agree-sets by comparing rows within PLI clusters.
///
/// One sampler instance lives for a whole discovery run; every call to
/// [`sample`](Sampler::sample) returns the agree-sets that are new since the
/// previous call, bucketed by size.
pub struct Sampler {
    attributes: usize,
    queue: BinaryHeap<Efficiency>,
    agree_sets: AllColumnCombinations,
    threshold: f64,
    initial_threshold: f64,
    decay: f64,
    seeded: bool,
}

impl Sampler {
    /// Creates a sampler over `attributes` columns.
    ///
    /// `initial_threshold` is the efficiency below which sampling yields to
    /// validation; `decay` scales the current best efficiency when lowering
    /// the threshold on later rounds.
    pub fn new(attributes: usize, initial_threshold: f64, decay: f64) -> Self {
        Sampler {
            attributes,
            queue: BinaryHeap::new(),
            agree_sets: AllColumnCombinations::new(attributes),
            threshold: initial_threshold,
            initial_threshold,
            decay,
            seeded: false,
        }
    }

    /// Runs one sampling round.
    ///
    /// Comparison suggestions from the validator are matched first,
    /// unconditionally. The first round sorts every PLI's clusters and seeds
    /// the efficiency queue (one pass per attribute, in parallel when a pool
    /// is given); later rounds lower the threshold and drain the queue while
    /// the best attribute stays efficient enough.
    pub fn sample(
        &mut self,
        plis: &mut [PositionListIndex],
        records: &CompressedRecords,
        suggestions: &[IdPair],
        pool: Option<&ThreadPool>,
    ) -> ColumnCombinationList {
        for &(first, second) in suggestions {
            let agreed = records.agree_set(first, second);
            debug_assert!(!agreed.is_empty());
            self.agree_sets.add(agreed);
        }

        if !self.seeded {
            self.seeded = true;
            if self.attributes >= 3 {
                sort_clusters(plis, records, pool);
            }
            self.seed_queue(plis, records, pool);
            if let Some(best) = self.queue.peek() {
                self.threshold = self.initial_threshold.min(best.ratio() / 2.0);
            }
        } else if let Some(best) = self.queue.peek() {
            self.threshold = (self.threshold / 2.0).min(best.ratio() * self.decay);
        }

        while let Some(best) = self.queue.peek() {
            if best.ratio() < self.threshold {
                break;
            }
            let mut efficiency = self.queue.pop().unwrap();
            let attribute = efficiency.attribute;
            let compared = self.run_window(&mut efficiency, &plis[attribute], records);
            // An attribute whose window outgrew all of its clusters is
            // exhausted and leaves the queue for good.
            if compared > 0 && efficiency.ratio() > 0.0 {
                self.queue.push(efficiency);
            }
        }

        let fresh = self.agree_sets.take_new();
        debug!(
            new_agree_sets = fresh.len(),
            total = self.agree_sets.count(),
            threshold = self.threshold,
            "sampling round complete"
        );
        fresh
    }

    /// Runs one window pass for one attribute against the shared store.
    /// Returns the number of comparisons performed.
    fn run_window(
        &mut self,
        efficiency: &mut Efficiency,
        pli: &PositionListIndex,
        records: &CompressedRecords,
    ) -> usize {
        efficiency.window += 1;
        let window = efficiency.window as usize;
        let known_before = self.agree_sets.count();
        let mut comparisons = 0;

        for cluster in pli.clusters() {
            if cluster.len() <= window {
                continue;
            }
            for i in 0..cluster.len() - window {
                let agreed = records.agree_set(cluster[i], cluster[i + window]);
                // Both rows share this attribute's cluster, so they agree at
                // least there.
                debug_assert!(!agreed.is_empty());
                self.agree_sets.add(agreed);
                comparisons += 1;
            }
        }

        efficiency.comparisons += comparisons;
        efficiency.violations += self.agree_sets.count() - known_before;
        comparisons
    }

    fn seed_queue(
        &mut self,
        plis: &[PositionListIndex],
        records: &CompressedRecords,
        pool: Option<&ThreadPool>,
    ) {
        match pool {
            None => {
                for attribute in 0..self.attributes {
                    let mut efficiency = Efficiency::new(attribute);
                    self.run_window(&mut efficiency, &plis[attribute], records);
                    if efficiency.ratio() > 0.0 {
                        self.queue.push(efficiency);
                    }
                }
            }
            Some(pool) => {
                let mut seeded: Vec<(Efficiency, Vec<AttributeSet>)> = pool.install(|| {
                    (0..self.attributes)
                        .into_par_iter()
                        .map(|attribute| {
                            let mut efficiency = Efficiency::new(attribute);
                            let matched =
                                run_window_local(&mut efficiency, &plis[attribute], records);
                            (efficiency, matched)
                        })
                        .collect()
                });

                // A set counts as a violation iff it was unknown before any
                // of this round's insertions, so count first, merge after.
                for (efficiency, matched) in seeded.iter_mut() {
                    let mut fresh: HashSet<&AttributeSet> = HashSet::new();
                    for agreed in matched.iter() {
                        if !self.agree_sets.contains(agreed) {
                            fresh.insert(agreed);
                        }
                    }
                    efficiency.violations += fresh.len();
                }
                for (efficiency, matched) in seeded {
                    for agreed in matched {
                        self.agree_sets.add(agreed);
                    }
                    if efficiency.ratio() > 0.0 {
                        self.queue.push(efficiency);
                    }
                }
            }
        }
    }
}

/// One window pass accumulating matches locally, for use inside parallel
/// seeding tasks. Violations are filled in by the merge step.
fn run_window_local(
    efficiency: &mut Efficiency,
    pli: &PositionListIndex,
    records: &CompressedRecords,
) -> Vec<AttributeSet> {
    efficiency.window += 1;
    let window = efficiency.window as usize;
    let mut matched = Vec::new();
    let mut comparisons = 0;

    for cluster in pli.clusters() {
        if cluster.len() <= window {
            continue;
        }
        for i in 0..cluster.len() - window {
            let agreed = records.agree_set(cluster[i], cluster[i + window]);
            debug_assert!(!agreed.is_empty());
            matched.push(agreed);
            comparisons += 1;
        }
    }

    efficiency.comparisons += comparisons;
    matched
}

/// Reorders rows within every cluster so that rows likely to agree on few
/// other attributes sit next to each other: each attribute sorts by its two
/// neighboring columns' cluster ids, a different key pair per attribute.
fn sort_clusters(
    plis: &mut [PositionListIndex],
    records: &CompressedRecords,
    pool: Option<&ThreadPool>,
) {
    let attributes = plis.len();
    match pool {
        None => {
            for (attribute, pli) in plis.iter_mut().enumerate() {
                sort_for_attribute(attribute, pli, records, attributes);
            }
        }
        Some(pool) => pool.install(|| {
            plis.par_iter_mut().enumerate().for_each(|(attribute, pli)| {
                sort_for_attribute(attribute, pli, records, attributes);
            });
        }),
    }
}

fn sort_for_attribute(
    attribute: usize,
    pli: &mut PositionListIndex,
    records: &CompressedRecords,
    attributes: usize,
) {
    let left = (attribute + attributes - 1) % attributes;
    let right = (attribute + 1) % attributes;
    pli.sort_clusters(|a, b| {
        let mut first = records.get(a, left);
        let mut second = records.get(b, left);
        if first == second {
            first = records.get(a, right);
            second = records.get(b, right);
        }
        second.cmp(&first)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Relation;

    fn fixture() -> (Vec<PositionListIndex>, CompressedRecords) {
        let relation = Relation::from_rows(
            vec!["a", "b", "c"],
            &[
                &["1", "1", "x"],
                &["1", "1", "y"],
                &["2", "2", "x"],
                &["2", "2", "y"],
                &["3", "1", "x"],
            ],
        );
        let plis = relation.build_plis(true);
        let records = CompressedRecords::from_plis(&plis, relation.num_rows());
        (plis, records)
    }

    #[test]
    fn sampling_finds_cluster_agree_sets() {
        let (mut plis, records) = fixture();
        let mut sampler = Sampler::new(3, 0.01, 0.9);
        let mut found: Vec<AttributeSet> = Vec::new();

        loop {
            let fresh = sampler.sample(&mut plis, &records, &[], None);
            if fresh.is_empty() {
                break;
            }
            for level in 0..=fresh.depth() {
                found.extend(fresh.level(level).iter().cloned());
            }
        }

        // Rows 0 and 1 agree on a and b; rows 0 and 4 agree on b and c.
        let mut ab = AttributeSet::empty(3);
        ab.set(0);
        ab.set(1);
        assert!(found.contains(&ab));

        // Every reported set must be a real agree-set of some row pair.
        for set in &found {
            let mut witnessed = false;
            for first in 0..5u32 {
                for second in first + 1..5 {
                    if &records.agree_set(first, second) == set {
                        witnessed = true;
                    }
                }
            }
            assert!(witnessed, "spurious agree-set {:?}", set);
        }
    }

    #[test]
    fn suggestions_are_always_matched() {
        let (mut plis, records) = fixture();
        let mut sampler = Sampler::new(3, 0.01, 0.9);
        // The suggested pair is matched before any window sampling.
        let fresh = sampler.sample(&mut plis, &records, &[(0, 4)], None);
        let mut bc = AttributeSet::empty(3);
        bc.set(1);
        bc.set(2);
        assert!(fresh.level(2).contains(&bc));
    }
}

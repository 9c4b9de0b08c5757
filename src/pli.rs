//! Position list indexes.
//!
//! A position list index (PLI) partitions the rows of a relation into
//! clusters of equal values for one column (or column combination). Two rows
//! can only violate a dependency if they share a value somewhere, so clusters
//! of size one carry no information for dependency checking: they are never
//! materialized, and rows with unique values are represented by absence.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Synthetic id of a cluster within one PLI, usable as a probe key.
pub type ClusterId = u32;

/// Reserved cluster id for rows that belong to no materialized cluster.
pub const SINGLETON: ClusterId = ClusterId::MAX;

/// An ordered group of row indices sharing a value.
pub type Cluster = Vec<u32>;

/// A partition of row indices into equal-value clusters.
///
/// ```
/// use fundep::PositionListIndex;
///
/// // Value ids per row; id 0 is reserved for nulls.
/// let column = vec![1, 1, 2, 2, 3];
/// let pli = PositionListIndex::create_for(&column, true);
///
/// assert_eq!(pli.clusters(), &[vec![0, 1], vec![2, 3]]);
/// assert!(!pli.is_constant());
/// assert!(!pli.all_values_unique());
/// ```
pub struct PositionListIndex {
    clusters: Vec<Cluster>,
    null_cluster: Cluster,
    /// Number of rows covered by materialized clusters.
    size: u32,
    relation_rows: u32,
    probing: OnceLock<Vec<ClusterId>>,
}

/// Value id reserved for null cells.
pub const NULL_VALUE: u32 = 0;

impl PositionListIndex {
    /// Builds the index for one column of value ids.
    ///
    /// Rows holding [`NULL_VALUE`] form an ordinary cluster when
    /// `equal_nulls` is true; otherwise every null row is treated as unique
    /// and the group is discarded. Either way the null rows are remembered on
    /// the side. Clusters are ordered by their first row index, so the result
    /// is independent of hash-map iteration order.
    pub fn create_for(column: &[u32], equal_nulls: bool) -> Self {
        let mut groups: HashMap<u32, Cluster> = HashMap::new();
        for (row, &value) in column.iter().enumerate() {
            groups.entry(value).or_insert_with(Vec::new).push(row as u32);
        }

        let null_cluster = groups.get(&NULL_VALUE).cloned().unwrap_or_default();
        if !equal_nulls {
            groups.remove(&NULL_VALUE);
        }

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .filter(|(_, rows)| rows.len() > 1)
            .map(|(_, rows)| rows)
            .collect();
        clusters.sort_unstable_by_key(|cluster| cluster[0]);

        let size = clusters.iter().map(|c| c.len() as u32).sum();
        PositionListIndex {
            clusters,
            null_cluster,
            size,
            relation_rows: column.len() as u32,
            probing: OnceLock::new(),
        }
    }

    /// The materialized clusters, ordered by first row index (until
    /// [`sort_clusters`](Self::sort_clusters) reorders rows within them).
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Rows whose cell is null, kept regardless of the null-equality flag.
    pub fn null_cluster(&self) -> &[u32] {
        &self.null_cluster
    }

    /// Number of rows covered by materialized clusters.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of rows in the underlying relation.
    pub fn relation_rows(&self) -> u32 {
        self.relation_rows
    }

    /// Returns `true` if the column holds a single value across all rows.
    /// A column with fewer than two rows is trivially constant.
    pub fn is_constant(&self) -> bool {
        self.relation_rows < 2
            || (self.clusters.len() == 1 && self.clusters[0].len() as u32 == self.relation_rows)
    }

    /// Returns `true` if no two rows share a value.
    pub fn all_values_unique(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Reorders the rows inside each cluster. Cluster membership is
    /// untouched, so any cached probing table stays valid.
    pub fn sort_clusters<F>(&mut self, mut compare: F)
    where
        F: FnMut(u32, u32) -> std::cmp::Ordering,
    {
        for cluster in self.clusters.iter_mut() {
            cluster.sort_unstable_by(|&a, &b| compare(a, b));
        }
    }

    /// The row → cluster-id table, built on first use and cached. Rows
    /// outside every cluster map to [`SINGLETON`].
    pub fn probing_table(&self) -> &[ClusterId] {
        self.probing.get_or_init(|| {
            let mut table = vec![SINGLETON; self.relation_rows as usize];
            for (id, cluster) in self.clusters.iter().enumerate() {
                for &row in cluster {
                    table[row as usize] = id as ClusterId;
                }
            }
            table
        })
    }

    /// Intersects two indexes over the same relation, producing the partition
    /// for the combined column set.
    ///
    /// The smaller index (by covered rows) is probed through the larger's
    /// probing table, so the cost is linear in the smaller side. Both indexes
    /// must describe the same number of rows.
    ///
    /// ```
    /// use fundep::PositionListIndex;
    ///
    /// let a = PositionListIndex::create_for(&[1, 1, 1, 2], true);
    /// let b = PositionListIndex::create_for(&[3, 3, 4, 4], true);
    ///
    /// assert_eq!(a.intersect(&b).clusters(), &[vec![0, 1]]);
    /// ```
    pub fn intersect(&self, other: &Self) -> Self {
        assert_eq!(
            self.relation_rows, other.relation_rows,
            "intersecting indexes over different relations"
        );
        if self.size > other.size {
            other.probe(self.probing_table())
        } else {
            self.probe(other.probing_table())
        }
    }

    /// Refines this partition by another column's probing table.
    fn probe(&self, probing_table: &[ClusterId]) -> Self {
        assert_eq!(self.relation_rows as usize, probing_table.len());

        let mut clusters = Vec::new();
        let mut size = 0;
        let mut partial: HashMap<ClusterId, Cluster> = HashMap::new();

        for cluster in &self.clusters {
            for &row in cluster {
                let id = probing_table[row as usize];
                if id == SINGLETON {
                    continue;
                }
                partial.entry(id).or_insert_with(Vec::new).push(row);
            }

            for (_, group) in partial.drain() {
                if group.len() <= 1 {
                    continue;
                }
                size += group.len() as u32;
                clusters.push(group);
            }
        }
        clusters.sort_unstable_by_key(|cluster| cluster[0]);

        PositionListIndex {
            clusters,
            null_cluster: Vec::new(),
            size,
            relation_rows: self.relation_rows,
            probing: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_are_implicit() {
        let pli = PositionListIndex::create_for(&[1, 2, 3, 2], true);
        assert_eq!(pli.clusters(), &[vec![1, 3]]);
        assert_eq!(pli.size(), 2);
        assert_eq!(pli.probing_table(), &[SINGLETON, 0, SINGLETON, 0]);
    }

    #[test]
    fn null_handling() {
        let column = vec![NULL_VALUE, 1, NULL_VALUE, 1];
        let equal = PositionListIndex::create_for(&column, true);
        assert_eq!(equal.clusters().len(), 2);

        let distinct = PositionListIndex::create_for(&column, false);
        assert_eq!(distinct.clusters(), &[vec![1, 3]]);
        assert_eq!(distinct.null_cluster(), &[0, 2]);
    }

    #[test]
    fn self_intersection_is_idempotent() {
        let pli = PositionListIndex::create_for(&[1, 1, 2, 2, 2, 3, 4, 4], true);
        let again = pli.intersect(&pli);
        assert_eq!(pli.clusters(), again.clusters());
    }

    #[test]
    fn intersection_drops_new_singletons() {
        let a = PositionListIndex::create_for(&[1, 1, 1, 1], true);
        let b = PositionListIndex::create_for(&[2, 3, 4, 2], true);
        let ab = a.intersect(&b);
        assert_eq!(ab.clusters(), &[vec![0, 3]]);
    }

    #[test]
    fn constant_and_unique_predicates() {
        assert!(PositionListIndex::create_for(&[7, 7, 7], true).is_constant());
        assert!(PositionListIndex::create_for(&[1, 2, 3], true).all_values_unique());
    }

    #[test]
    #[should_panic]
    fn mismatched_rows_panic() {
        let a = PositionListIndex::create_for(&[1, 1], true);
        let b = PositionListIndex::create_for(&[1, 1, 1], true);
        a.intersect(&b);
    }
}

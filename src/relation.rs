//! In-memory relations and their compressed form.
//!
//! The discovery engine never looks at raw cell values: a [`Relation`] interns
//! every cell into a dense value id at load time, the per-column
//! [`PositionListIndex`]es are built from those ids, and the
//! [`CompressedRecords`] matrix re-expresses each row as a vector of cluster
//! ids so that "do these two rows agree on column i" is a single comparison.

use crate::bitset::AttributeSet;
use crate::pli::{ClusterId, PositionListIndex, NULL_VALUE, SINGLETON};
use lasso::{Rodeo, Spur};

/// A relational table with interned cell values.
///
/// Cells are interned per relation; the empty string is treated as null and
/// maps to the reserved null value id.
///
/// ```
/// use fundep::Relation;
///
/// let mut relation = Relation::new(vec!["city", "zip"]);
/// relation.push_row(&["portland", "97202"]);
/// relation.push_row(&["portland", "97202"]);
///
/// assert_eq!(relation.num_attributes(), 2);
/// assert_eq!(relation.num_rows(), 2);
/// ```
pub struct Relation {
    names: Vec<String>,
    columns: Vec<Vec<u32>>,
    rows: usize,
    interner: Rodeo<Spur>,
}

impl Relation {
    /// Creates an empty relation with the given column names.
    pub fn new<S: Into<String>>(names: Vec<S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let columns = names.iter().map(|_| Vec::new()).collect();
        Relation {
            names,
            columns,
            rows: 0,
            interner: Rodeo::new(),
        }
    }

    /// Creates a relation from complete rows of cells.
    ///
    /// # Panics
    ///
    /// Panics if any row's width differs from the number of columns.
    pub fn from_rows<S: Into<String>>(names: Vec<S>, rows: &[&[&str]]) -> Self {
        let mut relation = Relation::new(names);
        for row in rows {
            relation.push_row(row);
        }
        relation
    }

    /// Appends one row. Empty cells are null.
    ///
    /// # Panics
    ///
    /// Panics if the row's width differs from the number of columns.
    pub fn push_row(&mut self, cells: &[&str]) {
        assert_eq!(cells.len(), self.columns.len(), "row width mismatch");
        for (column, cell) in self.columns.iter_mut().zip(cells) {
            let value = if cell.is_empty() {
                NULL_VALUE
            } else {
                use lasso::Key;
                unsafe { self.interner.get_or_intern(cell).into_usize() as u32 + 1 }
            };
            column.push(value);
        }
        self.rows += 1;
    }

    /// Number of columns.
    pub fn num_attributes(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// The column names, in attribute order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The interned value ids of one column.
    pub fn column(&self, attribute: usize) -> &[u32] {
        &self.columns[attribute]
    }

    /// Builds one position list index per column.
    pub fn build_plis(&self, equal_nulls: bool) -> Vec<PositionListIndex> {
        self.columns
            .iter()
            .map(|column| PositionListIndex::create_for(column, equal_nulls))
            .collect()
    }
}

/// Row-major matrix of cluster ids, one entry per (row, attribute).
///
/// Rows whose value is unique in a column hold [`SINGLETON`] there. The
/// matrix is built once from the column indexes and never mutated, so it can
/// be shared freely across worker threads.
pub struct CompressedRecords {
    rows: Vec<Vec<ClusterId>>,
    attributes: usize,
}

impl CompressedRecords {
    /// Derives the matrix from the per-column indexes.
    pub fn from_plis(plis: &[PositionListIndex], num_rows: usize) -> Self {
        let mut rows = vec![vec![SINGLETON; plis.len()]; num_rows];
        for (attribute, pli) in plis.iter().enumerate() {
            for (row, &id) in pli.probing_table().iter().enumerate() {
                rows[row][attribute] = id;
            }
        }
        CompressedRecords {
            rows,
            attributes: plis.len(),
        }
    }

    /// Number of attributes per record.
    pub fn num_attributes(&self) -> usize {
        self.attributes
    }

    /// Number of records.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The cluster ids of one record.
    pub fn row(&self, row: u32) -> &[ClusterId] {
        &self.rows[row as usize]
    }

    /// The cluster id of one cell.
    pub fn get(&self, row: u32, attribute: usize) -> ClusterId {
        self.rows[row as usize][attribute]
    }

    /// The set of attributes on which two records hold equal, non-unique
    /// values.
    pub fn agree_set(&self, first: u32, second: u32) -> AttributeSet {
        let a = self.row(first);
        let b = self.row(second);
        let mut agreed = AttributeSet::empty(self.attributes);
        for attribute in 0..self.attributes {
            if a[attribute] != SINGLETON && a[attribute] == b[attribute] {
                agreed.set(attribute);
            }
        }
        agreed
    }
}

//! Owned record collections and their dense numeric views.
//!
//! Each collection is exclusively owned by the pipeline stage holding it.
//! After parsing, rows are only ever *removed* (order-preserving subsetting)
//! and, for the reference matrix, columns only ever *appended*; no row is
//! edited in place.

use crate::error::DimensionError;
use crate::records::{Bed4Record, BulkRow, ReferenceRow};
use crate::sampler::ProfileSampler;
use crate::types::{GenomicKey, Mark};
use ndarray::{Array1, Array2};

/// Anything carrying a [`GenomicKey`]; the alignment algorithms work over
/// slices of these.
pub trait Keyed {
    fn key(&self) -> GenomicKey;
}

impl Keyed for Bed4Record {
    fn key(&self) -> GenomicKey {
        self.key
    }
}

impl Keyed for ReferenceRow {
    fn key(&self) -> GenomicKey {
        self.key
    }
}

impl Keyed for BulkRow {
    fn key(&self) -> GenomicKey {
        self.key
    }
}

/// Rebuilds `rows` keeping only `indexes`, in index order.
///
/// An out-of-range or duplicate index is a contract violation by the
/// caller, not a data error, and panics.
pub(crate) fn subset_rows<T>(rows: Vec<T>, indexes: &[usize]) -> Vec<T> {
    let len = rows.len();
    let mut slots: Vec<Option<T>> = rows.into_iter().map(Some).collect();
    indexes
        .iter()
        .map(|&i| {
            assert!(i < len, "subset index {i} out of range for {len} rows");
            slots[i]
                .take()
                .unwrap_or_else(|| panic!("duplicate subset index {i}"))
        })
        .collect()
}

/// The CpG allow-list: sites the deconvolution is restricted to.
#[derive(Debug, Default, Clone)]
pub struct CpgList {
    records: Vec<Bed4Record>,
}

impl CpgList {
    pub fn new(records: Vec<Bed4Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Bed4Record] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// The bulk observations: one modification fraction per CpG site.
#[derive(Debug, Default, Clone)]
pub struct BulkProfile {
    records: Vec<BulkRow>,
}

impl BulkProfile {
    pub fn new(records: Vec<BulkRow>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[BulkRow] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn subset(&mut self, indexes: &[usize]) {
        self.records = subset_rows(std::mem::take(&mut self.records), indexes);
    }

    /// Densifies the modification fractions into a vector.
    pub fn to_vector(&self) -> Array1<f64> {
        Array1::from_iter(self.records.iter().map(|row| row.proportion))
    }
}

/// The reference panel: per-cell-type methylation proportions at each CpG
/// site. Column count equals the number of cell types and grows only via
/// [`ReferenceMatrix::append_unknown_columns`].
#[derive(Debug, Default, Clone)]
pub struct ReferenceMatrix {
    records: Vec<ReferenceRow>,
}

impl ReferenceMatrix {
    pub fn new(records: Vec<ReferenceRow>) -> Self {
        Self { records }
    }

    /// Builds a column-less skeleton sharing the bulk profile's keys. Used
    /// when no reference panel was supplied and every cell type is unknown.
    pub fn from_bulk(bulk: &BulkProfile) -> Self {
        Self {
            records: bulk
                .records()
                .iter()
                .map(|row| ReferenceRow {
                    key: row.key,
                    proportions: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn records(&self) -> &[ReferenceRow] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn num_cell_types(&self) -> usize {
        self.records.first().map_or(0, |row| row.proportions.len())
    }

    pub fn subset(&mut self, indexes: &[usize]) {
        self.records = subset_rows(std::mem::take(&mut self.records), indexes);
    }

    /// Appends `count` columns of sampled profiles for unknown cell types.
    /// Each row draws from the empirical distribution matching its mark.
    pub fn append_unknown_columns<S: ProfileSampler>(&mut self, count: usize, sampler: &mut S) {
        for _ in 0..count {
            for row in &mut self.records {
                let sample = match row.key.mark {
                    Mark::Methyl => sampler.methylation(),
                    Mark::Hydroxy => sampler.hydroxymethylation(),
                };
                row.proportions.push(sample);
            }
        }
    }

    /// Densifies the panel into a row-major matrix, enforcing a uniform
    /// column count across rows.
    pub fn to_matrix(&self) -> Result<Array2<f64>, DimensionError> {
        let rows = self.records.len();
        let cols = self.num_cell_types();
        let mut matrix = Array2::zeros((rows, cols));
        for (i, record) in self.records.iter().enumerate() {
            if record.proportions.len() != cols {
                return Err(DimensionError {
                    what: "reference matrix row width",
                    expected: cols,
                    found: record.proportions.len(),
                });
            }
            for (j, &value) in record.proportions.iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        Ok(matrix)
    }
}

//! Dataset container: dense numeric columns and binary sparse columns.
//!
//! Dense columns carry a float per row plus a precomputed permutation sorting
//! rows by ascending value; sparse columns are the strictly ascending list of
//! rows where the feature is true. Dense ids occupy `[0, n_dense)`, sparse ids
//! `[n_dense, n_columns)`.
//!
//! Columns can be marked *resident* under a byte budget (see
//! [`DataMatrix::plan_residency`]). The split-finding pipeline borrows
//! resident columns directly and copies non-resident ones into per-slot
//! staging buffers at the start of each feature pass.

use log::info;

// =============================================================================
// Errors
// =============================================================================

/// Dataset construction/validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("dense column {column} has {got} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: usize,
        expected: usize,
        got: usize,
    },
    #[error("sparse column {column} is not strictly ascending at position {position}")]
    SparseNotAscending { column: usize, position: usize },
    #[error("sparse column {column} references row {row}, dataset has {rows} rows")]
    SparseRowOutOfRange { column: usize, row: u32, rows: usize },
    #[error("dataset has no columns")]
    Empty,
    #[error("dataset has {rows} rows, more than the supported maximum {max}")]
    TooManyRows { rows: usize, max: usize },
}

// =============================================================================
// Columns
// =============================================================================

/// A dense numeric feature column.
#[derive(Debug, Clone)]
pub struct DenseColumn {
    /// One value per row.
    pub values: Vec<f32>,
    /// Permutation of `[0, n_rows)` sorting rows by ascending value.
    pub sorted_index: Vec<u32>,
    /// Whether the pipeline may borrow this column directly.
    pub(crate) resident: bool,
}

/// A binary sparse feature column: the rows where the feature is true.
#[derive(Debug, Clone)]
pub struct SparseColumn {
    /// Strictly ascending row indices.
    pub rows: Vec<u32>,
    /// Whether the pipeline may borrow this column directly.
    pub(crate) resident: bool,
}

impl DenseColumn {
    fn bytes(&self) -> u64 {
        (self.values.len() * std::mem::size_of::<f32>()
            + self.sorted_index.len() * std::mem::size_of::<u32>()) as u64
    }
}

impl SparseColumn {
    fn bytes(&self) -> u64 {
        (self.rows.len() * std::mem::size_of::<u32>()) as u64
    }
}

// =============================================================================
// DataMatrix
// =============================================================================

/// Row-indexed tabular dataset with dense and binary sparse features.
#[derive(Debug, Clone)]
pub struct DataMatrix {
    n_rows: usize,
    dense: Vec<DenseColumn>,
    sparse: Vec<SparseColumn>,
    /// Per row, the ascending list of global sparse feature ids that are true.
    row_features: Vec<Vec<u32>>,
}

impl DataMatrix {
    /// Number of rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Total number of feature columns (dense + sparse).
    #[inline]
    pub fn n_columns(&self) -> usize {
        self.dense.len() + self.sparse.len()
    }

    /// Number of dense columns. Dense feature ids are `[0, n_dense)`.
    #[inline]
    pub fn n_dense(&self) -> usize {
        self.dense.len()
    }

    /// Number of sparse columns. Sparse feature ids are `[n_dense, n_columns)`.
    #[inline]
    pub fn n_sparse(&self) -> usize {
        self.sparse.len()
    }

    /// Whether the global feature id refers to a dense column.
    #[inline]
    pub fn is_dense(&self, fid: u32) -> bool {
        (fid as usize) < self.dense.len()
    }

    /// Dense column by global feature id.
    #[inline]
    pub fn dense_column(&self, fid: u32) -> &DenseColumn {
        &self.dense[fid as usize]
    }

    /// Sparse column by global feature id.
    #[inline]
    pub fn sparse_column(&self, fid: u32) -> &SparseColumn {
        &self.sparse[fid as usize - self.dense.len()]
    }

    /// Value of a dense feature for one row.
    #[inline]
    pub fn dense_value(&self, fid: u32, row: usize) -> f32 {
        self.dense[fid as usize].values[row]
    }

    /// Whether a sparse feature is true for a row.
    ///
    /// Binary search in the row's ascending feature list.
    #[inline]
    pub fn row_has_feature(&self, row: usize, fid: u32) -> bool {
        self.row_features[row].binary_search(&fid).is_ok()
    }

    /// The ascending list of true sparse feature ids for a row.
    #[inline]
    pub fn row_features(&self, row: usize) -> &[u32] {
        &self.row_features[row]
    }

    /// Mark columns resident under a byte budget.
    ///
    /// Columns are walked in id order; each is marked resident while the
    /// running total stays within 90% of `budget_bytes`. The remainder of the
    /// budget covers pipeline buffers and scratch. Non-resident columns are
    /// staged into slot buffers on every feature pass instead.
    pub fn plan_residency(&mut self, budget_bytes: u64, verbose: bool) {
        let usable = budget_bytes - budget_bytes / 10;
        let mut used = 0u64;
        let mut n_resident = 0usize;

        for col in self.dense.iter_mut() {
            let bytes = col.bytes();
            col.resident = used + bytes <= usable;
            if col.resident {
                used += bytes;
                n_resident += 1;
            }
        }
        for col in self.sparse.iter_mut() {
            let bytes = col.bytes();
            col.resident = used + bytes <= usable;
            if col.resident {
                used += bytes;
                n_resident += 1;
            }
        }

        if verbose {
            info!(
                "column residency: {}/{} columns resident, {} of {} budget bytes used",
                n_resident,
                self.n_columns(),
                used,
                usable
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn n_resident(&self) -> usize {
        self.dense.iter().filter(|c| c.resident).count()
            + self.sparse.iter().filter(|c| c.resident).count()
    }
}

// =============================================================================
// DataMatrixBuilder
// =============================================================================

/// Builder for [`DataMatrix`]. Finalizing validates the layout, computes the
/// per-column sort permutations and the per-row sparse feature lists.
#[derive(Debug, Clone)]
pub struct DataMatrixBuilder {
    n_rows: usize,
    dense: Vec<Vec<f32>>,
    sparse: Vec<Vec<u32>>,
}

impl DataMatrixBuilder {
    /// Start a dataset with a fixed number of rows.
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            dense: Vec::new(),
            sparse: Vec::new(),
        }
    }

    /// Add a dense column with one value per row.
    pub fn dense(mut self, values: Vec<f32>) -> Self {
        self.dense.push(values);
        self
    }

    /// Add a binary sparse column as the ascending list of true rows.
    pub fn sparse(mut self, rows: Vec<u32>) -> Self {
        self.sparse.push(rows);
        self
    }

    /// Validate and finalize the layout.
    pub fn build(self) -> Result<DataMatrix, DataError> {
        if self.dense.is_empty() && self.sparse.is_empty() {
            return Err(DataError::Empty);
        }
        if self.n_rows > u32::MAX as usize {
            return Err(DataError::TooManyRows {
                rows: self.n_rows,
                max: u32::MAX as usize,
            });
        }

        let n_dense = self.dense.len();
        let mut dense = Vec::with_capacity(n_dense);
        for (column, values) in self.dense.into_iter().enumerate() {
            if values.len() != self.n_rows {
                return Err(DataError::ColumnLengthMismatch {
                    column,
                    expected: self.n_rows,
                    got: values.len(),
                });
            }
            let mut sorted_index: Vec<u32> = (0..self.n_rows as u32).collect();
            sorted_index.sort_by(|&a, &b| values[a as usize].total_cmp(&values[b as usize]));
            dense.push(DenseColumn {
                values,
                sorted_index,
                resident: true,
            });
        }

        let mut row_features: Vec<Vec<u32>> = vec![Vec::new(); self.n_rows];
        let mut sparse = Vec::with_capacity(self.sparse.len());
        for (sid, rows) in self.sparse.into_iter().enumerate() {
            let column = n_dense + sid;
            for (position, &row) in rows.iter().enumerate() {
                if position > 0 && rows[position - 1] >= row {
                    return Err(DataError::SparseNotAscending { column, position });
                }
                if row as usize >= self.n_rows {
                    return Err(DataError::SparseRowOutOfRange {
                        column,
                        row,
                        rows: self.n_rows,
                    });
                }
                row_features[row as usize].push(column as u32);
            }
            sparse.push(SparseColumn {
                rows,
                resident: true,
            });
        }
        // Columns were visited in ascending id order, so each row list is
        // already sorted.

        Ok(DataMatrix {
            n_rows: self.n_rows,
            dense,
            sparse,
            row_features,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

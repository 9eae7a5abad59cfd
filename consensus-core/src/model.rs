//! Sparse model data structures.
//!
//! The model is a row/column/element arena: elements live in one contiguous
//! array and each row and column keeps the indices of its elements. Every
//! component of the solver walks the model through these index lists, so the
//! layout matches the access pattern with no pointer chasing.
//!
//! The model is built once from a CSC matrix plus row/column specifications
//! and is read-only for the rest of the solve.

use crate::sparse::SparseCsc;
use thiserror::Error;

/// Default large finite stand-in for plus infinity.
///
/// This is deliberately a finite sentinel, not an IEEE infinity: presence of
/// a bound is always the strict comparison `|bound| < plinfy`.
pub const PLINFY: f64 = 1.0e10;

/// Model construction failures.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Row specification count disagrees with the matrix.
    #[error("{specs} row specs for a matrix with {mat} rows")]
    RowCountMismatch {
        /// Number of row specifications supplied.
        specs: usize,
        /// Number of matrix rows.
        mat: usize,
    },

    /// Column specification count disagrees with the matrix.
    #[error("{specs} column specs for a matrix with {mat} columns")]
    ColCountMismatch {
        /// Number of column specifications supplied.
        specs: usize,
        /// Number of matrix columns.
        mat: usize,
    },

    /// A column appears in no element.
    #[error("column {index} ({name}) appears in no row")]
    EmptyColumn {
        /// Column index.
        index: usize,
        /// Column name.
        name: String,
    },

    /// The model has no columns at all.
    #[error("model has no columns")]
    Empty,
}

/// Row sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// `body >= rhs_lo`
    Greater,
    /// `body <= rhs_up`
    Less,
    /// `body == rhs_lo == rhs_up`
    Equal,
    /// `rhs_lo <= body <= rhs_up`
    Range,
    /// Nonbinding (objective or emptied) row.
    Free,
}

/// One row constraint.
#[derive(Debug, Clone)]
pub struct Row {
    /// Row name from the model source.
    pub name: String,
    /// Row sense.
    pub kind: RowKind,
    /// Lower right-hand side (`-plinfy` when absent).
    pub rhs_lo: f64,
    /// Upper right-hand side (`+plinfy` when absent).
    pub rhs_up: f64,
    /// Indices into the element arena.
    pub elements: Vec<usize>,
    /// Squared Euclidean length of the row gradient, `Σ aᵢⱼ²`.
    pub grad_len_sq: f64,
}

/// One column (variable).
#[derive(Debug, Clone)]
pub struct Col {
    /// Column name from the model source.
    pub name: String,
    /// Integer tag. Informational only: the solver never rounds.
    pub integer: bool,
    /// Lower bound (`-plinfy` when absent).
    pub bnd_lo: f64,
    /// Upper bound (`+plinfy` when absent).
    pub bnd_up: f64,
    /// Indices into the element arena.
    pub elements: Vec<usize>,
}

/// One nonzero coefficient.
#[derive(Debug, Clone, Copy)]
pub struct Element {
    /// Row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
    /// Coefficient value (never zero).
    pub value: f64,
}

/// Row specification used during construction.
#[derive(Debug, Clone)]
pub struct RowSpec {
    /// Row name.
    pub name: String,
    /// Row sense.
    pub kind: RowKind,
    /// Lower right-hand side.
    pub rhs_lo: f64,
    /// Upper right-hand side.
    pub rhs_up: f64,
}

/// Column specification used during construction.
#[derive(Debug, Clone)]
pub struct ColSpec {
    /// Column name.
    pub name: String,
    /// Integer tag.
    pub integer: bool,
    /// Lower bound.
    pub bnd_lo: f64,
    /// Upper bound.
    pub bnd_up: f64,
}

/// The sparse linear system: rows, columns, and the element arena.
#[derive(Debug, Clone)]
pub struct SparseModel {
    /// Model name.
    pub name: String,
    /// Row constraints.
    pub rows: Vec<Row>,
    /// Columns with bounds.
    pub cols: Vec<Col>,
    /// Element arena.
    pub elements: Vec<Element>,
}

impl SparseModel {
    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.cols.len()
    }

    /// Number of nonzero elements.
    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Build a model from a CSC matrix and row/column specifications.
    ///
    /// Structural zeros in the matrix are dropped. `featol` is used to
    /// collapse degenerate ranges into equalities. Repairs applied with a
    /// warning, mirroring what a front-end reader has to tolerate:
    /// reversed row or column bounds are swapped, and a non-free row with
    /// no elements is converted to a free row. A column with no elements
    /// is an error.
    pub fn from_csc(
        name: impl Into<String>,
        row_specs: Vec<RowSpec>,
        col_specs: Vec<ColSpec>,
        a: &SparseCsc,
        featol: f64,
    ) -> Result<Self, ModelError> {
        if row_specs.len() != a.rows() {
            return Err(ModelError::RowCountMismatch {
                specs: row_specs.len(),
                mat: a.rows(),
            });
        }
        if col_specs.len() != a.cols() {
            return Err(ModelError::ColCountMismatch {
                specs: col_specs.len(),
                mat: a.cols(),
            });
        }
        if col_specs.is_empty() {
            return Err(ModelError::Empty);
        }

        let mut rows: Vec<Row> = row_specs
            .into_iter()
            .map(|r| Row {
                name: r.name,
                kind: r.kind,
                rhs_lo: r.rhs_lo,
                rhs_up: r.rhs_up,
                elements: Vec::new(),
                grad_len_sq: 0.0,
            })
            .collect();
        let mut cols: Vec<Col> = col_specs
            .into_iter()
            .map(|c| Col {
                name: c.name,
                integer: c.integer,
                bnd_lo: c.bnd_lo,
                bnd_up: c.bnd_up,
                elements: Vec::new(),
            })
            .collect();

        let mut elements = Vec::with_capacity(a.nnz());
        for (val, (row, col)) in a.iter() {
            if *val == 0.0 {
                continue;
            }
            let idx = elements.len();
            elements.push(Element {
                row,
                col,
                value: *val,
            });
            rows[row].elements.push(idx);
            cols[col].elements.push(idx);
        }

        let mut model = SparseModel {
            name: name.into(),
            rows,
            cols,
            elements,
        };
        model.finalize(featol)?;
        Ok(model)
    }

    /// Post-construction fixups: gradient lengths, range collapse, bound
    /// repair, empty-row conversion.
    fn finalize(&mut self, featol: f64) -> Result<(), ModelError> {
        for i in 0..self.rows.len() {
            let grad: f64 = self.rows[i]
                .elements
                .iter()
                .map(|&e| self.elements[e].value * self.elements[e].value)
                .sum();
            self.rows[i].grad_len_sq = grad;

            if self.rows[i].kind != RowKind::Free && self.rows[i].elements.is_empty() {
                log::warn!(
                    "row {} ({}) has no elements; converted to free row",
                    i,
                    self.rows[i].name
                );
                self.rows[i].kind = RowKind::Free;
            }

            if self.rows[i].kind == RowKind::Range {
                if self.rows[i].rhs_lo > self.rows[i].rhs_up {
                    log::warn!(
                        "row {} ({}) has reversed right-hand sides; swapping",
                        i,
                        self.rows[i].name
                    );
                    let row = &mut self.rows[i];
                    std::mem::swap(&mut row.rhs_lo, &mut row.rhs_up);
                }
                if self.rows[i].rhs_up - self.rows[i].rhs_lo <= featol {
                    // The range is actually an equality.
                    self.rows[i].kind = RowKind::Equal;
                }
            }
        }

        for j in 0..self.cols.len() {
            if self.cols[j].bnd_lo > self.cols[j].bnd_up {
                log::warn!(
                    "column {} ({}) has reversed bounds; swapping",
                    j,
                    self.cols[j].name
                );
                let col = &mut self.cols[j];
                std::mem::swap(&mut col.bnd_lo, &mut col.bnd_up);
            }
            if self.cols[j].elements.is_empty() {
                return Err(ModelError::EmptyColumn {
                    index: j,
                    name: self.cols[j].name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Model statistics for reporting.
    pub fn statistics(&self, featol: f64) -> ModelStats {
        let mut st = ModelStats {
            n_rows: self.n_rows(),
            n_cols: self.n_cols(),
            n_elements: self.n_elements(),
            ..ModelStats::default()
        };

        for row in &self.rows {
            st.max_els_in_row = st.max_els_in_row.max(row.elements.len());
            match row.kind {
                RowKind::Greater => {
                    st.g_rows += 1;
                    if row.rhs_lo > -PLINFY {
                        st.binding_constraints += 1;
                    }
                }
                RowKind::Less => {
                    st.l_rows += 1;
                    if row.rhs_up < PLINFY {
                        st.binding_constraints += 1;
                    }
                }
                RowKind::Equal => {
                    st.e_rows += 1;
                    st.binding_constraints += 1;
                }
                RowKind::Range => {
                    st.r_rows += 1;
                    if row.rhs_lo > -PLINFY {
                        st.binding_constraints += 1;
                    }
                    if row.rhs_up < PLINFY {
                        st.binding_constraints += 1;
                    }
                }
                RowKind::Free => st.free_rows += 1,
            }
        }

        for col in &self.cols {
            st.max_els_in_col = st.max_els_in_col.max(col.elements.len());
            if col.integer {
                st.integer_cols += 1;
            }
            if col.bnd_up - col.bnd_lo <= featol {
                // Fixed variable counts as a single bound.
                st.binding_bounds += 1;
            } else {
                if col.bnd_lo > -PLINFY {
                    st.binding_bounds += 1;
                }
                if col.bnd_up < PLINFY {
                    st.binding_bounds += 1;
                }
            }
        }

        st.avg_els_per_row = st.n_elements as f64 / st.n_rows.max(1) as f64;
        st.avg_els_per_col = st.n_elements as f64 / st.n_cols.max(1) as f64;
        st
    }
}

/// Structural statistics of a model.
#[derive(Debug, Clone, Default)]
pub struct ModelStats {
    /// Total rows.
    pub n_rows: usize,
    /// Total columns.
    pub n_cols: usize,
    /// Total nonzero elements.
    pub n_elements: usize,
    /// `>=` rows.
    pub g_rows: usize,
    /// `<=` rows.
    pub l_rows: usize,
    /// Equality rows.
    pub e_rows: usize,
    /// Range rows.
    pub r_rows: usize,
    /// Free rows.
    pub free_rows: usize,
    /// Integer-tagged columns.
    pub integer_cols: usize,
    /// Largest row element count.
    pub max_els_in_row: usize,
    /// Largest column element count.
    pub max_els_in_col: usize,
    /// Mean elements per row.
    pub avg_els_per_row: f64,
    /// Mean elements per column.
    pub avg_els_per_col: f64,
    /// Binding row bounds (a range counts twice).
    pub binding_constraints: usize,
    /// Binding variable bounds (a fixed variable counts once).
    pub binding_bounds: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse;

    fn spec_row(name: &str, kind: RowKind, lo: f64, up: f64) -> RowSpec {
        RowSpec {
            name: name.to_string(),
            kind,
            rhs_lo: lo,
            rhs_up: up,
        }
    }

    fn spec_col(name: &str, lo: f64, up: f64) -> ColSpec {
        ColSpec {
            name: name.to_string(),
            integer: false,
            bnd_lo: lo,
            bnd_up: up,
        }
    }

    #[test]
    fn test_arena_construction() {
        // x1 + x2 = 2 over [0,10]^2
        let a = sparse::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);
        let model = SparseModel::from_csc(
            "tiny",
            vec![spec_row("c1", RowKind::Equal, 2.0, 2.0)],
            vec![spec_col("x1", 0.0, 10.0), spec_col("x2", 0.0, 10.0)],
            &a,
            1e-6,
        )
        .unwrap();

        assert_eq!(model.n_rows(), 1);
        assert_eq!(model.n_cols(), 2);
        assert_eq!(model.n_elements(), 2);
        assert_eq!(model.rows[0].grad_len_sq, 2.0);
        assert_eq!(model.cols[0].elements.len(), 1);
        assert_eq!(model.cols[1].elements.len(), 1);
    }

    #[test]
    fn test_narrow_range_becomes_equality() {
        let a = sparse::from_triplets(1, 1, vec![(0, 0, 1.0)]);
        let model = SparseModel::from_csc(
            "range",
            vec![spec_row("r1", RowKind::Range, 1.0, 1.0 + 5e-7)],
            vec![spec_col("x1", 0.0, 10.0)],
            &a,
            1e-6,
        )
        .unwrap();
        assert_eq!(model.rows[0].kind, RowKind::Equal);
    }

    #[test]
    fn test_reversed_bounds_swapped() {
        let a = sparse::from_triplets(1, 1, vec![(0, 0, 1.0)]);
        let model = SparseModel::from_csc(
            "rev",
            vec![spec_row("r1", RowKind::Less, -PLINFY, 4.0)],
            vec![spec_col("x1", 5.0, 1.0)],
            &a,
            1e-6,
        )
        .unwrap();
        assert_eq!(model.cols[0].bnd_lo, 1.0);
        assert_eq!(model.cols[0].bnd_up, 5.0);
    }

    #[test]
    fn test_empty_column_rejected() {
        let a = sparse::from_triplets(1, 2, vec![(0, 0, 1.0)]);
        let err = SparseModel::from_csc(
            "bad",
            vec![spec_row("r1", RowKind::Less, -PLINFY, 4.0)],
            vec![spec_col("x1", 0.0, 1.0), spec_col("x2", 0.0, 1.0)],
            &a,
            1e-6,
        );
        assert!(matches!(err, Err(ModelError::EmptyColumn { index: 1, .. })));
    }

    #[test]
    fn test_statistics() {
        let a = sparse::from_triplets(
            3,
            2,
            vec![(0, 0, 1.0), (0, 1, 2.0), (1, 0, 3.0), (2, 1, -1.0)],
        );
        let model = SparseModel::from_csc(
            "stats",
            vec![
                spec_row("g", RowKind::Greater, 1.0, PLINFY),
                spec_row("l", RowKind::Less, -PLINFY, 5.0),
                spec_row("e", RowKind::Equal, 0.0, 0.0),
            ],
            vec![spec_col("x1", 0.0, PLINFY), spec_col("x2", 0.0, 1.0)],
            &a,
            1e-6,
        )
        .unwrap();

        let st = model.statistics(1e-6);
        assert_eq!(st.g_rows, 1);
        assert_eq!(st.l_rows, 1);
        assert_eq!(st.e_rows, 1);
        assert_eq!(st.binding_constraints, 3);
        // x1 has only a lower bound, x2 has both.
        assert_eq!(st.binding_bounds, 3);
        assert_eq!(st.max_els_in_row, 2);
        assert_eq!(st.max_els_in_col, 2);
    }
}

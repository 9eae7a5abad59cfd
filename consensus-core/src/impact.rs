//! Structural impact ordering.
//!
//! The impact of a row is the number of other non-free rows it shares at
//! least one column with. Computed once per model; consumed by the
//! sequential-impact trajectory, which sweeps rows from most to least
//! coupled.

use crate::model::{RowKind, SparseModel};

/// Row indices sorted by descending impact, ties by ascending row index.
///
/// Free rows carry zero impact and sort to the back.
pub fn impact_order(model: &SparseModel) -> Vec<usize> {
    let n_rows = model.n_rows();
    let mut scores = vec![0usize; n_rows];
    let mut touched = vec![false; n_rows];

    for i in 0..n_rows {
        if model.rows[i].kind == RowKind::Free {
            continue;
        }
        touched.fill(false);
        for &iel in &model.rows[i].elements {
            let col = model.elements[iel].col;
            for &jel in &model.cols[col].elements {
                let jrow = model.elements[jel].row;
                if model.rows[jrow].kind != RowKind::Free {
                    touched[jrow] = true;
                }
            }
        }
        let mut count = touched.iter().filter(|&&t| t).count();
        if count > 0 {
            // A row always touches itself; it does not count.
            count -= 1;
        }
        scores[i] = count;
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(scores[i]), i));
    order
}

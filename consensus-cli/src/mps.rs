//! MPS file reader.
//!
//! Reads fixed- or free-format MPS into the sparse model consumed by the
//! solver. Sections handled: NAME, ROWS, COLUMNS (with INTORG/INTEND
//! integer markers), RHS, RANGES, BOUNDS, ENDATA. `*` comment lines and
//! blank lines are skipped. Only the first-listed RHS, RANGES, and BOUNDS
//! set is read; later sets are ignored.
//!
//! Policy notes, kept from long-standing MPS conventions:
//! - Default column bounds are `[0, +plinfy)`.
//! - A RANGES entry on a G or L row widens it by `|r|`; on an E row the
//!   sign of `r` picks which side widens.
//! - Semi-continuous (SC) bounds are handled only in their continuous
//!   part: the lower bound becomes 1.0, with a warning.
//! - The first N row is the objective and stays nonbinding.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use consensus_core::model::{ColSpec, ModelError, RowKind, RowSpec, SparseModel};
use consensus_core::sparse;
use flate2::read::GzDecoder;

/// Parsed MPS problem, before conversion to the solver model.
#[derive(Debug, Clone)]
pub struct MpsProblem {
    /// Problem name from the NAME card.
    pub name: String,
    /// Row specifications in file order.
    pub rows: Vec<RowSpec>,
    /// Column specifications in file order.
    pub cols: Vec<ColSpec>,
    /// Matrix triplets (row, col, value).
    pub triplets: Vec<(usize, usize, f64)>,
}

impl MpsProblem {
    /// Convert into the solver's sparse model.
    pub fn into_model(self, featol: f64) -> Result<SparseModel, ModelError> {
        let a = sparse::from_triplets(self.rows.len(), self.cols.len(), self.triplets);
        SparseModel::from_csc(self.name, self.rows, self.cols, &a, featol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Rows,
    Columns,
    Rhs,
    Ranges,
    Bounds,
}

/// Read an MPS file, transparently decompressing `.gz`.
pub fn parse_mps<P: AsRef<Path>>(path: P, plinfy: f64) -> Result<MpsProblem> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open MPS file {:?}", path))?;
    let fallback_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "NoName".to_string());

    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        parse_reader(BufReader::new(GzDecoder::new(file)), &fallback_name, plinfy)
            .with_context(|| format!("failed to parse {:?}", path))
    } else {
        parse_reader(BufReader::new(file), &fallback_name, plinfy)
            .with_context(|| format!("failed to parse {:?}", path))
    }
}

/// Read MPS from any buffered reader.
pub fn parse_reader<R: BufRead>(
    reader: R,
    fallback_name: &str,
    plinfy: f64,
) -> Result<MpsProblem> {
    let mut name = fallback_name.to_string();
    let mut rows: Vec<RowSpec> = Vec::new();
    let mut cols: Vec<ColSpec> = Vec::new();
    let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
    let mut row_map: HashMap<String, usize> = HashMap::new();
    let mut col_map: HashMap<String, usize> = HashMap::new();

    let mut section = Section::None;
    let mut integer_marker = false;
    let mut rhs_set: Option<String> = None;
    let mut range_set: Option<String> = None;
    let mut bound_set: Option<String> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.with_context(|| format!("read error at line {}", line_no))?;
        if line.starts_with('*') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        match tokens[0].to_uppercase().as_str() {
            "NAME" => {
                if tokens.len() > 1 {
                    name = tokens[1].to_string();
                }
                section = Section::None;
                continue;
            }
            "ROWS" => {
                section = Section::Rows;
                continue;
            }
            "COLUMNS" => {
                section = Section::Columns;
                continue;
            }
            "RHS" if section != Section::Rhs || tokens.len() == 1 => {
                section = Section::Rhs;
                continue;
            }
            "RANGES" => {
                section = Section::Ranges;
                continue;
            }
            "BOUNDS" => {
                section = Section::Bounds;
                continue;
            }
            "ENDATA" => break,
            _ => {}
        }

        // Integer marker lines switch the tag for following columns.
        if tokens.len() >= 3 && tokens[1] == "'MARKER'" {
            match tokens[2] {
                "'INTORG'" => integer_marker = true,
                "'INTEND'" => integer_marker = false,
                other => log::warn!("unknown marker {} at line {}", other, line_no),
            }
            continue;
        }

        match section {
            Section::Rows => {
                if tokens.len() < 2 {
                    bail!("malformed ROWS entry at line {}", line_no);
                }
                let kind = match tokens[0].to_uppercase().as_str() {
                    "G" => RowKind::Greater,
                    "L" => RowKind::Less,
                    "E" => RowKind::Equal,
                    "N" => RowKind::Free,
                    other => bail!("unknown row type {} at line {}", other, line_no),
                };
                // Missing RHS entries default to zero on the binding side.
                let (rhs_lo, rhs_up) = match kind {
                    RowKind::Greater => (0.0, plinfy),
                    RowKind::Less => (-plinfy, 0.0),
                    RowKind::Equal => (0.0, 0.0),
                    _ => (-plinfy, plinfy),
                };
                row_map.insert(tokens[1].to_string(), rows.len());
                rows.push(RowSpec {
                    name: tokens[1].to_string(),
                    kind,
                    rhs_lo,
                    rhs_up,
                });
            }

            Section::Columns => {
                if tokens.len() < 3 {
                    bail!("malformed COLUMNS entry at line {}", line_no);
                }
                let col_idx = *col_map.entry(tokens[0].to_string()).or_insert_with(|| {
                    cols.push(ColSpec {
                        name: tokens[0].to_string(),
                        integer: integer_marker,
                        bnd_lo: 0.0,
                        bnd_up: plinfy,
                    });
                    cols.len() - 1
                });
                for pair in tokens[1..].chunks(2) {
                    let [row_name, value] = pair else {
                        bail!("dangling coefficient at line {}", line_no);
                    };
                    let row_idx = *row_map.get(*row_name).ok_or_else(|| {
                        anyhow!("unknown row {} at line {}", row_name, line_no)
                    })?;
                    let value: f64 = value
                        .parse()
                        .with_context(|| format!("bad coefficient at line {}", line_no))?;
                    triplets.push((row_idx, col_idx, value));
                }
            }

            Section::Rhs => {
                if tokens.len() < 3 {
                    bail!("malformed RHS entry at line {}", line_no);
                }
                let set = rhs_set.get_or_insert_with(|| tokens[0].to_string());
                if tokens[0] != set {
                    continue; // later RHS sets are ignored
                }
                for pair in tokens[1..].chunks(2) {
                    let [row_name, value] = pair else {
                        bail!("dangling RHS value at line {}", line_no);
                    };
                    let Some(&row_idx) = row_map.get(*row_name) else {
                        log::warn!("RHS for unknown row {} at line {}", row_name, line_no);
                        continue;
                    };
                    let value: f64 = value
                        .parse()
                        .with_context(|| format!("bad RHS value at line {}", line_no))?;
                    let row = &mut rows[row_idx];
                    match row.kind {
                        RowKind::Greater => row.rhs_lo = value,
                        RowKind::Less => row.rhs_up = value,
                        RowKind::Equal => {
                            row.rhs_lo = value;
                            row.rhs_up = value;
                        }
                        RowKind::Free => {
                            if value != 0.0 {
                                log::warn!(
                                    "objective row {} has a constant term; ignored",
                                    row.name
                                );
                            }
                        }
                        RowKind::Range => {}
                    }
                }
            }

            Section::Ranges => {
                if tokens.len() < 3 {
                    bail!("malformed RANGES entry at line {}", line_no);
                }
                let set = range_set.get_or_insert_with(|| tokens[0].to_string());
                if tokens[0] != set {
                    continue;
                }
                for pair in tokens[1..].chunks(2) {
                    let [row_name, value] = pair else {
                        bail!("dangling range value at line {}", line_no);
                    };
                    let Some(&row_idx) = row_map.get(*row_name) else {
                        log::warn!("range for unknown row {} at line {}", row_name, line_no);
                        continue;
                    };
                    let r: f64 = value
                        .parse()
                        .with_context(|| format!("bad range value at line {}", line_no))?;
                    let row = &mut rows[row_idx];
                    match row.kind {
                        RowKind::Greater => {
                            row.rhs_up = row.rhs_lo + r.abs();
                            row.kind = RowKind::Range;
                        }
                        RowKind::Less => {
                            row.rhs_lo = row.rhs_up - r.abs();
                            row.kind = RowKind::Range;
                        }
                        RowKind::Equal => {
                            if r > 0.0 {
                                row.rhs_up = row.rhs_lo + r;
                            } else {
                                row.rhs_lo = row.rhs_up - r.abs();
                            }
                            row.kind = RowKind::Range;
                        }
                        _ => {
                            log::warn!(
                                "range on non-constraint row {} at line {}; ignored",
                                row.name,
                                line_no
                            );
                        }
                    }
                }
            }

            Section::Bounds => {
                if tokens.len() < 3 {
                    bail!("malformed BOUNDS entry at line {}", line_no);
                }
                let set = bound_set.get_or_insert_with(|| tokens[1].to_string());
                if tokens[1] != set {
                    continue;
                }
                let btype = tokens[0].to_uppercase();
                let Some(&col_idx) = col_map.get(tokens[2]) else {
                    log::warn!("bound for unknown column {} at line {}", tokens[2], line_no);
                    continue;
                };
                let value = || -> Result<f64> {
                    tokens
                        .get(3)
                        .ok_or_else(|| anyhow!("missing bound value at line {}", line_no))?
                        .parse()
                        .with_context(|| format!("bad bound value at line {}", line_no))
                };
                let col = &mut cols[col_idx];
                match btype.as_str() {
                    "LO" => col.bnd_lo = value()?,
                    "UP" => col.bnd_up = value()?,
                    "FX" => {
                        let v = value()?;
                        col.bnd_lo = v;
                        col.bnd_up = v;
                    }
                    "FR" => {
                        col.bnd_lo = -plinfy;
                        col.bnd_up = plinfy;
                    }
                    "MI" => col.bnd_lo = -plinfy,
                    "PL" => col.bnd_up = plinfy,
                    "BV" => {
                        col.integer = true;
                        col.bnd_lo = 0.0;
                        col.bnd_up = 1.0;
                    }
                    "LI" => {
                        col.integer = true;
                        col.bnd_lo = value()?;
                        col.bnd_up = plinfy;
                    }
                    "UI" => {
                        col.integer = true;
                        col.bnd_lo = 0.0;
                        col.bnd_up = value()?;
                    }
                    "SC" => {
                        log::warn!(
                            "semi-continuous bound on {}: only the continuous part is \
                             handled, lower bound set to 1.0",
                            col.name
                        );
                        col.bnd_lo = 1.0;
                        col.bnd_up = value()?;
                    }
                    other => {
                        log::warn!("unknown bound type {} at line {}; ignored", other, line_no);
                    }
                }
            }

            Section::None => {}
        }
    }

    if cols.is_empty() {
        bail!("no columns found");
    }
    if !rows.iter().any(|r| r.kind == RowKind::Free) {
        log::warn!("model {} has no objective row", name);
    }

    Ok(MpsProblem {
        name,
        rows,
        cols,
        triplets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PLINFY: f64 = 1.0e10;

    const SAMPLE: &str = "\
* sample model
NAME          TINY
ROWS
 N  COST
 G  R1
 L  R2
 E  R3
COLUMNS
    X1        COST      1.0        R1        2.0
    X1        R2        1.0
    X2        R1        1.0        R3        1.0
    X2        R2        3.0
RHS
    RHS1      R1        4.0        R2        10.0
    RHS1      R3        2.0
RANGES
    RNG       R2        2.0
BOUNDS
 UP BND       X1        8.0
 LO BND       X2        0.5
ENDATA
";

    fn parse(text: &str) -> MpsProblem {
        parse_reader(Cursor::new(text), "test", PLINFY).unwrap()
    }

    #[test]
    fn test_sections_and_shapes() {
        let p = parse(SAMPLE);
        assert_eq!(p.name, "TINY");
        assert_eq!(p.rows.len(), 4);
        assert_eq!(p.cols.len(), 2);
        // COST gets X1's 1.0, R1 two entries, R2 two, R3 one.
        assert_eq!(p.triplets.len(), 6);
    }

    #[test]
    fn test_rhs_by_row_kind() {
        let p = parse(SAMPLE);
        let r1 = &p.rows[1];
        assert_eq!(r1.kind, RowKind::Greater);
        assert_eq!(r1.rhs_lo, 4.0);
        assert_eq!(r1.rhs_up, PLINFY);

        let r3 = &p.rows[3];
        assert_eq!(r3.kind, RowKind::Equal);
        assert_eq!(r3.rhs_lo, 2.0);
        assert_eq!(r3.rhs_up, 2.0);
    }

    #[test]
    fn test_range_widens_less_row() {
        let p = parse(SAMPLE);
        let r2 = &p.rows[2];
        assert_eq!(r2.kind, RowKind::Range);
        assert_eq!(r2.rhs_up, 10.0);
        assert_eq!(r2.rhs_lo, 8.0);
    }

    #[test]
    fn test_bounds_applied() {
        let p = parse(SAMPLE);
        assert_eq!(p.cols[0].bnd_lo, 0.0);
        assert_eq!(p.cols[0].bnd_up, 8.0);
        assert_eq!(p.cols[1].bnd_lo, 0.5);
        assert_eq!(p.cols[1].bnd_up, PLINFY);
    }

    #[test]
    fn test_negative_range_on_equality() {
        let text = "\
NAME T
ROWS
 N  OBJ
 E  R1
COLUMNS
    X1        OBJ       1.0        R1        1.0
RHS
    RHS       R1        5.0
RANGES
    RNG       R1        -2.0
ENDATA
";
        let p = parse(text);
        let r1 = &p.rows[1];
        assert_eq!(r1.kind, RowKind::Range);
        assert_eq!(r1.rhs_lo, 3.0);
        assert_eq!(r1.rhs_up, 5.0);
    }

    #[test]
    fn test_integer_markers_tag_columns() {
        let text = "\
NAME T
ROWS
 N  OBJ
 G  R1
COLUMNS
    X1        R1        1.0
    MARK1     'MARKER'  'INTORG'
    Y1        R1        1.0
    MARK2     'MARKER'  'INTEND'
    X2        R1        1.0
ENDATA
";
        let p = parse(text);
        assert!(!p.cols[0].integer);
        assert!(p.cols[1].integer);
        assert!(!p.cols[2].integer);
    }

    #[test]
    fn test_free_and_fixed_bounds() {
        let text = "\
NAME T
ROWS
 N  OBJ
 G  R1
COLUMNS
    X1        R1        1.0
    X2        R1        1.0
    X3        R1        1.0
BOUNDS
 FR BND       X1
 FX BND       X2        3.5
 MI BND       X3
ENDATA
";
        let p = parse(text);
        assert_eq!(p.cols[0].bnd_lo, -PLINFY);
        assert_eq!(p.cols[0].bnd_up, PLINFY);
        assert_eq!(p.cols[1].bnd_lo, 3.5);
        assert_eq!(p.cols[1].bnd_up, 3.5);
        assert_eq!(p.cols[2].bnd_lo, -PLINFY);
        assert_eq!(p.cols[2].bnd_up, PLINFY);
    }

    #[test]
    fn test_semi_continuous_policy() {
        let text = "\
NAME T
ROWS
 N  OBJ
 G  R1
COLUMNS
    X1        R1        1.0
BOUNDS
 SC BND       X1        4.0
ENDATA
";
        let p = parse(text);
        assert_eq!(p.cols[0].bnd_lo, 1.0);
        assert_eq!(p.cols[0].bnd_up, 4.0);
    }

    #[test]
    fn test_second_bound_set_ignored() {
        let text = "\
NAME T
ROWS
 N  OBJ
 G  R1
COLUMNS
    X1        R1        1.0
BOUNDS
 UP BND1      X1        5.0
 UP BND2      X1        99.0
ENDATA
";
        let p = parse(text);
        assert_eq!(p.cols[0].bnd_up, 5.0);
    }

    #[test]
    fn test_unknown_row_in_columns_is_error() {
        let text = "\
NAME T
ROWS
 N  OBJ
COLUMNS
    X1        NOSUCH    1.0
ENDATA
";
        assert!(parse_reader(Cursor::new(text), "t", PLINFY).is_err());
    }

    #[test]
    fn test_into_model() {
        let p = parse(SAMPLE);
        let model = p.into_model(1e-6).unwrap();
        assert_eq!(model.n_rows(), 4);
        assert_eq!(model.n_cols(), 2);
        // R1: 2x1 + x2 has grad_len_sq 5.
        assert_eq!(model.rows[1].grad_len_sq, 5.0);
    }
}

//! MPS reading and writing, fixed and free format.
//!
//! The fixed format uses the classic 80-column fields at (1,2), (4,8),
//! (14,8), (24,12), (39,8), (49,12) (0-based start, width); the free
//! format splits on whitespace, which means it cannot represent names
//! containing spaces. Reading a file in free form falls back to the fixed
//! reader when the token stream does not parse.
//!
//! Sections handled: NAME, ROWS, COLUMNS (with INTORG/INTEND markers),
//! RHS, RANGES, BOUNDS, ENDATA. Row types N/E/L/G; bound types
//! UP/LO/FX/FR/MI/PL/BV/LI/UI. The first N row is the objective; further
//! N rows are kept as free rows only when `keep_n_rows` is set.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::io::messages::{MessageSink, MessageType};
use crate::io::{ReadError, WriteError};
use crate::model::{Integrality, Lp};
use crate::options::{MpsParserType, SolverOptions};

const FIXED_FIELDS: [(usize, usize); 6] = [(1, 2), (4, 8), (14, 8), (24, 12), (39, 8), (49, 12)];

/// Read an MPS file, dispatching on the configured parser type.
pub fn read_mps(
    path: &Path,
    options: &SolverOptions,
    sink: &mut MessageSink,
) -> Result<Lp, ReadError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReadError::FileNotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    match options.mps_parser_type {
        MpsParserType::Fixed => parse_mps_fixed(&text, options.keep_n_rows, sink),
        MpsParserType::Free => match parse_mps_free(&text, options.keep_n_rows, sink) {
            Ok(lp) => Ok(lp),
            Err(free_error) => {
                sink.log(
                    MessageType::Info,
                    &format!(
                        "free-format MPS parse failed ({}); retrying fixed format",
                        free_error
                    ),
                );
                parse_mps_fixed(&text, options.keep_n_rows, sink)
            }
        },
    }
}

/// Write an MPS file; `use_free_format` selects the writer.
pub fn write_mps(lp: &Lp, path: &Path, use_free_format: bool) -> Result<(), WriteError> {
    let text = write_mps_string(lp, use_free_format)?;
    let mut file = fs::File::create(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

// ----- parsing ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Rows,
    Columns,
    Rhs,
    Ranges,
    Bounds,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowType {
    Free,
    Equal,
    LessEqual,
    GreaterEqual,
}

struct MpsBuilder {
    lp: Lp,
    keep_n_rows: bool,
    objective_row: Option<String>,
    row_type: Vec<RowType>,
    row_index: HashMap<String, usize>,
    col_index: HashMap<String, usize>,
    /// Rows of the current column under construction.
    integer_mode: bool,
    current_col: Option<usize>,
    /// Explicit bound sections seen per column, to apply MPS defaulting.
    has_lower_bound: Vec<bool>,
}

impl MpsBuilder {
    fn new(keep_n_rows: bool) -> Self {
        let mut lp = Lp::default();
        lp.a_start.push(0);
        MpsBuilder {
            lp,
            keep_n_rows,
            objective_row: None,
            row_type: Vec::new(),
            row_index: HashMap::new(),
            col_index: HashMap::new(),
            integer_mode: false,
            current_col: None,
            has_lower_bound: Vec::new(),
        }
    }

    fn add_row(&mut self, ty: char, name: &str, line: usize) -> Result<(), ReadError> {
        let row_type = match ty {
            'N' | 'n' => {
                if self.objective_row.is_none() {
                    self.objective_row = Some(name.to_string());
                    return Ok(());
                }
                if !self.keep_n_rows {
                    return Ok(());
                }
                RowType::Free
            }
            'E' | 'e' => RowType::Equal,
            'L' | 'l' => RowType::LessEqual,
            'G' | 'g' => RowType::GreaterEqual,
            other => {
                return Err(ReadError::Parse {
                    line,
                    message: format!("unknown row type '{}'", other),
                })
            }
        };
        let index = self.lp.num_row;
        self.row_index.insert(name.to_string(), index);
        self.row_type.push(row_type);
        self.lp.row_names.push(name.to_string());
        let (lower, upper) = match row_type {
            RowType::Free => (f64::NEG_INFINITY, f64::INFINITY),
            RowType::Equal => (0.0, 0.0),
            RowType::LessEqual => (f64::NEG_INFINITY, 0.0),
            RowType::GreaterEqual => (0.0, f64::INFINITY),
        };
        self.lp.row_lower.push(lower);
        self.lp.row_upper.push(upper);
        self.lp.num_row += 1;
        Ok(())
    }

    fn column(&mut self, name: &str) -> usize {
        if let Some(&j) = self.col_index.get(name) {
            return j;
        }
        let j = self.lp.num_col;
        self.col_index.insert(name.to_string(), j);
        self.lp.col_names.push(name.to_string());
        self.lp.col_cost.push(0.0);
        self.lp.col_lower.push(0.0);
        self.lp.col_upper.push(f64::INFINITY);
        self.lp.a_start.push(self.lp.num_nz());
        self.lp
            .integrality
            .push(if self.integer_mode {
                self.lp.num_int += 1;
                Integrality::Integer
            } else {
                Integrality::Continuous
            });
        self.has_lower_bound.push(false);
        self.lp.num_col += 1;
        j
    }

    fn add_coefficient(
        &mut self,
        col_name: &str,
        row_name: &str,
        value: f64,
        line: usize,
    ) -> Result<(), ReadError> {
        let j = self.column(col_name);
        if let Some(prev) = self.current_col {
            if j != prev && j != self.lp.num_col - 1 {
                return Err(ReadError::Parse {
                    line,
                    message: format!("column '{}' split across COLUMNS section", col_name),
                });
            }
        }
        self.current_col = Some(j);
        if Some(row_name) == self.objective_row.as_deref() {
            self.lp.col_cost[j] = value;
            return Ok(());
        }
        let Some(&i) = self.row_index.get(row_name) else {
            // Coefficients for dropped N rows are silently ignored.
            return Ok(());
        };
        self.lp.a_index.push(i);
        self.lp.a_value.push(value);
        *self.lp.a_start.last_mut().unwrap() = self.lp.num_nz();
        Ok(())
    }

    fn add_rhs(&mut self, row_name: &str, value: f64) {
        if Some(row_name) == self.objective_row.as_deref() {
            // The objective RHS carries the negated constant term.
            self.lp.offset = -value;
            return;
        }
        let Some(&i) = self.row_index.get(row_name) else {
            return;
        };
        match self.row_type[i] {
            RowType::Equal => {
                self.lp.row_lower[i] = value;
                self.lp.row_upper[i] = value;
            }
            RowType::LessEqual => self.lp.row_upper[i] = value,
            RowType::GreaterEqual => self.lp.row_lower[i] = value,
            RowType::Free => {}
        }
    }

    fn add_range(&mut self, row_name: &str, value: f64) {
        let Some(&i) = self.row_index.get(row_name) else {
            return;
        };
        match self.row_type[i] {
            RowType::Equal => {
                if value >= 0.0 {
                    self.lp.row_upper[i] = self.lp.row_lower[i] + value;
                } else {
                    self.lp.row_lower[i] += value;
                }
            }
            RowType::LessEqual => self.lp.row_lower[i] = self.lp.row_upper[i] - value.abs(),
            RowType::GreaterEqual => self.lp.row_upper[i] = self.lp.row_lower[i] + value.abs(),
            RowType::Free => {}
        }
    }

    fn add_bound(
        &mut self,
        bound_type: &str,
        col_name: &str,
        value: Option<f64>,
        line: usize,
        sink: &mut MessageSink,
    ) -> Result<(), ReadError> {
        let Some(&j) = self.col_index.get(col_name) else {
            return Err(ReadError::Parse {
                line,
                message: format!("bound for unknown column '{}'", col_name),
            });
        };
        let need = |value: Option<f64>| {
            value.ok_or(ReadError::Parse {
                line,
                message: format!("bound type {} requires a value", bound_type),
            })
        };
        match bound_type.to_ascii_uppercase().as_str() {
            "UP" => {
                let v = need(value)?;
                self.lp.col_upper[j] = v;
                if v < 0.0 && !self.has_lower_bound[j] {
                    sink.log(
                        MessageType::Warning,
                        &format!(
                            "negative UP bound on column '{}' with zero lower bound",
                            col_name
                        ),
                    );
                    self.lp.col_lower[j] = f64::NEG_INFINITY;
                }
            }
            "LO" => {
                self.lp.col_lower[j] = need(value)?;
                self.has_lower_bound[j] = true;
            }
            "FX" => {
                let v = need(value)?;
                self.lp.col_lower[j] = v;
                self.lp.col_upper[j] = v;
                self.has_lower_bound[j] = true;
            }
            "FR" => {
                self.lp.col_lower[j] = f64::NEG_INFINITY;
                self.lp.col_upper[j] = f64::INFINITY;
            }
            "MI" => {
                self.lp.col_lower[j] = f64::NEG_INFINITY;
                self.has_lower_bound[j] = true;
            }
            "PL" => self.lp.col_upper[j] = f64::INFINITY,
            "BV" => {
                self.mark_integer(j);
                self.lp.col_lower[j] = 0.0;
                self.lp.col_upper[j] = 1.0;
            }
            "LI" => {
                self.mark_integer(j);
                self.lp.col_lower[j] = need(value)?;
                self.has_lower_bound[j] = true;
            }
            "UI" => {
                self.mark_integer(j);
                self.lp.col_upper[j] = need(value)?;
            }
            other => {
                return Err(ReadError::Parse {
                    line,
                    message: format!("unknown bound type '{}'", other),
                })
            }
        }
        Ok(())
    }

    fn mark_integer(&mut self, j: usize) {
        if self.lp.integrality[j] != Integrality::Integer {
            self.lp.integrality[j] = Integrality::Integer;
            self.lp.num_int += 1;
        }
    }

    fn finish(mut self, line: usize) -> Result<Lp, ReadError> {
        if self.lp.integrality.iter().all(|&m| m == Integrality::Continuous) {
            self.lp.integrality.clear();
        }
        self.lp.validate().map_err(|e| ReadError::Parse {
            line,
            message: e.to_string(),
        })?;
        Ok(self.lp)
    }
}

fn warn_on_space(name: &str, line: usize, sink: &mut MessageSink) {
    if name.trim().contains(' ') {
        sink.log(
            MessageType::Warning,
            &format!("name '{}' at line {} contains spaces", name.trim(), line),
        );
    }
}

fn parse_value(token: &str, line: usize) -> Result<f64, ReadError> {
    token.trim().parse::<f64>().map_err(|_| ReadError::Parse {
        line,
        message: format!("bad numeric value '{}'", token.trim()),
    })
}

fn section_of(token: &str) -> Option<Section> {
    match token.to_ascii_uppercase().as_str() {
        "ROWS" => Some(Section::Rows),
        "COLUMNS" => Some(Section::Columns),
        "RHS" => Some(Section::Rhs),
        "RANGES" => Some(Section::Ranges),
        "BOUNDS" => Some(Section::Bounds),
        "ENDATA" => Some(Section::Done),
        _ => None,
    }
}

/// Free-format parser: whitespace-delimited tokens.
pub fn parse_mps_free(
    text: &str,
    keep_n_rows: bool,
    sink: &mut MessageSink,
) -> Result<Lp, ReadError> {
    let mut builder = MpsBuilder::new(keep_n_rows);
    let mut section = Section::None;
    let mut line_number = 0;

    for raw in text.lines() {
        line_number += 1;
        let line = raw.trim_end();
        if line.is_empty() || line.starts_with('*') {
            continue;
        }
        let starts_section = !raw.starts_with(' ') && !raw.starts_with('\t');
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if starts_section {
            let keyword = tokens[0];
            if keyword.eq_ignore_ascii_case("NAME") {
                builder.lp.model_name = tokens.get(1).unwrap_or(&"").to_string();
                continue;
            }
            match section_of(keyword) {
                Some(Section::Done) => {
                    section = Section::Done;
                    break;
                }
                Some(s) => {
                    section = s;
                    continue;
                }
                None => {
                    return Err(ReadError::Parse {
                        line: line_number,
                        message: format!("unknown section '{}'", keyword),
                    })
                }
            }
        }

        match section {
            Section::Rows => {
                if tokens.len() != 2 {
                    return Err(ReadError::Parse {
                        line: line_number,
                        message: "ROWS lines have two fields".into(),
                    });
                }
                builder.add_row(tokens[0].chars().next().unwrap(), tokens[1], line_number)?;
            }
            Section::Columns => {
                if tokens.len() >= 3 && tokens[1].eq_ignore_ascii_case("'MARKER'") {
                    match tokens[2].to_ascii_uppercase().as_str() {
                        "'INTORG'" => builder.integer_mode = true,
                        "'INTEND'" => builder.integer_mode = false,
                        other => {
                            return Err(ReadError::Parse {
                                line: line_number,
                                message: format!("unknown marker '{}'", other),
                            })
                        }
                    }
                    continue;
                }
                if tokens.len() != 3 && tokens.len() != 5 {
                    return Err(ReadError::Parse {
                        line: line_number,
                        message: "COLUMNS lines have one or two row/value pairs".into(),
                    });
                }
                let col = tokens[0];
                let mut k = 1;
                while k < tokens.len() {
                    let value = parse_value(tokens[k + 1], line_number)?;
                    builder.add_coefficient(col, tokens[k], value, line_number)?;
                    k += 2;
                }
            }
            Section::Rhs => {
                apply_pairs(&tokens, line_number, |row, value| {
                    builder.add_rhs(row, value);
                    Ok(())
                })?;
            }
            Section::Ranges => {
                apply_pairs(&tokens, line_number, |row, value| {
                    builder.add_range(row, value);
                    Ok(())
                })?;
            }
            Section::Bounds => {
                if tokens.len() < 3 {
                    return Err(ReadError::Parse {
                        line: line_number,
                        message: "BOUNDS lines have at least three fields".into(),
                    });
                }
                let value = if tokens.len() >= 4 {
                    Some(parse_value(tokens[3], line_number)?)
                } else {
                    None
                };
                builder.add_bound(tokens[0], tokens[2], value, line_number, sink)?;
            }
            Section::None | Section::Done => {
                return Err(ReadError::Parse {
                    line: line_number,
                    message: "data before any section header".into(),
                })
            }
        }
    }
    if section != Section::Done {
        return Err(ReadError::Parse {
            line: line_number,
            message: "missing ENDATA".into(),
        });
    }
    builder.finish(line_number)
}

/// RHS/RANGES lines: a set name followed by one or two (row, value) pairs.
fn apply_pairs(
    tokens: &[&str],
    line: usize,
    mut apply: impl FnMut(&str, f64) -> Result<(), ReadError>,
) -> Result<(), ReadError> {
    if tokens.len() != 3 && tokens.len() != 5 {
        return Err(ReadError::Parse {
            line,
            message: "expected one or two row/value pairs".into(),
        });
    }
    let mut k = 1;
    while k < tokens.len() {
        let value = tokens[k + 1].trim().parse::<f64>().map_err(|_| ReadError::Parse {
            line,
            message: format!("bad numeric value '{}'", tokens[k + 1]),
        })?;
        apply(tokens[k], value)?;
        k += 2;
    }
    Ok(())
}

fn fixed_field(line: &str, field: usize) -> &str {
    let (start, width) = FIXED_FIELDS[field];
    if start >= line.len() {
        return "";
    }
    let end = (start + width).min(line.len());
    line[start..end].trim()
}

/// Fixed-format parser: 80-column field positions.
pub fn parse_mps_fixed(
    text: &str,
    keep_n_rows: bool,
    sink: &mut MessageSink,
) -> Result<Lp, ReadError> {
    let mut builder = MpsBuilder::new(keep_n_rows);
    let mut section = Section::None;
    let mut line_number = 0;

    for raw in text.lines() {
        line_number += 1;
        let line = raw.trim_end();
        if line.is_empty() || line.starts_with('*') {
            continue;
        }
        if !raw.starts_with(' ') && !raw.starts_with('\t') {
            let keyword = line.split_whitespace().next().unwrap_or("");
            if keyword.eq_ignore_ascii_case("NAME") {
                builder.lp.model_name = line[4..].trim().to_string();
                continue;
            }
            match section_of(keyword) {
                Some(Section::Done) => {
                    section = Section::Done;
                    break;
                }
                Some(s) => {
                    section = s;
                    continue;
                }
                None => {
                    return Err(ReadError::Parse {
                        line: line_number,
                        message: format!("unknown section '{}'", keyword),
                    })
                }
            }
        }

        match section {
            Section::Rows => {
                let ty = fixed_field(line, 0);
                let name = fixed_field(line, 1);
                warn_on_space(name, line_number, sink);
                if ty.is_empty() || name.is_empty() {
                    return Err(ReadError::Parse {
                        line: line_number,
                        message: "ROWS line missing type or name".into(),
                    });
                }
                builder.add_row(ty.chars().next().unwrap(), name, line_number)?;
            }
            Section::Columns => {
                let col = fixed_field(line, 1);
                if fixed_field(line, 2).eq_ignore_ascii_case("'MARKER'") {
                    let marker = fixed_field(line, 4);
                    match marker.to_ascii_uppercase().as_str() {
                        "'INTORG'" => builder.integer_mode = true,
                        "'INTEND'" => builder.integer_mode = false,
                        other => {
                            return Err(ReadError::Parse {
                                line: line_number,
                                message: format!("unknown marker '{}'", other),
                            })
                        }
                    }
                    continue;
                }
                warn_on_space(col, line_number, sink);
                let row1 = fixed_field(line, 2);
                let value1 = parse_value(fixed_field(line, 3), line_number)?;
                builder.add_coefficient(col, row1, value1, line_number)?;
                let row2 = fixed_field(line, 4);
                if !row2.is_empty() {
                    let value2 = parse_value(fixed_field(line, 5), line_number)?;
                    builder.add_coefficient(col, row2, value2, line_number)?;
                }
            }
            Section::Rhs => {
                let row1 = fixed_field(line, 2);
                let value1 = parse_value(fixed_field(line, 3), line_number)?;
                builder.add_rhs(row1, value1);
                let row2 = fixed_field(line, 4);
                if !row2.is_empty() {
                    let value2 = parse_value(fixed_field(line, 5), line_number)?;
                    builder.add_rhs(row2, value2);
                }
            }
            Section::Ranges => {
                let row1 = fixed_field(line, 2);
                let value1 = parse_value(fixed_field(line, 3), line_number)?;
                builder.add_range(row1, value1);
                let row2 = fixed_field(line, 4);
                if !row2.is_empty() {
                    let value2 = parse_value(fixed_field(line, 5), line_number)?;
                    builder.add_range(row2, value2);
                }
            }
            Section::Bounds => {
                let bound_type = fixed_field(line, 0);
                let col = fixed_field(line, 2);
                warn_on_space(col, line_number, sink);
                let value_field = fixed_field(line, 3);
                let value = if value_field.is_empty() {
                    None
                } else {
                    Some(parse_value(value_field, line_number)?)
                };
                builder.add_bound(bound_type, col, value, line_number, sink)?;
            }
            Section::None | Section::Done => {
                return Err(ReadError::Parse {
                    line: line_number,
                    message: "data before any section header".into(),
                })
            }
        }
    }
    if section != Section::Done {
        return Err(ReadError::Parse {
            line: line_number,
            message: "missing ENDATA".into(),
        });
    }
    builder.finish(line_number)
}

// ----- writing ---------------------------------------------------------

/// Render an LP as MPS text. Fixed format rejects names longer than eight
/// characters; empty names get "C"/"R" prefixes in both formats.
pub fn write_mps_string(lp: &Lp, use_free_format: bool) -> Result<String, WriteError> {
    let col_name = |j: usize| -> String {
        match lp.col_names.get(j) {
            Some(name) if !name.is_empty() && name.len() <= 8 => name.clone(),
            _ => format!("C{}", j),
        }
    };
    let row_name = |i: usize| -> String {
        match lp.row_names.get(i) {
            Some(name) if !name.is_empty() && name.len() <= 8 => name.clone(),
            _ => format!("R{}", i),
        }
    };
    if !use_free_format {
        for name in lp.col_names.iter().chain(lp.row_names.iter()) {
            if name.len() > 8 {
                return Err(WriteError::NameTooLong(name.clone()));
            }
        }
    }

    let mut out = String::new();
    let name = if lp.model_name.is_empty() {
        "BLANK"
    } else {
        &lp.model_name
    };
    out.push_str(&format!("NAME        {}\n", name));

    out.push_str("ROWS\n");
    out.push_str(" N  COST\n");
    for i in 0..lp.num_row {
        let ty = if lp.row_lower[i] == lp.row_upper[i] {
            'E'
        } else if lp.row_lower[i] == f64::NEG_INFINITY && lp.row_upper[i] == f64::INFINITY {
            'N'
        } else if lp.row_upper[i] < f64::INFINITY {
            'L'
        } else {
            'G'
        };
        out.push_str(&format!(" {}  {}\n", ty, row_name(i)));
    }

    out.push_str("COLUMNS\n");
    let mut in_integer = false;
    let mut marker = 0usize;
    for j in 0..lp.num_col {
        let integer = lp
            .integrality
            .get(j)
            .map_or(false, |&m| m == Integrality::Integer);
        if integer != in_integer {
            let kind = if integer { "'INTORG'" } else { "'INTEND'" };
            out.push_str(&marker_line(marker, kind));
            marker += 1;
            in_integer = integer;
        }
        if lp.col_cost[j] != 0.0 {
            out.push_str(&format!(
                "    {:<8}  {:<8}  {}\n",
                col_name(j),
                "COST",
                format_value(lp.col_cost[j])
            ));
        }
        let (index, value) = lp.col(j);
        for (&i, &v) in index.iter().zip(value) {
            out.push_str(&format!(
                "    {:<8}  {:<8}  {}\n",
                col_name(j),
                row_name(i),
                format_value(v)
            ));
        }
    }
    if in_integer {
        out.push_str(&marker_line(marker, "'INTEND'"));
    }

    out.push_str("RHS\n");
    if lp.offset != 0.0 {
        out.push_str(&format!(
            "    RHS       {:<8}  {}\n",
            "COST",
            format_value(-lp.offset)
        ));
    }
    for i in 0..lp.num_row {
        let rhs = if lp.row_lower[i] == lp.row_upper[i] {
            lp.row_lower[i]
        } else if lp.row_upper[i] < f64::INFINITY {
            lp.row_upper[i]
        } else if lp.row_lower[i] > f64::NEG_INFINITY {
            lp.row_lower[i]
        } else {
            continue;
        };
        if rhs != 0.0 {
            out.push_str(&format!(
                "    RHS       {:<8}  {}\n",
                row_name(i),
                format_value(rhs)
            ));
        }
    }

    let mut ranges = String::new();
    for i in 0..lp.num_row {
        if lp.row_lower[i] != lp.row_upper[i]
            && lp.row_lower[i] > f64::NEG_INFINITY
            && lp.row_upper[i] < f64::INFINITY
        {
            let range = lp.row_upper[i] - lp.row_lower[i];
            ranges.push_str(&format!(
                "    RANGE     {:<8}  {}\n",
                row_name(i),
                format_value(range)
            ));
        }
    }
    if !ranges.is_empty() {
        out.push_str("RANGES\n");
        out.push_str(&ranges);
    }

    let mut bounds = String::new();
    for j in 0..lp.num_col {
        let (lower, upper) = (lp.col_lower[j], lp.col_upper[j]);
        if lower == 0.0 && upper == f64::INFINITY {
            continue;
        }
        if lower == upper {
            bounds.push_str(&bound_line("FX", &col_name(j), Some(lower)));
        } else if lower == f64::NEG_INFINITY && upper == f64::INFINITY {
            bounds.push_str(&bound_line("FR", &col_name(j), None));
        } else {
            if lower == f64::NEG_INFINITY {
                bounds.push_str(&bound_line("MI", &col_name(j), None));
            } else if lower != 0.0 {
                bounds.push_str(&bound_line("LO", &col_name(j), Some(lower)));
            }
            if upper < f64::INFINITY {
                bounds.push_str(&bound_line("UP", &col_name(j), Some(upper)));
            }
        }
    }
    if !bounds.is_empty() {
        out.push_str("BOUNDS\n");
        out.push_str(&bounds);
    }

    out.push_str("ENDATA\n");
    Ok(out)
}

/// Marker lines carry 'MARKER' in the row-name field and the kind in the
/// second row-name field, so both readers recognise them.
fn marker_line(marker: usize, kind: &str) -> String {
    format!(
        "    {:<8}  {:<8}  {:<12}   {}\n",
        format!("MARKER{}", marker),
        "'MARKER'",
        "",
        kind
    )
}

fn bound_line(ty: &str, col: &str, value: Option<f64>) -> String {
    match value {
        Some(v) => format!(" {} BND       {:<8}  {}\n", ty, col, format_value(v)),
        None => format!(" {} BND       {:<8}\n", ty, col),
    }
}

fn format_value(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v)
    } else {
        format!("{:.12e}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::messages::MessageSink;
    use crate::model::ObjSense;

    const SMALL_MPS: &str = "\
NAME        SMALL
ROWS
 N  COST
 L  R1
 G  R2
 E  R3
COLUMNS
    X         COST      1.0   R1        2.0
    X         R2        1.0
    Y         COST      -1.0
    Y         R1        1.0   R3        3.0
RHS
    RHS       R1        10.0  R2        2.0
    RHS       R3        6.0
RANGES
    RANGE     R1        4.0
BOUNDS
 UP BND       X         8.0
 MI BND       Y
ENDATA
";

    fn read_free(text: &str) -> Lp {
        parse_mps_free(text, false, &mut MessageSink::quiet()).unwrap()
    }

    #[test]
    fn test_parse_free_small() {
        let lp = read_free(SMALL_MPS);
        assert_eq!(lp.model_name, "SMALL");
        assert_eq!(lp.num_col, 2);
        assert_eq!(lp.num_row, 3);
        assert_eq!(lp.num_nz(), 4);
        assert_eq!(lp.col_cost, vec![1.0, -1.0]);
        // L row with a range becomes boxed.
        assert_eq!(lp.row_lower[0], 6.0);
        assert_eq!(lp.row_upper[0], 10.0);
        assert_eq!(lp.row_lower[1], 2.0);
        assert_eq!(lp.row_upper[1], f64::INFINITY);
        assert_eq!((lp.row_lower[2], lp.row_upper[2]), (6.0, 6.0));
        assert_eq!(lp.col_upper[0], 8.0);
        assert_eq!(lp.col_lower[1], f64::NEG_INFINITY);
    }

    #[test]
    fn test_parse_missing_endata() {
        let text = "NAME X\nROWS\n N  COST\n";
        assert!(matches!(
            parse_mps_free(text, false, &mut MessageSink::quiet()),
            Err(ReadError::Parse { .. })
        ));
    }

    #[test]
    fn test_keep_n_rows_toggle() {
        let text = "\
NAME        FREEROW
ROWS
 N  COST
 N  FREEBIE
 L  R1
COLUMNS
    X         COST      1.0   R1        1.0
    X         FREEBIE   2.0
RHS
    RHS       R1        5.0
ENDATA
";
        let without = parse_mps_free(text, false, &mut MessageSink::quiet()).unwrap();
        assert_eq!(without.num_row, 1);
        assert_eq!(without.num_nz(), 1);
        let with = parse_mps_free(text, true, &mut MessageSink::quiet()).unwrap();
        assert_eq!(with.num_row, 2);
        assert_eq!(with.num_nz(), 2);
        assert_eq!(with.row_lower[0], f64::NEG_INFINITY);
        assert_eq!(with.row_upper[0], f64::INFINITY);
    }

    #[test]
    fn test_integer_markers() {
        let text = "\
NAME        INTS
ROWS
 N  COST
 G  R1
COLUMNS
    X         COST      1.0   R1        1.0
    MARKER0                 'MARKER'                 'INTORG'
    Z         COST      2.0   R1        1.0
    MARKER1                 'MARKER'                 'INTEND'
RHS
    RHS       R1        1.0
ENDATA
";
        let lp = read_free(text);
        assert_eq!(lp.num_int, 1);
        assert_eq!(lp.integrality[0], Integrality::Continuous);
        assert_eq!(lp.integrality[1], Integrality::Integer);
    }

    #[test]
    fn test_objective_offset() {
        let text = "\
NAME        OFFS
ROWS
 N  COST
 G  R1
COLUMNS
    X         COST      1.0   R1        1.0
RHS
    RHS       COST      -2.5  R1        1.0
ENDATA
";
        let lp = read_free(text);
        assert_eq!(lp.offset, 2.5);
    }

    #[test]
    fn test_fixed_format_positions() {
        // Build data lines at the exact fixed field positions:
        // (1,2), (4,8), (14,8), (24,12), (39,8), (49,12).
        let two_pairs = format!(
            "    {:<8}  {:<8}  {:<12}   {:<8}  {}",
            "X", "COST", "1.0", "R1", "2.0"
        );
        let rhs = format!("    {:<8}  {:<8}  {}", "RHS", "R1", "10.0");
        let bound = format!(" UP {:<8}  {:<8}  {}", "BND", "X", "8.0");
        let text = format!(
            "NAME        FIX\nROWS\n N  COST\n L  R1\nCOLUMNS\n{}\nRHS\n{}\nBOUNDS\n{}\nENDATA\n",
            two_pairs, rhs, bound
        );
        let lp = parse_mps_fixed(&text, false, &mut MessageSink::quiet()).unwrap();
        assert_eq!(lp.num_col, 1);
        assert_eq!(lp.col_cost, vec![1.0]);
        assert_eq!(lp.a_value, vec![2.0]);
        assert_eq!(lp.col_upper, vec![8.0]);
        assert_eq!(lp.row_upper, vec![10.0]);
    }

    #[test]
    fn test_writer_output_parses_as_fixed() {
        let mut lp = Lp::with_dims(2, 1);
        lp.model_name = "FXRT".into();
        lp.a_start = vec![0, 1, 2];
        lp.a_index = vec![0, 0];
        lp.a_value = vec![1.0, 2.0];
        lp.col_cost = vec![1.0, 0.0];
        lp.col_upper = vec![3.0, f64::INFINITY];
        lp.row_upper = vec![4.0];
        lp.col_names = vec!["X1".into(), "X2".into()];
        lp.row_names = vec!["R1".into()];
        let text = write_mps_string(&lp, false).unwrap();
        let read = parse_mps_fixed(&text, false, &mut MessageSink::quiet()).unwrap();
        assert_eq!(read, lp);
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut lp = Lp::with_dims(2, 2);
        lp.model_name = "RT".into();
        lp.a_start = vec![0, 2, 3];
        lp.a_index = vec![0, 1, 0];
        lp.a_value = vec![1.0, 2.0, 3.0];
        lp.col_cost = vec![1.5, -1.0];
        lp.col_lower = vec![0.0, -2.0];
        lp.col_upper = vec![4.0, f64::INFINITY];
        lp.row_lower = vec![1.0, 0.0];
        lp.row_upper = vec![5.0, 0.0];
        lp.col_names = vec!["X1".into(), "X2".into()];
        lp.row_names = vec!["R1".into(), "R2".into()];

        let text = write_mps_string(&lp, true).unwrap();
        let read = read_free(&text);
        assert_eq!(read, lp);
    }

    #[test]
    fn test_round_trip_with_offset_and_integers() {
        let mut lp = Lp::with_dims(2, 1);
        lp.model_name = "RTI".into();
        lp.a_start = vec![0, 1, 2];
        lp.a_index = vec![0, 0];
        lp.a_value = vec![1.0, 1.0];
        lp.col_cost = vec![1.0, 2.0];
        lp.col_upper = vec![3.0, 7.0];
        lp.row_lower = vec![f64::NEG_INFINITY];
        lp.row_upper = vec![4.0];
        lp.offset = -1.25;
        lp.num_int = 1;
        lp.integrality = vec![Integrality::Continuous, Integrality::Integer];
        lp.col_names = vec!["A".into(), "B".into()];
        lp.row_names = vec!["R".into()];

        let text = write_mps_string(&lp, true).unwrap();
        let read = read_free(&text);
        assert_eq!(read, lp);
    }

    #[test]
    fn test_fixed_writer_rejects_long_names() {
        let mut lp = Lp::with_dims(1, 0);
        lp.col_names = vec!["AVERYLONGNAME".into()];
        assert!(matches!(
            write_mps_string(&lp, false),
            Err(WriteError::NameTooLong(_))
        ));
        // The free writer accepts it.
        assert!(write_mps_string(&lp, true).is_ok());
    }

    #[test]
    fn test_sense_default_minimise() {
        let lp = read_free(SMALL_MPS);
        assert_eq!(lp.sense, ObjSense::Minimise);
    }
}

//! EMS reading and writing: a flat keyword-tagged dump of the model
//! arrays.
//!
//! Layout, in order: dimensions (`n_rows`, `n_columns`,
//! `n_matrix_elements`), `sense`, `offset`, `matrix` (start, index, value
//! arrays), `column_bounds`, `row_bounds`, `column_costs`, then optional
//! `integer_columns` and `names`, closed by `end`. Infinities are written
//! as `inf` / `-inf`.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::io::{ReadError, WriteError};
use crate::model::{Integrality, Lp, ObjSense};

/// Read a model from an EMS file.
pub fn read_ems(path: &Path) -> Result<Lp, ReadError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReadError::FileNotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    parse_ems(&text)
}

/// Write a model to an EMS file.
pub fn write_ems(lp: &Lp, path: &Path) -> Result<(), WriteError> {
    let mut file = fs::File::create(path)?;
    file.write_all(write_ems_string(lp).as_bytes())?;
    Ok(())
}

struct Lines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Lines {
            lines: text.lines().enumerate(),
        }
    }

    fn next_content(&mut self) -> Result<(usize, &'a str), ReadError> {
        for (n, line) in self.lines.by_ref() {
            let line = line.trim();
            if !line.is_empty() {
                return Ok((n + 1, line));
            }
        }
        Err(ReadError::Parse {
            line: 0,
            message: "unexpected end of EMS file".into(),
        })
    }

    fn expect(&mut self, keyword: &str) -> Result<(), ReadError> {
        let (line, content) = self.next_content()?;
        if content != keyword {
            return Err(ReadError::Parse {
                line,
                message: format!("expected '{}', found '{}'", keyword, content),
            });
        }
        Ok(())
    }

    fn usize_line(&mut self) -> Result<usize, ReadError> {
        let (line, content) = self.next_content()?;
        content.parse::<usize>().map_err(|_| ReadError::Parse {
            line,
            message: format!("expected an integer, found '{}'", content),
        })
    }

    fn usize_vec(&mut self, expected: usize) -> Result<Vec<usize>, ReadError> {
        if expected == 0 {
            return Ok(Vec::new());
        }
        let (line, content) = self.next_content()?;
        let parsed: Result<Vec<usize>, _> =
            content.split_whitespace().map(|t| t.parse()).collect();
        let parsed = parsed.map_err(|_| ReadError::Parse {
            line,
            message: "bad integer array".into(),
        })?;
        if parsed.len() != expected {
            return Err(ReadError::Parse {
                line,
                message: format!("expected {} integers, found {}", expected, parsed.len()),
            });
        }
        Ok(parsed)
    }

    fn f64_vec(&mut self, expected: usize) -> Result<Vec<f64>, ReadError> {
        if expected == 0 {
            return Ok(Vec::new());
        }
        let (line, content) = self.next_content()?;
        let parsed: Result<Vec<f64>, ()> = content
            .split_whitespace()
            .map(|t| match t {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => other.parse::<f64>().map_err(|_| ()),
            })
            .collect();
        let parsed = parsed.map_err(|_| ReadError::Parse {
            line,
            message: "bad numeric array".into(),
        })?;
        if parsed.len() != expected {
            return Err(ReadError::Parse {
                line,
                message: format!("expected {} values, found {}", expected, parsed.len()),
            });
        }
        Ok(parsed)
    }
}

/// Parse EMS text into a model.
pub fn parse_ems(text: &str) -> Result<Lp, ReadError> {
    let mut lines = Lines::new(text);
    let mut lp = Lp::default();

    lines.expect("n_rows")?;
    lp.num_row = lines.usize_line()?;
    lines.expect("n_columns")?;
    lp.num_col = lines.usize_line()?;
    lines.expect("n_matrix_elements")?;
    let nnz = lines.usize_line()?;

    lines.expect("sense")?;
    let (line, sense) = lines.next_content()?;
    lp.sense = match sense {
        "min" => ObjSense::Minimise,
        "max" => ObjSense::Maximise,
        other => {
            return Err(ReadError::Parse {
                line,
                message: format!("unknown sense '{}'", other),
            })
        }
    };
    lines.expect("offset")?;
    lp.offset = lines.f64_vec(1)?[0];

    lines.expect("matrix")?;
    lp.a_start = if lp.num_col == 0 {
        vec![0]
    } else {
        lines.usize_vec(lp.num_col + 1)?
    };
    lp.a_index = lines.usize_vec(nnz)?;
    lp.a_value = lines.f64_vec(nnz)?;

    lines.expect("column_bounds")?;
    lp.col_lower = lines.f64_vec(lp.num_col)?;
    lp.col_upper = lines.f64_vec(lp.num_col)?;
    lines.expect("row_bounds")?;
    lp.row_lower = lines.f64_vec(lp.num_row)?;
    lp.row_upper = lines.f64_vec(lp.num_row)?;
    lines.expect("column_costs")?;
    lp.col_cost = lines.f64_vec(lp.num_col)?;

    loop {
        let (line, content) = lines.next_content()?;
        match content {
            "end" => break,
            "integer_columns" => {
                let count = lines.usize_line()?;
                let indices = lines.usize_vec(count)?;
                lp.integrality = vec![Integrality::Continuous; lp.num_col];
                for &j in &indices {
                    if j >= lp.num_col {
                        return Err(ReadError::Parse {
                            line,
                            message: format!("integer column {} out of range", j),
                        });
                    }
                    lp.integrality[j] = Integrality::Integer;
                }
                lp.num_int = count;
            }
            "names" => {
                let (_, name) = lines.next_content()?;
                lp.model_name = if name == "-" { String::new() } else { name.into() };
                lines.expect("columns")?;
                for _ in 0..lp.num_col {
                    let (_, name) = lines.next_content()?;
                    lp.col_names.push(name.to_string());
                }
                lines.expect("rows")?;
                for _ in 0..lp.num_row {
                    let (_, name) = lines.next_content()?;
                    lp.row_names.push(name.to_string());
                }
            }
            other => {
                return Err(ReadError::Parse {
                    line,
                    message: format!("unknown EMS section '{}'", other),
                })
            }
        }
    }

    lp.validate().map_err(|e| ReadError::Parse {
        line: 0,
        message: e.to_string(),
    })?;
    Ok(lp)
}

fn push_f64s(out: &mut String, values: &[f64]) {
    if values.is_empty() {
        return;
    }
    let rendered: Vec<String> = values
        .iter()
        .map(|&v| {
            if v == f64::INFINITY {
                "inf".to_string()
            } else if v == f64::NEG_INFINITY {
                "-inf".to_string()
            } else {
                format!("{}", v)
            }
        })
        .collect();
    out.push_str(&rendered.join(" "));
    out.push('\n');
}

fn push_usizes(out: &mut String, values: &[usize]) {
    if values.is_empty() {
        return;
    }
    let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    out.push_str(&rendered.join(" "));
    out.push('\n');
}

/// Render a model as EMS text.
pub fn write_ems_string(lp: &Lp) -> String {
    let mut out = String::new();
    out.push_str(&format!("n_rows\n{}\n", lp.num_row));
    out.push_str(&format!("n_columns\n{}\n", lp.num_col));
    out.push_str(&format!("n_matrix_elements\n{}\n", lp.num_nz()));
    out.push_str(&format!(
        "sense\n{}\n",
        match lp.sense {
            ObjSense::Minimise => "min",
            ObjSense::Maximise => "max",
        }
    ));
    out.push_str(&format!("offset\n{}\n", lp.offset));

    out.push_str("matrix\n");
    if lp.num_col > 0 {
        push_usizes(&mut out, &lp.a_start);
    }
    push_usizes(&mut out, &lp.a_index);
    push_f64s(&mut out, &lp.a_value);

    out.push_str("column_bounds\n");
    push_f64s(&mut out, &lp.col_lower);
    push_f64s(&mut out, &lp.col_upper);
    out.push_str("row_bounds\n");
    push_f64s(&mut out, &lp.row_lower);
    push_f64s(&mut out, &lp.row_upper);
    out.push_str("column_costs\n");
    push_f64s(&mut out, &lp.col_cost);

    if lp.num_int > 0 {
        let indices: Vec<usize> = (0..lp.num_col)
            .filter(|&j| lp.integrality[j] == Integrality::Integer)
            .collect();
        out.push_str(&format!("integer_columns\n{}\n", indices.len()));
        push_usizes(&mut out, &indices);
    }
    if !lp.col_names.is_empty() || !lp.row_names.is_empty() || !lp.model_name.is_empty() {
        out.push_str("names\n");
        out.push_str(&format!(
            "{}\n",
            if lp.model_name.is_empty() {
                "-"
            } else {
                &lp.model_name
            }
        ));
        out.push_str("columns\n");
        for j in 0..lp.num_col {
            let fallback = format!("C{}", j);
            let name = lp.col_names.get(j).filter(|n| !n.is_empty()).unwrap_or(&fallback);
            out.push_str(name);
            out.push('\n');
        }
        out.push_str("rows\n");
        for i in 0..lp.num_row {
            let fallback = format!("R{}", i);
            let name = lp.row_names.get(i).filter(|n| !n.is_empty()).unwrap_or(&fallback);
            out.push_str(name);
            out.push('\n');
        }
    }
    out.push_str("end\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lp() -> Lp {
        let mut lp = Lp::with_dims(2, 2);
        lp.model_name = "EMS".into();
        lp.a_start = vec![0, 2, 3];
        lp.a_index = vec![0, 1, 1];
        lp.a_value = vec![1.0, -2.5, 4.0];
        lp.col_cost = vec![1.0, 0.5];
        lp.col_lower = vec![0.0, f64::NEG_INFINITY];
        lp.col_upper = vec![3.0, f64::INFINITY];
        lp.row_lower = vec![1.0, f64::NEG_INFINITY];
        lp.row_upper = vec![1.0, 8.0];
        lp.num_int = 1;
        lp.integrality = vec![Integrality::Integer, Integrality::Continuous];
        lp.col_names = vec!["A".into(), "B".into()];
        lp.row_names = vec!["R1".into(), "R2".into()];
        lp
    }

    #[test]
    fn test_ems_round_trip() {
        let lp = sample_lp();
        let text = write_ems_string(&lp);
        let read = parse_ems(&text).unwrap();
        assert_eq!(read, lp);
    }

    #[test]
    fn test_ems_round_trip_bare() {
        // No names, no integers, maximisation.
        let mut lp = Lp::with_dims(1, 1);
        lp.a_start = vec![0, 1];
        lp.a_index = vec![0];
        lp.a_value = vec![2.0];
        lp.col_cost = vec![1.0];
        lp.row_upper = vec![4.0];
        lp.sense = ObjSense::Maximise;
        lp.offset = -0.5;
        let text = write_ems_string(&lp);
        let read = parse_ems(&text).unwrap();
        assert_eq!(read, lp);
    }

    #[test]
    fn test_ems_rejects_garbage() {
        assert!(matches!(
            parse_ems("n_rows\nten\n"),
            Err(ReadError::Parse { .. })
        ));
        assert!(matches!(
            parse_ems("not_ems\n"),
            Err(ReadError::Parse { .. })
        ));
    }

    #[test]
    fn test_ems_empty_lp() {
        let lp = Lp::with_dims(0, 0);
        let text = write_ems_string(&lp);
        let read = parse_ems(&text).unwrap();
        assert_eq!(read, lp);
    }
}

// src/migration/grid.rs

use calamine::{Data, Range};

use crate::error::NormalizeError;

/// One spreadsheet cell, reduced to what the normalizer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Trimmed text of a non-blank cell. Numbers are rendered without a
    /// trailing `.0` so that numeric labels compare like their text form.
    pub fn label(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }

    /// Numeric value of the cell. Blank cells are `Ok(None)`; text is accepted
    /// when it parses to a finite number once thousands separators are removed.
    pub fn number(&self, field: &'static str) -> Result<Option<f64>, NormalizeError> {
        match self {
            Cell::Empty => Ok(None),
            Cell::Number(n) => Ok(Some(*n)),
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(None);
                }
                match t.replace(',', "").parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(Some(v)),
                    _ => Err(NormalizeError::parse(field, t, "number")),
                }
            }
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

/// A rectangular-ish sheet addressed by absolute 0-based (row, column).
/// Reads outside the stored cells yield [`Cell::Empty`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    rows: Vec<Vec<Cell>>,
}

impl SheetGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a grid from text cells; `""` becomes [`Cell::Empty`].
    pub fn from_text<S: AsRef<str>>(rows: &[Vec<S>]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|s| match s.as_ref() {
                        "" => Cell::Empty,
                        t => Cell::Text(t.to_string()),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Copy a calamine range, keeping its absolute position: a range starting
    /// at `C3` yields a grid whose first two rows and columns are empty.
    pub fn from_range(range: &Range<Data>) -> Self {
        let (start_row, start_col) = match range.start() {
            Some((r, c)) => (r as usize, c as usize),
            None => return Self::default(),
        };

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
        for data_row in range.rows() {
            let mut row = vec![Cell::Empty; start_col];
            row.extend(data_row.iter().map(Cell::from));
            rows.push(row);
        }
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

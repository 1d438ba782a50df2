//! Spreadsheet reading.
//!
//! Workbooks go through `calamine`, `.csv` files through the `csv` crate.
//! Either way the header row is consumed and each data row becomes a [`Row`]
//! keyed by normalised column name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader as _};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("spreadsheet not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported spreadsheet format: {0} (expected .xlsx, .xlsm, .xlsb, .xls, .ods or .csv)")]
    UnsupportedFormat(PathBuf),
    #[error("open workbook {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("workbook has no sheets: {0}")]
    NoSheets(PathBuf),
    #[error("read sheet {sheet:?}: {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },
    #[error("parse csv {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A single cell value with its spreadsheet type preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    fn from_text(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(raw.to_owned())
        }
    }

    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Self::Empty,
            Data::String(s) => Self::from_text(s),
            Data::Int(i) => Self::Int(*i),
            Data::Float(f) => Self::Float(*f),
            Data::Bool(b) => Self::Bool(*b),
            other => Self::from_text(&other.to_string()),
        }
    }

    /// Trimmed textual rendering; whole floats print without a fraction.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_owned(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                if f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    format!("{f:.0}")
                }
            }
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    /// Lenient integer coercion. Floats truncate toward zero.
    #[must_use]
    pub fn integer(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => float_to_int(*f),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
            }
            Self::Empty | Self::Bool(_) => None,
        }
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// One data row. `position` is 1-based among the sheet's data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub position: usize,
    cells: HashMap<String, Cell>,
}

impl Row {
    /// Builds a row from `(column, value)` pairs. Column names are normalised;
    /// on a collision the first column wins.
    pub fn new<I, K>(position: usize, cells: I) -> Self
    where
        I: IntoIterator<Item = (K, Cell)>,
        K: AsRef<str>,
    {
        let mut map = HashMap::new();
        for (key, cell) in cells {
            let key = normalize_header(key.as_ref());
            if key.is_empty() {
                continue;
            }
            map.entry(key).or_insert(cell);
        }
        Self {
            position,
            cells: map,
        }
    }

    #[must_use]
    pub fn cell(&self, column: &str) -> Option<&Cell> {
        self.cells.get(&normalize_header(column))
    }

    /// Trimmed text of `column`, empty when the column is absent.
    #[must_use]
    pub fn text(&self, column: &str) -> String {
        self.cell(column).map(Cell::text).unwrap_or_default()
    }

    #[must_use]
    pub fn integer(&self, column: &str) -> Option<i64> {
        self.cell(column).and_then(Cell::integer)
    }
}

/// `ParentId`, `parent_id` and `Parent Id` all map to `parentid`.
#[must_use]
pub fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn read(path: &Path) -> Result<Vec<Row>, ImportError> {
    if !path.is_file() {
        return Err(ImportError::NotFound(path.to_owned()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
        "csv" => read_csv(path)?,
        _ => return Err(ImportError::UnsupportedFormat(path.to_owned())),
    };

    tracing::debug!(path = %path.display(), rows = rows.len(), "read spreadsheet");
    Ok(rows)
}

fn read_workbook(path: &Path) -> Result<Vec<Row>, ImportError> {
    let mut workbook = calamine::open_workbook_auto(path).map_err(|source| ImportError::Open {
        path: path.to_owned(),
        source,
    })?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::NoSheets(path.to_owned()))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|source| ImportError::Sheet {
            sheet: sheet.clone(),
            source,
        })?;

    let mut lines = range.rows();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.iter().map(|c| Cell::from_data(c).text()).collect();

    let rows = lines
        .enumerate()
        .map(|(idx, line)| {
            Row::new(
                idx + 1,
                header
                    .iter()
                    .zip(line.iter())
                    .map(|(name, data)| (name.as_str(), Cell::from_data(data))),
            )
        })
        .collect();
    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<Row>, ImportError> {
    let csv_err = |source| ImportError::Csv {
        path: path.to_owned(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let header = reader.headers().map_err(csv_err)?.clone();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        rows.push(Row::new(
            idx + 1,
            header
                .iter()
                .zip(record.iter())
                .map(|(name, raw)| (name, Cell::from_text(raw))),
        ));
    }
    Ok(rows)
}

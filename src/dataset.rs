/// Daily tabular time series: the in-memory "dataframe" of this crate.
///
/// A `DailyFrame` is an ordered list of rows, each keyed by a UTC calendar
/// day and, for grid data, a location. Values are `Option<f64>`; `None`
/// marks a missing measurement (the provider's `null`).
///
/// Frames are built fresh per run from API responses or CSV caches, joined
/// with `merge`, forward-filled, and extended column-by-column during
/// feature engineering. Nothing else mutates them.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::model::{Coordinate, FloodError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_HEADER: &str = "date";
const LATITUDE_HEADER: &str = "latitude";
const LONGITUDE_HEADER: &str = "longitude";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Join key of a frame row: the day, plus the location for grid data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowKey {
    pub date: NaiveDate,
    pub location: Option<Coordinate>,
}

impl RowKey {
    pub fn on(date: NaiveDate) -> Self {
        RowKey { date, location: None }
    }

    pub fn at(date: NaiveDate, location: Coordinate) -> Self {
        RowKey {
            date,
            location: Some(location),
        }
    }

    fn hash_key(&self) -> (NaiveDate, Option<(u64, u64)>) {
        (self.date, self.location.map(|c| c.key_bits()))
    }

    fn sort_cmp(&self, other: &RowKey) -> std::cmp::Ordering {
        let location = |k: &RowKey| k.location.map(|c| (c.latitude, c.longitude));
        self.date.cmp(&other.date).then_with(|| match (location(self), location(other)) {
            (Some(a), Some(b)) => a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)),
            (a, b) => a.is_some().cmp(&b.is_some()),
        })
    }
}

/// Which rows a merge keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Only keys present on both sides, in left order.
    Inner,
    /// Keys present on either side, sorted by key; the absent side is `None`.
    Outer,
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyFrame {
    columns: Vec<String>,
    keys: Vec<RowKey>,
    rows: Vec<Vec<Option<f64>>>,
}

impl DailyFrame {
    pub fn new(columns: Vec<String>) -> Self {
        DailyFrame {
            columns,
            keys: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect())
    }

    /// Appends a row. The value count must match the column count.
    pub fn push_row(&mut self, key: RowKey, values: Vec<Option<f64>>) -> Result<(), FloodError> {
        if values.len() != self.columns.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "row for {} has {} values, frame has {} columns",
                key.date,
                values.len(),
                self.columns.len()
            )));
        }
        self.keys.push(key);
        self.rows.push(values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn row(&self, index: usize) -> &[Option<f64>] {
        &self.rows[index]
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.keys.iter().map(|k| k.date).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_location(&self) -> bool {
        self.keys.iter().any(|k| k.location.is_some())
    }

    /// Copies out a single column.
    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>, FloodError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| FloodError::MissingColumn(name.to_string()))?;
        Ok(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Adds a derived column, replacing any existing column of that name.
    pub fn add_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), FloodError> {
        if values.len() != self.rows.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "column '{}' has {} values, frame has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Stacks frames with identical columns, preserving order.
    pub fn concat(frames: Vec<DailyFrame>) -> Result<DailyFrame, FloodError> {
        let mut iter = frames.into_iter();
        let mut combined = match iter.next() {
            Some(first) => first,
            None => return Ok(DailyFrame::default()),
        };
        for frame in iter {
            if frame.columns != combined.columns {
                return Err(FloodError::ShapeMismatch(format!(
                    "cannot concatenate frames with columns [{}] and [{}]",
                    combined.columns.join(", "),
                    frame.columns.join(", ")
                )));
            }
            combined.keys.extend(frame.keys);
            combined.rows.extend(frame.rows);
        }
        Ok(combined)
    }

    /// Joins two frames on their row keys (date, plus location when present).
    ///
    /// Repeated keys produce one output row per matching pair. Columns that
    /// appear on both sides are suffixed `_x` (left) and `_y` (right).
    pub fn merge(&self, right: &DailyFrame, how: JoinKind) -> DailyFrame {
        let overlap: HashSet<&String> = self
            .columns
            .iter()
            .filter(|c| right.columns.contains(c))
            .collect();
        let rename = |name: &String, suffix: &str| {
            if overlap.contains(name) {
                format!("{}{}", name, suffix)
            } else {
                name.clone()
            }
        };
        let mut columns: Vec<String> = self.columns.iter().map(|c| rename(c, "_x")).collect();
        columns.extend(right.columns.iter().map(|c| rename(c, "_y")));

        let mut right_index: HashMap<(NaiveDate, Option<(u64, u64)>), Vec<usize>> = HashMap::new();
        for (i, key) in right.keys.iter().enumerate() {
            right_index.entry(key.hash_key()).or_default().push(i);
        }

        let left_blank = vec![None; self.columns.len()];
        let right_blank = vec![None; right.columns.len()];
        let mut matched_right = vec![false; right.len()];
        let mut merged = DailyFrame::new(columns);

        for (li, key) in self.keys.iter().enumerate() {
            match right_index.get(&key.hash_key()) {
                Some(matches) => {
                    for &ri in matches {
                        matched_right[ri] = true;
                        let mut values = self.rows[li].clone();
                        values.extend_from_slice(&right.rows[ri]);
                        merged.keys.push(*key);
                        merged.rows.push(values);
                    }
                }
                None if how == JoinKind::Outer => {
                    let mut values = self.rows[li].clone();
                    values.extend_from_slice(&right_blank);
                    merged.keys.push(*key);
                    merged.rows.push(values);
                }
                None => {}
            }
        }

        if how == JoinKind::Outer {
            for (ri, key) in right.keys.iter().enumerate() {
                if !matched_right[ri] {
                    let mut values = left_blank.clone();
                    values.extend_from_slice(&right.rows[ri]);
                    merged.keys.push(*key);
                    merged.rows.push(values);
                }
            }
            merged.sort_by_key();
        }

        merged
    }

    /// Stable sort by date, then location.
    pub fn sort_by_key(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.keys[a].sort_cmp(&self.keys[b]));
        self.keys = order.iter().map(|&i| self.keys[i]).collect();
        self.rows = order.iter().map(|&i| self.rows[i].clone()).collect();
    }

    /// Fills each missing value from the preceding row's value in the same
    /// column. Leading missing values stay missing.
    pub fn forward_fill(&mut self) {
        let mut last: Vec<Option<f64>> = vec![None; self.columns.len()];
        for row in &mut self.rows {
            for (value, carried) in row.iter_mut().zip(last.iter_mut()) {
                match value {
                    Some(v) if !v.is_nan() => *carried = Some(*v),
                    _ => *value = *carried,
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // CSV
    // -----------------------------------------------------------------------

    /// Writes `date[,latitude,longitude],<columns...>`; missing values are
    /// written as empty fields.
    pub fn write_csv(&self, path: &Path) -> Result<(), FloodError> {
        let mut writer = csv::Writer::from_path(path)?;
        let with_location = self.has_location();

        let mut header = vec![DATE_HEADER.to_string()];
        if with_location {
            header.push(LATITUDE_HEADER.to_string());
            header.push(LONGITUDE_HEADER.to_string());
        }
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;

        for (key, row) in self.keys.iter().zip(&self.rows) {
            let mut record = vec![key.date.format(DATE_FORMAT).to_string()];
            if with_location {
                let loc = key.location.unwrap_or(Coordinate::new(f64::NAN, f64::NAN));
                record.push(loc.latitude.to_string());
                record.push(loc.longitude.to_string());
            }
            record.extend(row.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Reads a frame written by `write_csv` (or any CSV with a leading
    /// `date` column). Dates may carry a time suffix, which is ignored.
    pub fn read_csv(path: &Path) -> Result<DailyFrame, FloodError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let date_idx = headers
            .iter()
            .position(|h| h == DATE_HEADER || h == "time")
            .ok_or_else(|| FloodError::MissingColumn(DATE_HEADER.to_string()))?;
        let lat_idx = headers.iter().position(|h| h == LATITUDE_HEADER);
        let lon_idx = headers.iter().position(|h| h == LONGITUDE_HEADER);

        let value_indices: Vec<usize> = (0..headers.len())
            .filter(|&i| i != date_idx && Some(i) != lat_idx && Some(i) != lon_idx)
            .collect();
        let columns = value_indices.iter().map(|&i| headers[i].clone()).collect();
        let mut frame = DailyFrame::new(columns);

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let field = |i: usize| record.get(i).unwrap_or("").trim();

            let raw_date = field(date_idx);
            let date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(raw_date), DATE_FORMAT)
                .map_err(|e| {
                    FloodError::ParseError(format!("row {}: bad date '{}': {}", line + 1, raw_date, e))
                })?;

            let location = match (lat_idx, lon_idx) {
                (Some(la), Some(lo)) => Some(Coordinate::new(
                    parse_number(field(la), line)?.unwrap_or(f64::NAN),
                    parse_number(field(lo), line)?.unwrap_or(f64::NAN),
                )),
                _ => None,
            };

            let values = value_indices
                .iter()
                .map(|&i| parse_number(field(i), line))
                .collect::<Result<Vec<_>, _>>()?;

            frame.push_row(RowKey { date, location }, values)?;
        }

        Ok(frame)
    }
}

fn parse_number(field: &str, line: usize) -> Result<Option<f64>, FloodError> {
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    field
        .parse::<f64>()
        .map(Some)
        .map_err(|e| FloodError::ParseError(format!("row {}: bad number '{}': {}", line + 1, field, e)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

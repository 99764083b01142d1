// =============================================================================
// Data Loader
// =============================================================================
//
// Reads the two input CSV files:
//
//   merged_data_by_year_month.csv   Year, AO, Max_Wind, TS_H   (storms)
//   ocean_heat_processed.csv        date, AO                   (monthly OHC)
//
// Columns are located by header name; extra columns are ignored. Any
// missing column or value that fails to parse aborts the load with the file,
// line and column of the problem. Storm rows are kept in file order. Ocean
// heat rows are stably sorted by date and numbered 1..N in that order.
//
// =============================================================================

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::error::{AnalysisError, Result};

// =============================================================================
// Records
// =============================================================================

/// One storm-month observation.
#[derive(Debug, Clone, PartialEq)]
pub struct StormRecord {
    /// Raw text of the `Year` column; coerced to an integer by the deriver.
    pub year: String,
    pub ao: f64,
    pub max_wind: f64,
    /// Storm-type code.
    pub ts_h: String,
}

/// The storm table, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct StormTable {
    /// File the table was read from, for error messages.
    pub source: PathBuf,
    pub records: Vec<StormRecord>,
    /// Source line of each record.
    pub lines: Vec<usize>,
}

impl StormTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One month of ocean heat content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OceanHeatRecord {
    pub date: NaiveDate,
    pub ao: f64,
}

/// Ocean heat series sorted by date, with its positional time index.
#[derive(Debug, Clone, PartialEq)]
pub struct OceanHeatTable {
    pub records: Vec<OceanHeatRecord>,
    /// 1-based position after sorting. This, not the date, is the trend
    /// covariate.
    pub time: Vec<usize>,
}

impl OceanHeatTable {
    /// Sort by date (stable) and assign `time` = 1..N.
    pub fn from_unsorted(mut records: Vec<OceanHeatRecord>) -> Self {
        records.sort_by_key(|r| r.date);
        let time = (1..=records.len()).collect();
        Self { records, time }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =============================================================================
// CSV Reading
// =============================================================================

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// A whole CSV file: header positions plus data rows with their line numbers.
struct CsvTable {
    path: PathBuf,
    columns: HashMap<String, usize>,
    rows: Vec<(usize, Vec<String>)>,
}

impl CsvTable {
    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AnalysisError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(parse_error(path, 1, "<header>", "file is empty")),
        };
        let columns = csv_split(header.trim_start_matches('\u{feff}'))
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().trim_matches('"').to_string(), i))
            .collect();

        let mut rows = Vec::new();
        for (idx, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // header is line 1
            rows.push((idx + 2, csv_split(&line)));
        }
        if rows.is_empty() {
            return Err(parse_error(path, 2, "<rows>", "file has a header but no data rows"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| parse_error(&self.path, 1, name, "required column is missing"))
    }

    fn field<'a>(&self, line: usize, row: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
        row.get(idx)
            .map(|s| s.trim())
            .ok_or_else(|| parse_error(&self.path, line, name, "row has too few fields"))
    }

    fn f64_field(&self, line: usize, row: &[String], idx: usize, name: &str) -> Result<f64> {
        let text = self.field(line, row, idx, name)?;
        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(parse_error(
                &self.path,
                line,
                name,
                &format!("'{text}' is not a finite number"),
            )),
        }
    }
}

fn parse_error(path: &Path, line: usize, column: &str, message: &str) -> AnalysisError {
    AnalysisError::Parse {
        path: path.to_path_buf(),
        line,
        column: column.to_string(),
        message: message.to_string(),
    }
}

/// Parse the accepted date forms: `YYYY-MM-DD`, an ISO timestamp (date part
/// used), `YYYY/MM/DD` and `YYYY-MM` (first of the month).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some((date, _)) = text.split_once(['T', ' ']) {
        if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y/%m/%d") {
        return Some(d);
    }
    NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok()
}

// =============================================================================
// Loaders
// =============================================================================

/// Load the storm table as-is.
pub fn load_storms(path: &Path) -> Result<StormTable> {
    let csv = CsvTable::read(path)?;
    let year = csv.column("Year")?;
    let ao = csv.column("AO")?;
    let max_wind = csv.column("Max_Wind")?;
    let ts_h = csv.column("TS_H")?;

    let mut records = Vec::with_capacity(csv.rows.len());
    let mut lines = Vec::with_capacity(csv.rows.len());
    for (line, row) in &csv.rows {
        lines.push(*line);
        let wind = csv.f64_field(*line, row, max_wind, "Max_Wind")?;
        if wind < 0.0 {
            return Err(parse_error(path, *line, "Max_Wind", "wind speed must be non-negative"));
        }
        let code = csv.field(*line, row, ts_h, "TS_H")?;
        if code.is_empty() {
            return Err(parse_error(path, *line, "TS_H", "storm type is empty"));
        }
        records.push(StormRecord {
            year: csv.field(*line, row, year, "Year")?.to_string(),
            ao: csv.f64_field(*line, row, ao, "AO")?,
            max_wind: wind,
            ts_h: code.to_string(),
        });
    }

    info!(file = %path.display(), rows = records.len(), "Loaded storm table");
    Ok(StormTable {
        source: path.to_path_buf(),
        records,
        lines,
    })
}

/// Load the ocean heat series, sorted by date with `time` assigned.
pub fn load_ocean_heat(path: &Path) -> Result<OceanHeatTable> {
    let csv = CsvTable::read(path)?;
    let date = csv.column("date")?;
    let ao = csv.column("AO")?;

    let mut records = Vec::with_capacity(csv.rows.len());
    for (line, row) in &csv.rows {
        let text = csv.field(*line, row, date, "date")?;
        let parsed = parse_date(text).ok_or_else(|| {
            parse_error(path, *line, "date", &format!("'{text}' is not a recognised date"))
        })?;
        records.push(OceanHeatRecord {
            date: parsed,
            ao: csv.f64_field(*line, row, ao, "AO")?,
        });
    }

    let table = OceanHeatTable::from_unsorted(records);
    if let (Some(first), Some(last)) = (table.records.first(), table.records.last()) {
        info!(
            file = %path.display(),
            rows = table.len(),
            from = %first.date,
            to = %last.date,
            "Loaded ocean heat series"
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_csv_split_quotes() {
        assert_eq!(csv_split("a,\"b,c\",d"), vec!["a", "b,c", "d"]);
        assert_eq!(csv_split("\"say \"\"hi\"\"\",2"), vec!["say \"hi\"", "2"]);
        assert_eq!(csv_split("x,,"), vec!["x", "", ""]);
    }

    #[test]
    fn test_parse_date_forms() {
        let d = NaiveDate::from_ymd_opt(2005, 3, 1).unwrap();
        assert_eq!(parse_date("2005-03-01"), Some(d));
        assert_eq!(parse_date("2005-03-01T00:00:00Z"), Some(d));
        assert_eq!(parse_date("2005/03/01"), Some(d));
        assert_eq!(parse_date("2005-03"), Some(d));
        assert_eq!(parse_date("March 2005"), None);
    }

    #[test]
    fn test_ocean_heat_sorted_and_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "ohc.csv",
            "date,AO,extra\n2005-03-01,3.0,x\n2005-01-01,1.0,x\n\n2005-04-01,4.0,x\n2005-02-01,2.0,x\n",
        );
        let table = load_ocean_heat(&path).unwrap();
        assert_eq!(table.time, vec![1, 2, 3, 4]);
        let ao: Vec<f64> = table.records.iter().map(|r| r.ao).collect();
        assert_eq!(ao, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_storms_keep_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "storms.csv",
            "\"Year\",AO,Max_Wind,TS_H\n2012,5.5,80,H\n2003,4.0,45,\"TS\"\n",
        );
        let table = load_storms(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].year, "2012");
        assert_eq!(table.records[1].ts_h, "TS");
    }

    #[test]
    fn test_missing_file() {
        let err = load_storms(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingFile { .. }));
    }

    #[test]
    fn test_missing_column_and_bad_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "Year,AO,TS_H\n2005,1.0,H\n");
        match load_storms(&path).unwrap_err() {
            AnalysisError::Parse { column, line, .. } => {
                assert_eq!(column, "Max_Wind");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        let path = write_csv(dir.path(), "b.csv", "date,AO\n2005-01-01,1.0\n2005-02-01,NA\n");
        match load_ocean_heat(&path).unwrap_err() {
            AnalysisError::Parse { column, line, .. } => {
                assert_eq!(column, "AO");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_only_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "c.csv", "date,AO\n");
        assert!(matches!(load_ocean_heat(&path), Err(AnalysisError::Parse { .. })));
    }
}

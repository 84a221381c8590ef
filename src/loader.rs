//! Input loading for activity records
//!
//! Reads CSV files with caller-named columns, NDJSON, or a JSON array of
//! records into an [`ActivityTable`]. Timestamps are normalized to UTC.

use crate::activities::ActivityTable;
use crate::error::MapperError;
use crate::types::ActivityRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Naive formats tried after RFC 3339, read as UTC
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Supported input encodings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    #[default]
    Csv,
    Ndjson,
    Json,
}

impl FromStr for InputFormat {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "ndjson" | "jsonl" => Ok(InputFormat::Ndjson),
            "json" => Ok(InputFormat::Json),
            other => Err(MapperError::Configuration(format!(
                "Unknown input format '{}'",
                other
            ))),
        }
    }
}

/// CSV header names of the three required columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub session_id: String,
    pub activity: String,
    pub timestamp: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            session_id: "ID".to_string(),
            activity: "activity".to_string(),
            timestamp: "timestamp".to_string(),
        }
    }
}

/// A JSON record before timestamp parsing
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(alias = "ID", alias = "id")]
    session_id: serde_json::Value,
    activity: String,
    #[serde(alias = "timestamp")]
    occurrence: String,
}

impl RawRecord {
    fn into_record(self) -> Result<ActivityRecord, MapperError> {
        let session_id = match self.session_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(MapperError::ParseError(format!(
                    "session_id must be a string or number, got {}",
                    other
                )))
            }
        };
        let occurrence = parse_timestamp(&self.occurrence)?;
        Ok(ActivityRecord::new(session_id, self.activity, occurrence))
    }
}

/// Loader for activity tables
pub struct ActivityLoader;

impl ActivityLoader {
    /// Read a file in the given format
    pub fn load(
        path: impl AsRef<Path>,
        format: InputFormat,
        columns: &ColumnNames,
    ) -> Result<ActivityTable, MapperError> {
        let file = std::fs::File::open(path)?;
        Self::read(file, format, columns)
    }

    /// Read from any reader in the given format
    pub fn read<R: Read>(
        mut reader: R,
        format: InputFormat,
        columns: &ColumnNames,
    ) -> Result<ActivityTable, MapperError> {
        let table = match format {
            InputFormat::Csv => Self::read_csv(reader, columns)?,
            InputFormat::Ndjson | InputFormat::Json => {
                let mut buffer = String::new();
                reader.read_to_string(&mut buffer)?;
                if format == InputFormat::Ndjson {
                    Self::parse_ndjson(&buffer)?
                } else {
                    Self::parse_array(&buffer)?
                }
            }
        };
        debug!(
            records = table.len(),
            sessions = table.session_count(),
            "loaded activity records"
        );
        Ok(table)
    }

    /// Parse CSV with a header row, keeping only the named columns
    pub fn read_csv<R: Read>(reader: R, columns: &ColumnNames) -> Result<ActivityTable, MapperError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let position = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                MapperError::ParseError(format!("Column '{}' not found in CSV header", name))
            })
        };
        let id_idx = position(&columns.session_id)?;
        let activity_idx = position(&columns.activity)?;
        let ts_idx = position(&columns.timestamp)?;

        let mut records = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            // header is line 1
            let line = row + 2;
            let field = |idx: usize, name: &str| -> Result<String, MapperError> {
                match record.get(idx) {
                    Some(v) if !v.is_empty() => Ok(v.to_string()),
                    _ => Err(MapperError::ParseError(format!(
                        "Line {}: missing value for '{}'",
                        line, name
                    ))),
                }
            };

            let session_id = field(id_idx, &columns.session_id)?;
            let activity = field(activity_idx, &columns.activity)?;
            let occurrence = parse_timestamp(&field(ts_idx, &columns.timestamp)?)
                .map_err(|e| MapperError::ParseError(format!("Line {}: {}", line, e)))?;
            records.push(ActivityRecord::new(session_id, activity, occurrence));
        }

        Ok(ActivityTable::new(records))
    }

    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<ActivityTable, MapperError> {
        let raw: Vec<RawRecord> = serde_json::from_str(json)?;
        let records = raw
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ActivityTable::new(records))
    }

    /// Parse NDJSON (newline-delimited JSON) containing records
    pub fn parse_ndjson(ndjson: &str) -> Result<ActivityTable, MapperError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = serde_json::from_str::<RawRecord>(trimmed)
                .map_err(MapperError::from)
                .and_then(RawRecord::into_record)
                .map_err(|e| {
                    MapperError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    ))
                })?;
            records.push(record);
        }
        Ok(ActivityTable::new(records))
    }
}

/// Parse a timestamp into UTC
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]`
/// and bare `YYYY-MM-DD` (midnight). Values without an offset are read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MapperError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(MapperError::ParseError(format!(
        "Unrecognized timestamp '{}'",
        value
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CSV: &str = "\
ID,activity,timestamp,channel
A,login,2024-03-01 09:00:00,web
A,browse,2024-03-01 09:01:30,web
B,login,2024-03-01T10:00:00Z,app
B,logout,2024-03-01 10:05:00.250,app
";

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T09:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T10:00:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01 09:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T09:00:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );

        let frac = parse_timestamp("2024-03-01 09:00:00.500").unwrap();
        assert_eq!(frac.timestamp_millis(), expected.timestamp_millis() + 500);

        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(MapperError::ParseError(_))
        ));
    }

    #[test]
    fn test_read_csv_default_columns() {
        let table = ActivityLoader::read_csv(CSV.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.session_count(), 2);
        assert_eq!(table.distinct_activities(), vec!["login", "browse", "logout"]);
        assert_eq!(table.records()[0].session_id, "A");
    }

    #[test]
    fn test_read_csv_custom_columns() {
        let csv = "sess,step,at\n1,login,2024-03-01\n1,pay,2024-03-02\n";
        let columns = ColumnNames {
            session_id: "sess".to_string(),
            activity: "step".to_string(),
            timestamp: "at".to_string(),
        };
        let table = ActivityLoader::read_csv(csv.as_bytes(), &columns).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[1].activity, "pay");
    }

    #[test]
    fn test_read_csv_missing_column() {
        let columns = ColumnNames {
            timestamp: "occurred_at".to_string(),
            ..ColumnNames::default()
        };
        let err = ActivityLoader::read_csv(CSV.as_bytes(), &columns).unwrap_err();
        assert!(err.to_string().contains("occurred_at"));
    }

    #[test]
    fn test_read_csv_bad_timestamp_reports_line() {
        let csv = "ID,activity,timestamp\nA,login,2024-03-01\nA,browse,not-a-date\n";
        let err = ActivityLoader::read_csv(csv.as_bytes(), &ColumnNames::default()).unwrap_err();
        assert!(err.to_string().contains("Line 3"));
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"
{"session_id": "A", "activity": "login", "occurrence": "2024-03-01T09:00:00Z"}

{"ID": 42, "activity": "browse", "timestamp": "2024-03-01 09:01:00"}
"#;
        let table = ActivityLoader::parse_ndjson(ndjson).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[1].session_id, "42");
    }

    #[test]
    fn test_parse_ndjson_error_has_line_number() {
        let ndjson = "{\"id\":\"A\",\"activity\":\"login\",\"timestamp\":\"2024-03-01\"}\n{broken\n";
        let err = ActivityLoader::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let json = r#"[
            {"id": "A", "activity": "login", "timestamp": "2024-03-01T09:00:00Z"},
            {"id": "A", "activity": "purchase", "timestamp": "2024-03-01T09:03:00Z"}
        ]"#;
        let table = ActivityLoader::parse_array(json).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.is_mapped());
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        let table =
            ActivityLoader::load(file.path(), InputFormat::Csv, &ColumnNames::default()).unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_input_format_from_str() {
        assert_eq!("CSV".parse::<InputFormat>().unwrap(), InputFormat::Csv);
        assert_eq!("jsonl".parse::<InputFormat>().unwrap(), InputFormat::Ndjson);
        assert!("xml".parse::<InputFormat>().is_err());
    }
}

//! File persistence for run metadata, agent state snapshots, and the
//! spreadsheet CSV log.
//!
//! JSON artifacts are written through tokio's async `fs`; CSV appends are
//! synchronous writes serialized by the owning swarm's lock so rows are never
//! interleaved within a line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use thiserror::Error;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write `data` to `path`, creating parent directories as needed.
pub async fn save_to_file(data: &[u8], path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, data).await?;
    log::debug!("saved {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Read the full contents of `path`.
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<u8>, PersistenceError> {
    Ok(tokio::fs::read(path.as_ref()).await?)
}

/// Serialize `value` as pretty JSON and save it to `path`.
pub async fn save_json<T: serde::Serialize>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)?;
    save_to_file(json.as_bytes(), path).await
}

/// Load and deserialize a JSON artifact from `path`.
pub async fn load_json<T: serde::de::DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, PersistenceError> {
    let bytes = load_from_file(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

// ---------------------------------------------------------------------------
// CSV helpers
// ---------------------------------------------------------------------------

/// Quote a CSV field when it contains a comma, quote, or newline.
pub fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Join already-escaped fields into one CSV row.
pub fn csv_row(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Append `row` to the CSV at `path`; when the file does not exist yet it is
/// created with `header` first.
///
/// Callers that append from concurrent workers must hold their swarm-scoped
/// write lock around this call.
pub fn append_csv_row(
    path: impl AsRef<Path>,
    header: &str,
    row: &str,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let exists = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !exists {
        writeln!(file, "{}", header)?;
    }
    writeln!(file, "{}", row)?;
    Ok(())
}

/// Split one CSV line into fields, honoring double-quoted fields with
/// embedded commas and doubled quotes.
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_csv_escape_plain_field() {
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_special_fields() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_line_round_trip() {
        let row = csv_row(&["plain", "with,comma", "with \"quote\""]);
        let parsed = parse_csv_line(&row);
        assert_eq!(parsed, vec!["plain", "with,comma", "with \"quote\""]);
    }

    #[test]
    fn test_append_creates_with_header_then_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        append_csv_row(&path, "A,B", "1,2").unwrap();
        append_csv_row(&path, "A,B", "3,4").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["A,B", "1,2", "3,4"]);
    }

    #[tokio::test]
    async fn test_save_and_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("meta.json");

        let value = serde_json::json!({ "task": "t", "count": 3 });
        save_json(&value, &path).await.unwrap();

        let back: serde_json::Value = load_json(&path).await.unwrap();
        assert_eq!(back, value);
    }
}

//! Table unifier: reads delimited text files into one table.
//!
//! All files extracted from one artifact must share an identical header.
//! Rows keep file-then-in-file order. Deduplication on the first column is an
//! optional second pass selected by [`TableMode`].

use crate::error::ArtifactError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single cell. `None` is a missing value (empty field or short row).
pub type Cell = Option<String>;

/// Column used as the deduplication key.
pub const KEY_COLUMN: usize = 0;

/// Concatenation of every data file from one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Column names, taken from the first file.
    pub columns: Vec<String>,
    /// Body rows; each has exactly `columns.len()` cells.
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Body rows with every missing cell rendered as an empty string.
    pub fn to_sheet_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|c| c.clone().unwrap_or_default()).collect())
            .collect()
    }
}

/// A [`RawTable`] whose key column holds unique values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedTable(RawTable);

impl UnifiedTable {
    pub fn table(&self) -> &RawTable {
        &self.0
    }

    pub fn into_inner(self) -> RawTable {
        self.0
    }
}

/// Whether the pipeline deduplicates before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// First occurrence per key-column value wins.
    #[default]
    Deduplicate,
    /// Publish the raw concatenation.
    Raw,
}

impl TableMode {
    /// Produce the table that will be handed to the publisher.
    pub fn apply(self, raw: RawTable) -> RawTable {
        match self {
            TableMode::Raw => raw,
            TableMode::Deduplicate => {
                let before = raw.len();
                let unified = deduplicate(raw);
                let after = unified.table().len();
                info!(
                    before,
                    after,
                    removed = before - after,
                    "deduplicated on first column"
                );
                unified.into_inner()
            }
        }
    }
}

/// Read every file and concatenate them in the given order.
///
/// Fails with `SchemaMismatch` when a file's header differs from the first
/// file's header in names or order.
pub fn read_and_concat(paths: &[PathBuf]) -> Result<RawTable, ArtifactError> {
    let mut out: Option<RawTable> = None;

    for path in paths {
        let (columns, rows) = read_file(path)?;
        debug!(path = %path.display(), rows = rows.len(), "read data file");

        match out.as_mut() {
            None => out = Some(RawTable { columns, rows }),
            Some(acc) => {
                if acc.columns != columns {
                    return Err(ArtifactError::SchemaMismatch {
                        path: path.clone(),
                        expected: acc.columns.clone(),
                        found: columns,
                    });
                }
                acc.rows.extend(rows);
            }
        }
    }

    let table = out.unwrap_or_default();
    info!(files = paths.len(), rows = table.len(), "unified data files");
    Ok(table)
}

/// Stable first-occurrence-wins deduplication on [`KEY_COLUMN`].
pub fn deduplicate(table: RawTable) -> UnifiedTable {
    deduplicate_by(table, KEY_COLUMN)
}

/// Stable first-occurrence-wins deduplication on `key_column`.
pub fn deduplicate_by(table: RawTable, key_column: usize) -> UnifiedTable {
    let RawTable { columns, rows } = table;
    let mut seen: HashSet<Cell> = HashSet::with_capacity(rows.len());
    let rows = rows
        .into_iter()
        .filter(|row| seen.insert(row.get(key_column).cloned().flatten()))
        .collect();
    UnifiedTable(RawTable { columns, rows })
}

fn read_file(path: &Path) -> Result<(Vec<String>, Vec<Vec<Cell>>), ArtifactError> {
    let bytes = std::fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
    let text = std::str::from_utf8(&bytes).map_err(|e| ArtifactError::Encoding {
        path: path.to_path_buf(),
        offset: e.valid_up_to(),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let malformed = |reason: String| ArtifactError::MalformedTable {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if columns.iter().all(String::is_empty) {
        return Err(malformed("missing header row".to_string()));
    }
    let width = columns.len();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        if record.len() > width {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(malformed(format!(
                "line {line} has {} fields, header has {width}",
                record.len()
            )));
        }
        let row = (0..width)
            .map(|i| record.get(i).filter(|s| !s.is_empty()).map(str::to_string))
            .collect();
        rows.push(row);
    }

    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }

    #[test]
    fn test_concat_sums_rows_and_keeps_first_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", b"id,qty\n1,5\n2,6\n");
        let b = write(&dir, "b.csv", b"id,qty\n3,7\n");
        let table = read_and_concat(&[a, b]).unwrap();

        assert_eq!(table.columns, vec!["id", "qty"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[2], vec![cell("3"), cell("7")]);
    }

    #[test]
    fn test_concat_rejects_differing_headers() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", b"id,qty\n1,5\n");
        let b = write(&dir, "b.csv", b"qty,id\n5,1\n");
        let err = read_and_concat(&[a, b.clone()]).unwrap_err();

        match err {
            ArtifactError::SchemaMismatch { path, .. } => assert_eq!(path, b),
            other => panic!("expected schema mismatch, got {other}"),
        }
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        let table = read_and_concat(&[]).unwrap();
        assert!(table.columns.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", b"id,name\n1,\xff\xfe\n");
        assert!(matches!(
            read_and_concat(&[a]),
            Err(ArtifactError::Encoding { offset: 10, .. })
        ));
    }

    #[test]
    fn test_overlong_row_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", b"id,qty\n1,5,9\n");
        assert!(matches!(
            read_and_concat(&[a]),
            Err(ArtifactError::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_missing_cells_and_bom() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", "\u{feff}id,qty,note\n1,,x\n2\n".as_bytes());
        let table = read_and_concat(&[a]).unwrap();

        assert_eq!(table.columns[0], "id");
        assert_eq!(table.rows[0], vec![cell("1"), None, cell("x")]);
        assert_eq!(table.rows[1], vec![cell("2"), None, None]);
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", b"id,addr\n1,\"Rua A, 10\"\n");
        let table = read_and_concat(&[a]).unwrap();
        assert_eq!(table.rows[0][1], cell("Rua A, 10"));
    }

    #[test]
    fn test_dedup_first_occurrence_wins_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.csv", b"id,qty\n1,5\n");
        let b = write(&dir, "b.csv", b"id,qty\n1,7\n2,3\n");
        let raw = read_and_concat(&[a, b]).unwrap();
        let unified = deduplicate(raw);

        assert_eq!(
            unified.table().rows,
            vec![vec![cell("1"), cell("5")], vec![cell("2"), cell("3")]]
        );
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let raw = RawTable {
            columns: vec!["k".into(), "v".into()],
            rows: vec![
                vec![cell("a"), cell("1")],
                vec![None, cell("2")],
                vec![cell("a"), cell("3")],
                vec![None, cell("4")],
                vec![cell("b"), cell("5")],
            ],
        };
        let once = deduplicate(raw);
        let twice = deduplicate(once.clone().into_inner());

        assert_eq!(once, twice);
        assert_eq!(once.table().len(), 3);
        assert_eq!(once.table().rows[1], vec![None, cell("2")]);
    }

    #[test]
    fn test_raw_mode_keeps_duplicates() {
        let raw = RawTable {
            columns: vec!["k".into()],
            rows: vec![vec![cell("a")], vec![cell("a")]],
        };
        assert_eq!(TableMode::Raw.apply(raw.clone()).len(), 2);
        assert_eq!(TableMode::Deduplicate.apply(raw).len(), 1);
    }

    #[test]
    fn test_sheet_rows_have_no_missing_values() {
        let raw = RawTable {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![None, cell("x")], vec![cell("y"), None]],
        };
        assert_eq!(
            raw.to_sheet_rows(),
            vec![vec!["", "x"], vec!["y", ""]]
        );
    }
}

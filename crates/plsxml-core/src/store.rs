//! Accumulating table store with multi-file merge and duplicate removal

use crate::error::{Error, Result};
use crate::parser::{parse_xml, ParseOptions, StagedTable};
use crate::table::{ColumnarTable, Row, Table};
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// What a single [`TableStore::append`] contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendReport {
    /// Input that was parsed
    pub source: PathBuf,
    /// Tables present in the input, in order of first appearance
    pub tables: Vec<String>,
    /// Rows parsed from the input, before duplicate removal
    pub rows_loaded: usize,
    /// Rows removed as duplicates of rows already in the store
    pub duplicates_dropped: usize,
    /// Unit strings that could not be resolved
    pub unit_warnings: Vec<String>,
}

/// Tables accumulated from any number of reports, keyed by table name
///
/// Tables keep the order in which their names were first encountered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStore {
    tables: Vec<Table>,
    index: HashMap<String, usize>,
}

impl TableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a list of inputs (files, archives or directories)
    ///
    /// Inputs that cannot be used are skipped; see [`crate::ingest::load_paths`]
    /// for the full report.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P], options: &ParseOptions) -> Self {
        let mut store = Self::new();
        crate::ingest::load_paths(&mut store, paths, options);
        store
    }

    /// Parse one report stream and merge its tables into the store
    ///
    /// The stream is parsed completely before anything is merged, so an
    /// error leaves the store untouched. Tables already in the store get the
    /// new rows appended and are then de-duplicated (first occurrence wins);
    /// tables absent from this input are not examined.
    pub fn append<R: BufRead>(
        &mut self,
        reader: R,
        source: &Path,
        options: &ParseOptions,
    ) -> Result<AppendReport> {
        progress!(options.verbose, source = %source.display(), "Parsing");

        let staged = parse_xml(reader, source, options)?;

        let mut report = AppendReport {
            source: source.to_path_buf(),
            unit_warnings: staged.unit_warnings,
            ..Default::default()
        };

        for table in staged.tables {
            report.tables.push(table.name.clone());
            report.rows_loaded += table.rows.len();
            report.duplicates_dropped += self.merge_table(table, options.verbose);
        }

        Ok(report)
    }

    /// Parse a single XML report file and merge it into the store
    pub fn append_path<P: AsRef<Path>>(&mut self, path: P, options: &ParseOptions) -> Result<AppendReport> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.append(BufReader::new(file), path, options)
    }

    /// Merge every table of another store into this one
    ///
    /// Returns the number of duplicate rows dropped.
    pub fn merge(&mut self, other: TableStore) -> usize {
        let mut dropped = 0;
        for table in other.tables {
            dropped += self.merge_table(
                StagedTable {
                    name: table.name,
                    rows: table.rows,
                },
                false,
            );
        }
        dropped
    }

    fn merge_table(&mut self, staged: StagedTable, verbose: bool) -> usize {
        match self.index.get(&staged.name) {
            None => {
                let mut table = Table::new(staged.name.clone());
                table.extend_rows(staged.rows);
                self.index.insert(staged.name, self.tables.len());
                self.tables.push(table);
                0
            }
            Some(&i) => {
                let table = &mut self.tables[i];
                table.extend_rows(staged.rows);

                progress!(verbose, table = %table.name, "Dropping Duplicates");
                let dropped = drop_duplicates(&mut table.rows);
                if dropped > 0 {
                    progress!(verbose, table = %table.name, dropped, "Dropped duplicate rows");
                }
                dropped
            }
        }
    }

    /// Get a table by name
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    /// Check if a table is in the store
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Table names in order of first encounter
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Iterate over tables in order of first encounter
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if the store has no tables
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Columnar form of the named tables (all tables when `None`)
    ///
    /// Tables without rows are left out.
    pub fn to_columnar(&self, tables: Option<&[&str]>) -> Result<Vec<ColumnarTable>> {
        let selected: Vec<&Table> = match tables {
            None => self.tables.iter().collect(),
            Some(names) => names
                .iter()
                .map(|name| self.get(name).ok_or_else(|| Error::TableNotFound(name.to_string())))
                .collect::<Result<_>>()?,
        };

        Ok(selected
            .into_iter()
            .filter(|t| !t.rows.is_empty())
            .map(Table::to_columnar)
            .collect())
    }

    /// Tables sorted by name, each with the first row's fields and values
    pub fn table_summary(&self) -> String {
        let mut tables: Vec<&Table> = self.tables.iter().collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::new();
        for table in tables {
            let _ = write!(out, "\n{}\n", table.name);
            if let Some(row) = table.rows.first() {
                for field in row.fields() {
                    let value = match &field.value {
                        Value::String(s) => format!("'{}'", s),
                        other => other.to_string(),
                    };
                    let _ = writeln!(out, "\t{:<60}\t{}", field.name, value);
                }
            }
        }
        out
    }
}

/// Canonical key of a row
///
/// Field names, field order and typed values all take part, so `1` and
/// `1.0` differ while `ft` and `feet` quantities agree.
pub fn row_key(row: &Row) -> String {
    let mut key = String::new();
    for field in row.fields() {
        let _ = write!(key, "{:?}=", field.name);
        field.value.write_key(&mut key);
        key.push(';');
    }
    key
}

/// Remove rows equal to an earlier row, keeping the order of the rest
///
/// Returns the number of rows removed.
pub fn drop_duplicates(rows: &mut Vec<Row>) -> usize {
    let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());
    let before = rows.len();
    rows.retain(|row| seen.insert(row_key(row)));
    before - rows.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT_A: &str = r#"<report>
      <table tagname="spans" titledetail="">
        <span><id>1</id><length>258.2</length></span>
        <span><id>2</id><length>301.5</length></span>
      </table>
    </report>"#;

    const REPORT_B: &str = r#"<report>
      <table tagname="spans" titledetail="">
        <span><id>2</id><length>301.5</length></span>
        <span><id>3</id><length>120.0</length></span>
      </table>
      <table tagname="structures" titledetail="">
        <structure><name>'TERM'</name></structure>
      </table>
    </report>"#;

    fn append_str(store: &mut TableStore, xml: &str, name: &str) -> AppendReport {
        store
            .append(xml.as_bytes(), Path::new(name), &ParseOptions::new())
            .unwrap()
    }

    fn ids(table: &Table) -> Vec<Value> {
        table.rows.iter().map(|r| r.get("id").cloned().unwrap()).collect()
    }

    #[test]
    fn test_append_new_tables() {
        let mut store = TableStore::new();
        let report = append_str(&mut store, REPORT_A, "a.xml");

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("spans").unwrap().row_count(), 2);
        assert_eq!(report.tables, vec!["spans".to_string()]);
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.duplicates_dropped, 0);
    }

    #[test]
    fn test_merge_drops_overlapping_rows() {
        let mut store = TableStore::new();
        append_str(&mut store, REPORT_A, "a.xml");
        let report = append_str(&mut store, REPORT_B, "b.xml");

        let spans = store.get("spans").unwrap();
        assert_eq!(ids(spans), vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["spans", "structures"]);
    }

    #[test]
    fn test_append_same_report_twice_is_idempotent() {
        let mut once = TableStore::new();
        append_str(&mut once, REPORT_B, "b.xml");

        let mut twice = TableStore::new();
        append_str(&mut twice, REPORT_B, "b.xml");
        let report = append_str(&mut twice, REPORT_B, "b.xml");

        assert_eq!(once, twice);
        assert_eq!(report.duplicates_dropped, 3);
    }

    #[test]
    fn test_new_table_keeps_duplicates_within_one_input() {
        let xml = r#"<r><table tagname="t" titledetail=""><x><a>1</a></x><x><a>1</a></x></table></r>"#;
        let mut store = TableStore::new();
        append_str(&mut store, xml, "x.xml");
        assert_eq!(store.get("t").unwrap().row_count(), 2);

        // Once the table exists, the combined rows are de-duplicated
        append_str(&mut store, xml, "x.xml");
        assert_eq!(store.get("t").unwrap().row_count(), 1);
    }

    #[test]
    fn test_untouched_tables_are_not_deduplicated() {
        let dup = r#"<r><table tagname="t" titledetail=""><x><a>1</a></x><x><a>1</a></x></table></r>"#;
        let other = r#"<r><table tagname="u" titledetail=""><x><a>1</a></x></table></r>"#;

        let mut store = TableStore::new();
        append_str(&mut store, dup, "dup.xml");
        append_str(&mut store, other, "other.xml");

        assert_eq!(store.get("t").unwrap().row_count(), 2);
    }

    #[test]
    fn test_failed_append_leaves_store_unchanged() {
        let mut store = TableStore::new();
        append_str(&mut store, REPORT_A, "a.xml");
        let before = store.clone();

        let broken = r#"<report><table tagname="spans" titledetail=""><span><id>9</id></span>"#;
        let result = store.append(broken.as_bytes(), Path::new("broken.xml"), &ParseOptions::new());

        assert!(result.is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn test_drop_duplicates_first_occurrence_wins() {
        let row = |a: i64, b: f64| -> Row {
            [("a", Value::Integer(a)), ("b", Value::Float(b))].into_iter().collect()
        };
        let mut rows = vec![row(1, 1.0), row(2, 2.0), row(1, 1.0), row(3, 3.0), row(2, 2.0)];

        let dropped = drop_duplicates(&mut rows);

        assert_eq!(dropped, 2);
        assert_eq!(rows, vec![row(1, 1.0), row(2, 2.0), row(3, 3.0)]);
    }

    #[test]
    fn test_row_key_is_order_and_type_sensitive() {
        let ab: Row = [("a", Value::Integer(1)), ("b", Value::Integer(2))].into_iter().collect();
        let ba: Row = [("b", Value::Integer(2)), ("a", Value::Integer(1))].into_iter().collect();
        let float: Row = [("a", Value::Float(1.0)), ("b", Value::Integer(2))].into_iter().collect();

        assert_ne!(row_key(&ab), row_key(&ba));
        assert_ne!(row_key(&ab), row_key(&float));
    }

    #[test]
    fn test_row_key_float_edge_cases() {
        let row = |v: Value| -> Row { [("v", v)].into_iter().collect() };

        assert_ne!(row_key(&row(Value::Float(f64::INFINITY))), row_key(&row(Value::Null)));
        assert_ne!(
            row_key(&row(Value::Float(f64::INFINITY))),
            row_key(&row(Value::Float(f64::NEG_INFINITY)))
        );
        assert_eq!(row_key(&row(Value::Float(-0.0))), row_key(&row(Value::Float(0.0))));
        assert_ne!(row_key(&row(Value::from("None"))), row_key(&row(Value::Null)));
    }

    #[test]
    fn test_overflowing_float_is_not_a_duplicate_of_none() {
        let none = r#"<r><table tagname="t" titledetail=""><x><v>None</v></x></table></r>"#;
        let huge = r#"<r><table tagname="t" titledetail=""><x><v>1e400</v></x></table></r>"#;

        let mut store = TableStore::new();
        append_str(&mut store, none, "a.xml");
        let report = append_str(&mut store, huge, "b.xml");

        let values: Vec<Option<&Value>> = store.get("t").unwrap().rows.iter().map(|r| r.get("v")).collect();
        assert_eq!(report.duplicates_dropped, 0);
        assert_eq!(values, vec![Some(&Value::Null), Some(&Value::Float(f64::INFINITY))]);
    }

    #[test]
    fn test_merge_stores() {
        let mut left = TableStore::new();
        append_str(&mut left, REPORT_A, "a.xml");
        let mut right = TableStore::new();
        append_str(&mut right, REPORT_B, "b.xml");

        let dropped = left.merge(right);

        assert_eq!(dropped, 1);
        assert_eq!(left.get("spans").unwrap().row_count(), 3);
        assert!(left.contains("structures"));
    }

    #[test]
    fn test_to_columnar_skips_empty_and_rejects_unknown() {
        let xml = r#"<r><table tagname="empty" titledetail=""/></r>"#;
        let mut store = TableStore::new();
        append_str(&mut store, REPORT_A, "a.xml");
        append_str(&mut store, xml, "e.xml");

        let all = store.to_columnar(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "spans");

        assert!(matches!(
            store.to_columnar(Some(&["missing"][..])),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_table_summary() {
        let mut store = TableStore::new();
        append_str(&mut store, REPORT_B, "b.xml");

        let summary = store.table_summary();
        assert!(summary.starts_with("\nspans\n"));
        assert!(summary.contains(&format!("\t{:<60}\t'TERM'\n", "name")));
        assert!(summary.contains(&format!("\t{:<60}\t301.5\n", "length")));
        assert!(summary.find("spans").unwrap() < summary.find("structures").unwrap());
    }
}

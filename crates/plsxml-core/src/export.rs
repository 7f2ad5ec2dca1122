//! CSV and JSON export of stored tables

use crate::error::{Error, Result};
use crate::store::TableStore;
use crate::table::Table;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write one table as CSV: a header of column names, then one record per row
///
/// Missing fields and nulls are written as empty cells.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(table.columns.iter().map(|c| c.name.as_str()))?;

    for row in &table.rows {
        let cells = table
            .columns
            .iter()
            .map(|col| row.get(&col.name).map(|v| v.to_string_value()).unwrap_or_default());
        csv_writer.write_record(cells)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write tables as a JSON object of table name to an array of row objects
///
/// `tables` selects and orders the output; all tables in store order when `None`.
pub fn write_json<W: Write>(store: &TableStore, tables: Option<&[&str]>, writer: W) -> Result<()> {
    let selected = select_tables(store, tables)?;
    serde_json::to_writer_pretty(writer, &TableMap(&selected))?;
    Ok(())
}

/// Write each selected table to `<output_dir>/<table>.csv`
///
/// Tables without rows are skipped. Returns the files written.
pub fn export_csv_dir<P: AsRef<Path>>(
    store: &TableStore,
    tables: Option<&[&str]>,
    output_dir: P,
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for table in select_tables(store, tables)? {
        if table.rows.is_empty() {
            continue;
        }
        let path = output_dir.join(format!("{}.csv", table.name));
        let file = File::create(&path)?;
        write_csv(table, BufWriter::new(file))?;
        written.push(path);
    }

    Ok(written)
}

fn select_tables<'a>(store: &'a TableStore, tables: Option<&[&str]>) -> Result<Vec<&'a Table>> {
    match tables {
        None => Ok(store.iter().collect()),
        Some(names) => names
            .iter()
            .map(|name| store.get(name).ok_or_else(|| Error::TableNotFound(name.to_string())))
            .collect(),
    }
}

struct TableMap<'a>(&'a [&'a Table]);

impl Serialize for TableMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for table in self.0 {
            map.serialize_entry(&table.name, &table.rows)?;
        }
        map.end()
    }
}

//! Core table types for representing report data

use crate::value::Value;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;

/// Field name under which a table's title detail is injected into each row
pub const TITLE_DETAIL_FIELD: &str = "titledetail";

static NULL: Value = Value::Null;

/// A named value within a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field (column) name, the element tag in the report
    pub name: String,
    /// Coerced value
    pub value: Value,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One record of a table: fields in insertion order
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<Field>,
}

impl Row {
    /// Create a new empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field; an existing name keeps its position and gets the new value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field::new(name, value)),
        }
    }

    /// Get a value by field name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Fields in insertion order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (N, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "a map of field names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    row.insert(name, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name (field element tag)
    pub name: String,
    /// Column index (0-based, first-seen order)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A named table of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name (the `tagname` attribute)
    pub name: String,
    /// Union of field names across rows, in first-seen order
    pub columns: Vec<Column>,
    /// Row data, append-only
    pub rows: Vec<Row>,
}

impl Table {
    /// Create a new empty table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Append rows, registering any new column names
    pub fn extend_rows(&mut self, rows: impl IntoIterator<Item = Row>) {
        let mut known: HashSet<String> = self.columns.iter().map(|c| c.name.clone()).collect();

        for row in rows {
            for name in row.names() {
                if known.insert(name.to_string()) {
                    let index = self.columns.len();
                    self.columns.push(Column::new(name.to_string(), index));
                }
            }
            self.rows.push(row);
        }
    }

    /// Values of one column, `Null` where a row lacks the field
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        self.find_column(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(name).unwrap_or(&NULL))
                .collect(),
        )
    }

    /// Convert to columnar form
    pub fn to_columnar(&self) -> ColumnarTable {
        let columns = self
            .columns
            .iter()
            .map(|col| ColumnData {
                name: col.name.clone(),
                values: self
                    .rows
                    .iter()
                    .map(|row| row.get(&col.name).cloned().unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();

        ColumnarTable {
            name: self.name.clone(),
            columns,
        }
    }
}

/// A table pivoted into columns of equal length
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnarTable {
    /// Table name
    pub name: String,
    /// Columns in first-seen order
    pub columns: Vec<ColumnData>,
}

impl ColumnarTable {
    /// Number of rows (length of every column)
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One column of a [`ColumnarTable`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnData {
    pub name: String,
    pub values: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, Value)]) -> Row {
        fields.iter().cloned().collect()
    }

    #[test]
    fn test_row_insert_keeps_first_position() {
        let mut r = Row::new();
        r.insert("a", Value::Integer(1));
        r.insert("b", Value::Integer(2));
        r.insert("a", Value::Integer(3));

        let names: Vec<&str> = r.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(r.get("a"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_row_serializes_in_field_order() {
        let r = row(&[("z", Value::Integer(1)), ("a", Value::from("x"))]);
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"z":1,"a":"x"}"#);

        let back: Row = serde_json::from_str(r#"{"z":1,"a":"x"}"#).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_columns_accumulate_in_first_seen_order() {
        let mut table = Table::new("t");
        table.extend_rows(vec![
            row(&[("b", Value::Integer(1)), ("a", Value::Integer(2))]),
            row(&[("a", Value::Integer(3)), ("c", Value::Integer(4))]),
        ]);

        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(table.columns[2].index, 2);
    }

    #[test]
    fn test_column_fills_missing_with_null() {
        let mut table = Table::new("t");
        table.extend_rows(vec![
            row(&[("a", Value::Integer(1))]),
            row(&[("b", Value::Integer(2))]),
        ]);

        assert_eq!(table.column("a").unwrap(), vec![&Value::Integer(1), &Value::Null]);
        assert!(table.column("missing").is_none());

        let columnar = table.to_columnar();
        assert_eq!(columnar.row_count(), 2);
        assert_eq!(columnar.column("b").unwrap().values, vec![Value::Null, Value::Integer(2)]);
    }
}

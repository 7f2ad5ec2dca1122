//! Streaming XML parser for PLS-CADD report files
//!
//! The reader walks start/end events without building a document tree and
//! reconstructs `table -> row -> field` structure with a small state machine:
//!
//! - `<table tagname=".." titledetail="..">` opens a table (subject to the
//!   table filter)
//! - the first child element of an open table opens a row; `source_file`
//!   children are skipped
//! - every element closing inside a row, other than the row itself, is a
//!   field whose tag is the column name and whose text is the raw value
//!
//! Only the current row and the rows staged so far are held in memory.

use crate::error::{Error, Result};
use crate::table::{Row, TITLE_DETAIL_FIELD};
use crate::units::attach_units;
use crate::value::Value;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeSet, HashMap};
use std::io::BufRead;
use std::path::{Path, PathBuf};

const TABLE_TAG: &str = "table";
const SOURCE_FILE_TAG: &str = "source_file";
const TAGNAME_ATTR: &str = "tagname";
const TITLE_DETAIL_ATTR: &str = "titledetail";
const UNITS_ATTR: &str = "units";

/// Options controlling how a report is parsed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOptions {
    /// Table names to load; `None` loads every table, an empty set loads none
    pub tables: Option<BTreeSet<String>>,
    /// Attach `units` attributes to numeric fields
    pub units: bool,
    /// Report per-file and per-table progress at info level
    pub verbose: bool,
}

impl ParseOptions {
    /// Options that load every table without units
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict loading to the given table names
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable unit attachment
    pub fn with_units(mut self, units: bool) -> Self {
        self.units = units;
        self
    }

    /// Enable or disable progress messages
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether a table with this name passes the filter
    pub fn accepts(&self, table: &str) -> bool {
        self.tables.as_ref().is_none_or(|t| t.contains(table))
    }
}

/// Rows collected for one table during a single parse
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTable {
    pub name: String,
    pub rows: Vec<Row>,
}

/// Everything one report contributed, before merging into a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    /// Tables in order of first appearance
    pub tables: Vec<StagedTable>,
    /// Unit strings that could not be resolved, in order of first appearance
    pub unit_warnings: Vec<String>,
}

impl ParseOutput {
    /// Find a staged table by name
    pub fn table(&self, name: &str) -> Option<&StagedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Total number of staged rows
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

/// The table currently open, as an index into the staged tables
struct OpenTable {
    index: usize,
    title_detail: Option<Value>,
}

struct OpenRow {
    tag: String,
    row: Row,
}

enum State {
    OutsideTable,
    InTable(OpenTable),
    InRow(OpenTable, OpenRow),
}

/// Transient state for one traversal of one report
struct ParseContext<'a> {
    source: &'a Path,
    options: &'a ParseOptions,
    state: State,
    output: ParseOutput,
    staged_index: HashMap<String, usize>,
    /// Text seen since the last start/end event
    text: Option<String>,
    /// `units` attribute of the most recently opened element inside a row
    pending_units: Option<String>,
    /// Depth inside a skipped `source_file` element
    skip_depth: usize,
}

impl<'a> ParseContext<'a> {
    fn new(source: &'a Path, options: &'a ParseOptions) -> Self {
        Self {
            source,
            options,
            state: State::OutsideTable,
            output: ParseOutput::default(),
            staged_index: HashMap::new(),
            text: None,
            pending_units: None,
            skip_depth: 0,
        }
    }

    fn start(&mut self, e: &BytesStart) -> Result<()> {
        self.text = None;

        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(());
        }

        let tag = tag_name(e);

        if tag == TABLE_TAG {
            return self.open_table(e);
        }

        match self.state {
            State::OutsideTable => {}
            State::InTable(_) if tag == SOURCE_FILE_TAG => {
                self.skip_depth = 1;
            }
            State::InTable(_) => self.open_row(tag),
            State::InRow(..) => {
                self.pending_units = if self.options.units {
                    optional_attr(e, UNITS_ATTR).map_err(|source| self.xml_error(source, 0))?
                } else {
                    None
                };
            }
        }

        Ok(())
    }

    fn open_row(&mut self, tag: String) {
        if let State::InTable(table) = std::mem::replace(&mut self.state, State::OutsideTable) {
            let mut row = Row::new();
            if let Some(title_detail) = &table.title_detail {
                row.insert(TITLE_DETAIL_FIELD, title_detail.clone());
            }
            self.state = State::InRow(table, OpenRow { tag, row });
        }
    }

    fn open_table(&mut self, e: &BytesStart) -> Result<()> {
        if !matches!(self.state, State::OutsideTable) {
            return Err(Error::Malformed {
                path: self.source.to_path_buf(),
                message: "nested <table> element".to_string(),
            });
        }

        let name = self.required_attr(e, TAGNAME_ATTR)?;
        if !self.options.accepts(&name) {
            return Ok(());
        }

        let title_detail = self.required_attr(e, TITLE_DETAIL_ATTR)?;
        let title_detail = (!title_detail.is_empty()).then(|| Value::coerce(&title_detail));

        progress!(self.options.verbose, table = %name, "Loading");

        let index = match self.staged_index.get(&name) {
            Some(&index) => index,
            None => {
                let index = self.output.tables.len();
                self.output.tables.push(StagedTable {
                    name: name.clone(),
                    rows: Vec::new(),
                });
                self.staged_index.insert(name, index);
                index
            }
        };

        self.state = State::InTable(OpenTable {
            index,
            title_detail,
        });
        Ok(())
    }

    fn end(&mut self, tag: &str) {
        let text = self.text.take();

        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }

        if tag == TABLE_TAG {
            // A row left open at the end of its table is dropped
            self.state = State::OutsideTable;
            return;
        }

        let state = std::mem::replace(&mut self.state, State::OutsideTable);
        self.state = match state {
            State::InRow(table, open) if open.tag == tag => {
                self.output.tables[table.index].rows.push(open.row);
                State::InTable(table)
            }
            State::InRow(table, mut open) => {
                let value = self.field_value(text.as_deref());
                open.row.insert(tag, value);
                State::InRow(table, open)
            }
            other => other,
        };
    }

    fn field_value(&mut self, text: Option<&str>) -> Value {
        let value = Value::coerce_opt(text);

        let Some(units) = self.pending_units.take() else {
            return value;
        };
        if !value.is_number() || units.trim().is_empty() {
            return value;
        }

        match attach_units(value.clone(), &units) {
            Ok(with_unit) => with_unit,
            Err(err) => {
                tracing::debug!(source = %self.source.display(), error = %err, "unit not resolved");
                if !self.output.unit_warnings.contains(&units) {
                    self.output.unit_warnings.push(units);
                }
                value
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        self.text.get_or_insert_with(String::new).push_str(text);
    }

    fn required_attr(&self, e: &BytesStart, attr: &str) -> Result<String> {
        optional_attr(e, attr)
            .map_err(|source| self.xml_error(source, 0))?
            .ok_or_else(|| Error::MissingAttribute {
                path: self.source.to_path_buf(),
                element: tag_name(e),
                attribute: attr.to_string(),
            })
    }

    fn xml_error(&self, source: quick_xml::Error, position: u64) -> Error {
        Error::Xml {
            path: self.source.to_path_buf(),
            position,
            source,
        }
    }
}

fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn optional_attr(e: &BytesStart, attr: &str) -> std::result::Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute(attr)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Parse a report from any buffered byte stream
///
/// `source` names the input in errors and log messages. The stream is read
/// once, front to back; nothing is merged anywhere until it has been
/// consumed without error.
pub fn parse_xml<R: BufRead>(reader: R, source: &Path, options: &ParseOptions) -> Result<ParseOutput> {
    let mut reader = Reader::from_reader(reader);
    let mut ctx = ParseContext::new(source, options);
    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut seen_root = false;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ctx.xml_error(e, position))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                seen_root = true;
                ctx.start(&e).map_err(|err| at_position(err, position))?;
            }
            Event::Empty(e) => {
                seen_root = true;
                ctx.start(&e).map_err(|err| at_position(err, position))?;
                ctx.end(&tag_name(&e));
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                ctx.end(&String::from_utf8_lossy(e.name().as_ref()));
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| ctx.xml_error(err, position))?;
                ctx.push_text(&text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                ctx.push_text(&text);
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if !seen_root {
        return Err(Error::Malformed {
            path: source.to_path_buf(),
            message: "no root element found".to_string(),
        });
    }
    if depth > 0 {
        return Err(Error::Malformed {
            path: source.to_path_buf(),
            message: format!("unexpected end of document with {} unclosed element(s)", depth),
        });
    }

    if !ctx.output.unit_warnings.is_empty() {
        tracing::warn!(
            source = %source.display(),
            units = ?ctx.output.unit_warnings,
            "Could not verify units; values kept as bare numbers"
        );
    }

    Ok(ctx.output)
}

/// Parse a report held in memory (useful for testing)
pub fn parse_xml_str(content: &str, source_name: &str, options: &ParseOptions) -> Result<ParseOutput> {
    parse_xml(content.as_bytes(), &PathBuf::from(source_name), options)
}

fn at_position(err: Error, position: u64) -> Error {
    match err {
        Error::Xml { path, source, .. } => Error::Xml {
            path,
            position,
            source,
        },
        other => other,
    }
}

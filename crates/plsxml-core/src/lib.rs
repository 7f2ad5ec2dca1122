//! plsxml-core: Core library for parsing and merging PLS-CADD XML reports
//!
//! This library provides functionality to:
//! - Stream report XML into typed rows grouped by table name
//! - Coerce field text into integers, floats, booleans, strings and nulls
//! - Optionally attach physical units from `units` attributes
//! - Merge several reports into one store, dropping duplicate rows
//! - Discover reports in directories and ZIP archives
//! - Export tables in columnar, CSV and JSON form

/// Log a progress message at info level when `verbose`, debug otherwise
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod error;
pub mod export;
pub mod ingest;
pub mod manifest;
pub mod parser;
pub mod scanner;
pub mod store;
pub mod table;
pub mod units;
pub mod value;

pub use error::{Error, Result};
pub use export::{export_csv_dir, write_csv, write_json};
pub use ingest::{load_paths, InputFailure, LoadReport};
pub use manifest::LoadManifest;
pub use parser::{parse_xml, parse_xml_str, ParseOptions, ParseOutput, StagedTable};
pub use scanner::{scan_inputs, InputSource, ScanResult, SkippedInput};
pub use store::{AppendReport, TableStore};
pub use table::{ColumnData, ColumnarTable, Column, Field, Row, Table, TITLE_DETAIL_FIELD};
pub use units::{attach_units, resolve_unit, Quantity, Unit, UnitError};
pub use value::Value;

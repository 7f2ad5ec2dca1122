//! Ingestion driver: load every discovered input into a store

use crate::error::{Error, Result};
use crate::parser::ParseOptions;
use crate::scanner::{open_archive, scan_inputs, InputSource, SkippedInput};
use crate::store::{AppendReport, TableStore};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// An input that was found but could not be loaded
#[derive(Debug)]
pub struct InputFailure {
    /// Input path (`archive.zip/member.xml` for archive members)
    pub source: PathBuf,
    pub error: Error,
}

/// Outcome of [`load_paths`]
#[derive(Debug, Default)]
pub struct LoadReport {
    /// One entry per input merged into the store, in load order
    pub appended: Vec<AppendReport>,
    /// Paths that were not reports
    pub skipped: Vec<SkippedInput>,
    /// Inputs that failed to parse; the store is unchanged by each of them
    pub failures: Vec<InputFailure>,
}

impl LoadReport {
    /// True when every input was loaded and nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failures.is_empty()
    }

    /// Total rows parsed across all loaded inputs
    pub fn rows_loaded(&self) -> usize {
        self.appended.iter().map(|r| r.rows_loaded).sum()
    }

    /// Total duplicate rows dropped across all loaded inputs
    pub fn duplicates_dropped(&self) -> usize {
        self.appended.iter().map(|r| r.duplicates_dropped).sum()
    }
}

type OpenArchive = (PathBuf, ZipArchive<BufReader<File>>);

/// Load files, archives and directories into a store, in the given order
///
/// Unusable paths are logged and recorded as skipped. An input that fails
/// to parse is logged and recorded as a failure; loading continues with the
/// next input.
pub fn load_paths<P: AsRef<Path>>(
    store: &mut TableStore,
    paths: &[P],
    options: &ParseOptions,
) -> LoadReport {
    let scan = scan_inputs(paths);

    for skipped in &scan.skipped {
        tracing::warn!(path = %skipped.path.display(), reason = %skipped.reason, "Skipping input");
    }

    let mut report = LoadReport {
        skipped: scan.skipped,
        ..Default::default()
    };

    // Consecutive members of one archive share a single open handle
    let mut current: Option<OpenArchive> = None;

    for input in scan.inputs {
        let result = match &input {
            InputSource::File(path) => {
                current = None;
                store.append_path(path, options)
            }
            InputSource::ArchiveMember { archive, member } => {
                append_member(store, &mut current, archive, member, options)
            }
        };

        match result {
            Ok(appended) => report.appended.push(appended),
            Err(error) => {
                let source = input.display_path();
                tracing::error!(source = %source.display(), %error, "Failed to load input");
                report.failures.push(InputFailure { source, error });
            }
        }
    }

    report
}

fn append_member(
    store: &mut TableStore,
    current: &mut Option<OpenArchive>,
    archive_path: &Path,
    member: &str,
    options: &ParseOptions,
) -> Result<AppendReport> {
    let archive = match current.take() {
        Some((path, archive)) if path.as_path() == archive_path => archive,
        _ => open_archive(archive_path)?,
    };
    let (_, archive) = current.insert((archive_path.to_path_buf(), archive));

    let entry = archive.by_name(member).map_err(|e| Error::Archive {
        path: archive_path.to_path_buf(),
        source: e,
    })?;

    store.append(BufReader::new(entry), &archive_path.join(member), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn report(table: &str, id: i64) -> String {
        format!(
            r#"<report><table tagname="{table}" titledetail=""><row><id>{id}</id></row></table></report>"#
        )
    }

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_load_archive_members_in_order() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("reports.zip");
        let (first, second) = (report("spans", 2), report("spans", 1));
        write_zip(
            &archive,
            &[
                ("b.xml", first.as_str()),
                ("notes.txt", "not a report"),
                ("__MACOSX/._b.xml", "junk"),
                ("a.xml", second.as_str()),
            ],
        );

        let mut store = TableStore::new();
        let report = load_paths(&mut store, &[&archive], &ParseOptions::new());

        assert!(report.is_clean());
        assert_eq!(report.appended.len(), 2);
        assert_eq!(report.appended[0].source, archive.join("b.xml"));
        assert_eq!(report.appended[1].source, archive.join("a.xml"));

        let ids: Vec<String> = store
            .get("spans")
            .unwrap()
            .rows
            .iter()
            .map(|r| r.get("id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn test_failure_does_not_stop_loading() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("a_broken.xml");
        let good = dir.path().join("b_good.xml");
        fs::write(&broken, "<report><table tagname=\"spans\" titledetail=\"\">").unwrap();
        fs::write(&good, report("spans", 7)).unwrap();

        let mut store = TableStore::new();
        let report = load_paths(&mut store, &[dir.path()], &ParseOptions::new());

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, broken);
        assert_eq!(report.appended.len(), 1);
        assert_eq!(store.get("spans").unwrap().row_count(), 1);
    }

    #[test]
    fn test_unusable_paths_are_skipped() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.docx");
        fs::write(&text, "hello").unwrap();
        let empty_zip = dir.path().join("empty.zip");
        write_zip(&empty_zip, &[("readme.txt", "no reports here")]);

        let missing = dir.path().join("missing.xml");
        let mut store = TableStore::new();
        let report = load_paths(&mut store, &[&missing, &text, &empty_zip], &ParseOptions::new());

        assert!(store.is_empty());
        assert!(report.appended.is_empty());
        let skipped: Vec<&Path> = report.skipped.iter().map(|s| s.path.as_path()).collect();
        assert_eq!(skipped, vec![missing.as_path(), text.as_path(), empty_zip.as_path()]);
    }

    #[test]
    fn test_report_totals() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.xml");
        let second = dir.path().join("second.xml");
        fs::write(&first, report("spans", 1)).unwrap();
        fs::write(&second, report("spans", 1)).unwrap();

        let mut store = TableStore::new();
        let report = load_paths(&mut store, &[&first, &second], &ParseOptions::new());

        assert_eq!(report.rows_loaded(), 2);
        assert_eq!(report.duplicates_dropped(), 1);
        assert_eq!(store.get("spans").unwrap().row_count(), 1);
    }
}

//! Input discovery: resolve paths into XML reports and archive members

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Leading bytes of a ZIP archive
const ZIP_MAGIC: &[u8; 2] = b"PK";

/// Directory that macOS adds to archives for resource forks
const PLATFORM_METADATA_DIR: &str = "__MACOSX";

/// A single report stream to parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// A plain XML file
    File(PathBuf),
    /// An XML member of a ZIP archive
    ArchiveMember { archive: PathBuf, member: String },
}

impl InputSource {
    /// Path used to name this input in reports and errors
    pub fn display_path(&self) -> PathBuf {
        match self {
            InputSource::File(path) => path.clone(),
            InputSource::ArchiveMember { archive, member } => archive.join(member),
        }
    }
}

/// An input path that was not used, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedInput {
    fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result of resolving input paths
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Paths that were resolved, as given
    pub roots: Vec<PathBuf>,
    /// Report streams in load order
    pub inputs: Vec<InputSource>,
    /// Paths that were skipped
    pub skipped: Vec<SkippedInput>,
}

/// Resolve paths into report inputs, in order
///
/// - a directory is walked for `.xml` and `.zip` files, sorted by name
/// - a ZIP archive contributes its XML members in archive order
/// - an `.xml` file is used as is
///
/// Anything else is recorded in [`ScanResult::skipped`]; scanning never fails.
pub fn scan_inputs<P: AsRef<Path>>(paths: &[P]) -> ScanResult {
    let mut result = ScanResult {
        roots: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
        ..Default::default()
    };

    for path in paths {
        let path = path.as_ref();

        if !path.exists() {
            result.skipped.push(SkippedInput::new(path, "path does not exist"));
        } else if path.is_dir() {
            scan_directory(path, &mut result);
        } else {
            classify_file(path, &mut result);
        }
    }

    result
}

fn scan_directory(root: &Path, result: &mut ScanResult) {
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                result.skipped.push(SkippedInput::new(&path, e.to_string()));
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_file() && (has_extension(path, "xml") || has_extension(path, "zip")) {
            classify_file(path, result);
        }
    }
}

fn classify_file(path: &Path, result: &mut ScanResult) {
    match is_zip_archive(path) {
        Ok(true) => match list_report_members(path) {
            Ok(members) if members.is_empty() => {
                result
                    .skipped
                    .push(SkippedInput::new(path, "archive contains no XML reports"));
            }
            Ok(members) => {
                result.inputs.extend(members.into_iter().map(|member| InputSource::ArchiveMember {
                    archive: path.to_path_buf(),
                    member,
                }));
            }
            Err(e) => result.skipped.push(SkippedInput::new(path, e.to_string())),
        },
        Ok(false) if has_extension(path, "xml") => {
            result.inputs.push(InputSource::File(path.to_path_buf()));
        }
        Ok(false) => {
            result
                .skipped
                .push(SkippedInput::new(path, "not an XML report or ZIP archive"));
        }
        Err(e) => result.skipped.push(SkippedInput::new(path, e.to_string())),
    }
}

/// Check the file signature for a ZIP archive
pub fn is_zip_archive(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Open a ZIP archive for reading
pub fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| Error::Archive {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Names of the XML report members of an archive, in archive order
pub fn list_report_members(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(path)?;
    let mut members = Vec::new();

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| Error::Archive {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !entry.is_dir() && is_report_member(entry.name()) {
            members.push(entry.name().to_string());
        }
    }

    Ok(members)
}

/// Whether an archive member name looks like a report
fn is_report_member(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".xml")
        && !name.split('/').any(|part| part == PLATFORM_METADATA_DIR)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_report_member() {
        assert!(is_report_member("galloping.xml"));
        assert!(is_report_member("reports/GALLOPING.XML"));
        assert!(!is_report_member("__MACOSX/._galloping.xml"));
        assert!(!is_report_member("reports/__MACOSX/galloping.xml"));
        assert!(!is_report_member("readme.txt"));
        assert!(!is_report_member("galloping.xml.bak"));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("a/b.xml"), "xml"));
        assert!(has_extension(Path::new("b.ZIP"), "zip"));
        assert!(!has_extension(Path::new("b.docx"), "xml"));
        assert!(!has_extension(Path::new("xml"), "xml"));
    }

    #[test]
    fn test_display_path() {
        let member = InputSource::ArchiveMember {
            archive: PathBuf::from("data/reports.zip"),
            member: "galloping.xml".to_string(),
        };
        assert_eq!(member.display_path(), PathBuf::from("data/reports.zip/galloping.xml"));
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let result = scan_inputs(&["does/not/exist.xml"]);
        assert!(result.inputs.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, "path does not exist");
    }
}

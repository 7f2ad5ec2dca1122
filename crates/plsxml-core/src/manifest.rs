//! Load manifests: a saved description of what to load and export

use crate::error::{Error, Result};
use crate::parser::ParseOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A JSON file describing a repeatable load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadManifest {
    /// Files, archives or directories to load, in order
    pub sources: Vec<PathBuf>,
    /// Tables to keep; all tables when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    /// Attach units from `units` attributes
    #[serde(default)]
    pub units: bool,
    /// Log progress at info level
    #[serde(default)]
    pub verbose: bool,
    /// Where to write the JSON export; stdout when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl LoadManifest {
    /// Create a manifest loading every table from `sources`
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self {
            sources,
            tables: None,
            units: false,
            verbose: false,
            output: None,
        }
    }

    /// Load a manifest from JSON
    ///
    /// Relative sources and output are taken relative to the manifest's
    /// directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut manifest: LoadManifest = serde_json::from_str(&content)?;

        if manifest.sources.is_empty() {
            return Err(Error::InvalidInput {
                path: path.to_path_buf(),
                reason: "manifest lists no sources".to_string(),
            });
        }

        if let Some(base) = path.parent() {
            for source in &mut manifest.sources {
                if source.is_relative() {
                    *source = base.join(&*source);
                }
            }
            if let Some(output) = manifest.output.as_mut().filter(|o| o.is_relative()) {
                *output = base.join(&*output);
            }
        }

        Ok(manifest)
    }

    /// Save the manifest to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parse options described by this manifest
    pub fn options(&self) -> ParseOptions {
        let options = ParseOptions::new()
            .with_units(self.units)
            .with_verbose(self.verbose);
        match &self.tables {
            Some(tables) => options.with_tables(tables.iter().cloned()),
            None => options,
        }
    }
}

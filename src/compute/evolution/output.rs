//! Artifacts written when the best solution improves.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::schema::{Dataset, Measure, OutputConfig, OutputKind, OutputPrefix};

/// Suffix of the setup record artifact.
pub const SETUP_SUFFIX: &str = ".setup.json";
/// Suffix of the evaluation dataset artifact.
pub const DATA_SUFFIX: &str = ".data.csv";

/// Errors while writing artifacts. These are logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Textual description of an improved solution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupRecord {
    pub measure: Measure,
    pub raw_fitness: f64,
    pub adjusted_fitness: f64,
    pub model: String,
    pub decoder: String,
    pub genotype: String,
    pub weights: Vec<u32>,
    pub iteration: usize,
    pub details: BTreeMap<String, String>,
}

/// File-system side of artifact emission.
pub trait ArtifactWriter: Send + Sync {
    fn write_setup(&self, stem: &str, record: &SetupRecord) -> Result<PathBuf, OutputError>;
    fn write_data(&self, stem: &str, data: &Dataset) -> Result<PathBuf, OutputError>;
}

/// Writes artifacts into one directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectoryOutput {
    directory: PathBuf,
}

impl DirectoryOutput {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ArtifactWriter for DirectoryOutput {
    fn write_setup(&self, stem: &str, record: &SetupRecord) -> Result<PathBuf, OutputError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(format!("{stem}{SETUP_SUFFIX}"));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    fn write_data(&self, stem: &str, data: &Dataset) -> Result<PathBuf, OutputError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(format!("{stem}{DATA_SUFFIX}"));
        data.write_csv(BufWriter::new(File::create(&path)?))?;
        Ok(path)
    }
}

/// Replace path separators so a name stays inside the output directory.
fn file_component(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Decides which artifacts to write and how to name them.
pub struct OutputEmitter {
    kind: OutputKind,
    prefix: String,
    writer: Box<dyn ArtifactWriter>,
}

impl OutputEmitter {
    pub fn new(kind: OutputKind, prefix: String, writer: Box<dyn ArtifactWriter>) -> Self {
        Self {
            kind,
            prefix,
            writer,
        }
    }

    /// Emitter for a configuration, or `None` when nothing is to be written.
    pub fn from_config(config: &OutputConfig, relation: &str) -> Option<Self> {
        let directory = config.directory.as_ref()?;
        if config.kind == OutputKind::None {
            return None;
        }
        let prefix = match &config.prefix {
            OutputPrefix::None => String::new(),
            OutputPrefix::Relation => format!("{}-", file_component(relation)),
            OutputPrefix::Supplied(p) => format!("{}-", file_component(p)),
        };
        Some(Self::new(
            config.kind,
            prefix,
            Box::new(DirectoryOutput::new(directory)),
        ))
    }

    /// File name stem for an adjusted fitness value.
    pub fn stem(&self, adjusted: f64) -> String {
        format!("{}{}", self.prefix, adjusted)
    }

    /// Write the configured artifacts; failures are logged and skipped.
    /// Returns the paths that were written.
    pub fn emit(&self, record: &SetupRecord, data: &Dataset) -> Vec<PathBuf> {
        let stem = self.stem(record.adjusted_fitness);
        let mut written = Vec::new();

        if self.kind.writes_setup() {
            match self.writer.write_setup(&stem, record) {
                Ok(path) => written.push(path),
                Err(e) => log::warn!("Failed to write setup for {stem}: {e}"),
            }
        }
        if self.kind.writes_data() {
            match self.writer.write_data(&stem, data) {
                Ok(path) => written.push(path),
                Err(e) => log::warn!("Failed to write dataset for {stem}: {e}"),
            }
        }
        written
    }
}

impl std::fmt::Debug for OutputEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputEmitter")
            .field("kind", &self.kind)
            .field("prefix", &self.prefix)
            .finish()
    }
}

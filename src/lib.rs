pub mod admissions;
pub mod aggregate;
pub mod catalog;
pub mod chart;
mod error;
pub mod output;
pub mod pipeline;
pub mod schema;
pub mod trend;
mod util;
pub mod window;

pub use anyhow::{Context, Error};
use qu::ick_use::*;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use crate::{
    admissions::{AgePolicy, Admission, Admissions},
    aggregate::{StreamAggregates, StreamOptions, StreamStats},
    catalog::{CatalogBuilder, FeatureCatalog},
    error::PipelineError,
    pipeline::{RunConfig, RunSummary},
    schema::{Layout, Schema},
    trend::{trend, Sample},
    util::header,
    window::{days_overlapping, Bucket, Interval, Window},
};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
/// Hospital admission id (`HADM_ID`), kept as text exactly as it appears in the source.
pub type StayId = ArcStr;

/// The fixed file names inside a project directory.
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: PathBuf,
}

impl ProjectFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn admissions(&self) -> PathBuf {
        self.root.join("admissions.csv")
    }

    pub fn derived_admissions(&self) -> PathBuf {
        self.root.join("admissions.derived.csv")
    }

    pub fn labs(&self) -> PathBuf {
        self.root.join("labevents.csv")
    }

    pub fn prescriptions(&self) -> PathBuf {
        self.root.join("prescriptions.csv")
    }

    pub fn charts(&self) -> PathBuf {
        self.root.join("chartevents.csv")
    }
}

/// Open a CSV file with a header row for streaming.
///
/// Rows may be ragged; missing required fields are caught when the row is used.
pub fn open_csv(path: impl AsRef<Path>) -> Result<csv::Reader<fs::File>> {
    let path = path.as_ref();
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("unable to open \"{}\"", path.display()))
}

/// Create a CSV file for writing, making parent directories as needed.
pub fn create_csv(path: impl AsRef<Path>) -> Result<csv::Writer<io::BufWriter<fs::File>>> {
    fn inner(path: &Path) -> Result<csv::Writer<io::BufWriter<fs::File>>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("could not create parent")?;
            }
        }
        if util::path_exists(path)? {
            event!(
                Level::WARN,
                "overwriting existing file at \"{}\"",
                path.display()
            );
        }
        let out = io::BufWriter::new(fs::File::create(path)?);
        Ok(csv::Writer::from_writer(out))
    }
    let path = path.as_ref();
    inner(path).with_context(|| format!("unable to create \"{}\"", path.display()))
}

pub fn check_extension(path: &Path, ext: &str) -> Result<()> {
    ensure!(
        matches!(path.extension(), Some(p) if p == ext),
        "filename should end with `.{}`",
        ext
    );
    Ok(())
}

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the admission index and the event streams.
///
/// Only `MissingField`, `MalformedTimestamp`, `InvalidValue` and `IncompleteRow` abort a run.
/// `UnknownStay` and `DegenerateWindow` are counted by the aggregator and the run carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("required column `{column}` is missing from the header of \"{}\"", file.display())]
    MissingField { column: String, file: PathBuf },
    #[error("malformed timestamp {value:?}, expected `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`")]
    MalformedTimestamp { value: String },
    #[error("stay {stay_id} is not in the admission index")]
    UnknownStay { stay_id: String },
    #[error("cannot fit a trend through {count} samples that all share offset {offset}")]
    DegenerateWindow { count: usize, offset: f64 },
    #[error("invalid value {value:?} for `{column}`")]
    InvalidValue { column: String, value: String },
    #[error("row has {found} fields but column {needed} is required")]
    IncompleteRow { found: usize, needed: usize },
}

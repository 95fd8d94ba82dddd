//! Output column layout.
use crate::aggregate::StreamAggregates;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text demographic columns, in the order `Admission::demographics` returns them.
pub const DEMOGRAPHIC_COLUMNS: [&str; 6] = [
    "gender",
    "insurance",
    "language",
    "religion",
    "marital_status",
    "ethnicity",
];

/// Which kind of matrix is being written.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// One row per stay.
    FirstHours,
    /// One row per whole day of each stay, prefixed with the day.
    PerDay,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Layout::FirstHours => f.write_str("first hours"),
            Layout::PerDay => f.write_str("per day"),
        }
    }
}

/// The header of an output file, fixed once every stream has been reduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    layout: Layout,
    columns: Vec<String>,
}

impl Schema {
    pub fn new(
        layout: Layout,
        labs: &StreamAggregates,
        drugs: &StreamAggregates,
        charts: &StreamAggregates,
    ) -> Self {
        let mut columns = vec![];
        if layout == Layout::PerDay {
            columns.push("timestep".to_owned());
        }
        columns.extend(["status", "los", "age"].map(str::to_owned));
        columns.extend(DEMOGRAPHIC_COLUMNS.map(str::to_owned));
        columns.extend(labs.columns());
        columns.extend(drugs.columns());
        columns.extend(charts.columns());

        let schema = Schema { layout, columns };
        debug_assert_eq!(
            schema.width(),
            schema.prefix_width() + labs.width() + drugs.width() + charts.width()
        );
        schema
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn header(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Columns before the first lab feature.
    pub fn prefix_width(&self) -> usize {
        let fixed = 3 + DEMOGRAPHIC_COLUMNS.len();
        match self.layout {
            Layout::FirstHours => fixed,
            Layout::PerDay => fixed + 1,
        }
    }
}

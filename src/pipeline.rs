//! The two end-to-end runs: load admissions, reduce every stream, write the matrix.
use crate::{
    aggregate::{
        aggregate_charts, aggregate_labs, aggregate_prescriptions, StreamAggregates,
        StreamOptions, StreamStats,
    },
    output::{write_first_hours, write_per_day, RowMaterializer},
    schema::{Layout, Schema},
    util, Admissions, ProjectFiles, Window,
};
use itertools::Itertools;
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_FIRST_HOURS: f64 = 24.;

/// Settings for a run, from a TOML file and/or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Directory holding the input files.
    pub project_dir: PathBuf,
    /// Where to write the matrix. Defaults to a file in `project_dir`.
    pub output: Option<PathBuf>,
    /// Window length for first-hours runs.
    pub first_hours: f64,
    pub max_rows: Option<usize>,
    pub first_stay_only: bool,
    /// Seed for age smoothing when deriving admissions.
    pub age_seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            project_dir: PathBuf::from("."),
            output: None,
            first_hours: DEFAULT_FIRST_HOURS,
            max_rows: None,
            first_stay_only: false,
            age_seed: 0,
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<RunConfig> {
            let text = fs::read_to_string(path)?;
            let config: RunConfig = toml::from_str(&text)?;
            config.validate()?;
            Ok(config)
        }
        let path = path.as_ref();
        inner(path).with_context(|| format!("loading config from \"{}\"", path.display()))
    }

    pub fn validate(&self) -> Result {
        ensure!(
            self.first_hours.is_finite() && self.first_hours > 0.,
            "`first_hours` must be a positive number of hours, found {}",
            self.first_hours
        );
        Ok(())
    }

    pub fn files(&self) -> ProjectFiles {
        ProjectFiles::new(&self.project_dir)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            max_rows: self.max_rows,
            first_stay_only: self.first_stay_only,
        }
    }

    /// The output path, or `default_name` inside the project directory.
    pub fn output_or(&self, default_name: &str) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.project_dir.join(default_name))
    }
}

/// Flags shared by every run binary.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// TOML file with run settings. Flags given on the command line take precedence.
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Directory holding the input files.
    #[clap(long, short)]
    pub project_dir: Option<PathBuf>,
    /// Output file (must end in `.csv`).
    #[clap(long, short)]
    pub output: Option<PathBuf>,
    /// Stop each event stream after this many rows.
    #[clap(long)]
    pub max_rows: Option<usize>,
    /// Only process the first stay (input must be grouped by stay).
    #[clap(long)]
    pub first_stay_only: bool,
}

impl RunArgs {
    pub fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(project_dir) = self.project_dir {
            config.project_dir = project_dir;
        }
        if let Some(output) = self.output {
            config.output = Some(output);
        }
        if let Some(max_rows) = self.max_rows {
            config.max_rows = Some(max_rows);
        }
        config.first_stay_only |= self.first_stay_only;
        Ok(config)
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub layout: Layout,
    pub output: PathBuf,
    pub stays: usize,
    pub rows: usize,
    pub columns: usize,
    /// Per stream: name, feature count and row stats.
    pub streams: Vec<(&'static str, usize, StreamStats)>,
}

impl RunSummary {
    fn new(
        layout: Layout,
        output: PathBuf,
        stays: usize,
        rows: usize,
        schema: &Schema,
        streams: [&StreamAggregates; 3],
    ) -> Self {
        RunSummary {
            layout,
            output,
            stays,
            rows,
            columns: schema.width(),
            streams: streams
                .iter()
                .map(|s| (s.name(), s.catalog().len(), *s.stats()))
                .collect(),
        }
    }

    pub fn term_table(&self) -> term_data_table::Table {
        use term_data_table::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            [
                "Stream", "Features", "Rows", "Kept", "Skipped", "Unknown stay", "No value",
                "Unmapped", "Outside window", "Flat trend",
            ]
            .into_iter()
            .fold(Row::new(), |row, title| row.with_cell(Cell::from(title))),
        );
        for (name, features, stats) in &self.streams {
            let cells = [
                *features,
                stats.rows,
                stats.kept,
                stats.skipped(),
                stats.unknown_stay,
                stats.no_value,
                stats.unmapped,
                stats.outside_window,
                stats.degenerate_windows,
            ];
            table.add_row(
                cells
                    .into_iter()
                    .fold(Row::new().with_cell(Cell::from(*name)), |row, n| {
                        row.with_cell(Cell::from(n.to_string()))
                    }),
            );
        }
        table
    }

    pub fn print(&self) {
        util::header(&format!("Run summary ({})", self.layout));
        println!(
            "{} stays, {} rows of {} columns written to \"{}\"",
            self.stays,
            self.rows,
            self.columns,
            self.output.display()
        );
        println!("{}", self.term_table().for_terminal());
    }
}

/// One row per stay, aggregating the first `config.first_hours` hours.
pub fn run_first_hours(config: &RunConfig) -> Result<RunSummary> {
    config.validate()?;
    let output = config.output_or(&format!("first{}hours.csv", config.first_hours));
    crate::check_extension(&output, "csv")?;
    run(
        config,
        Window::FirstHours(config.first_hours),
        Layout::FirstHours,
        output,
    )
}

/// One row per whole day of each stay.
pub fn run_per_day(config: &RunConfig) -> Result<RunSummary> {
    let output = config.output_or("timestep.csv");
    crate::check_extension(&output, "csv")?;
    run(config, Window::PerDay, Layout::PerDay, output)
}

fn run(config: &RunConfig, window: Window, layout: Layout, output: PathBuf) -> Result<RunSummary> {
    let files = config.files();
    let opts = config.stream_options();
    event!(
        Level::INFO,
        "aggregating {} in \"{}\"",
        window,
        files.root().display()
    );

    let admissions = Admissions::load_derived(files.derived_admissions(), config.first_stay_only)?;
    event!(Level::INFO, "loaded {} stays", admissions.len());

    let labs = aggregate_labs(files.labs(), &admissions, window, &opts)?;
    let drugs = aggregate_prescriptions(files.prescriptions(), &admissions, window, &opts)?;
    let charts = aggregate_charts(files.charts(), &admissions, window, &opts)?;
    for stream in [&labs, &drugs, &charts] {
        event!(
            Level::DEBUG,
            "{} features over {} stays: {}",
            stream.name(),
            stream.stay_count(),
            stream.catalog().names().join(", ")
        );
    }

    let schema = Schema::new(layout, &labs, &drugs, &charts);
    let materializer = RowMaterializer::new(&schema, &labs, &drugs, &charts);
    let rows = match layout {
        Layout::FirstHours => write_first_hours(&output, &materializer, &admissions)?,
        Layout::PerDay => write_per_day(&output, &materializer, &admissions)?,
    };

    Ok(RunSummary::new(
        layout,
        output,
        admissions.len(),
        rows,
        &schema,
        [&labs, &drugs, &charts],
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config: RunConfig = toml::from_str("project_dir = \"data\"\nmax_rows = 10\n").unwrap();
        assert_eq!(config.first_hours, 24.);
        assert_eq!(config.max_rows, Some(10));
        assert_eq!(config.output_or("timestep.csv"), Path::new("data/timestep.csv"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "project_dir = \"data\"\nfirst_hours = 48.0\n").unwrap();
        let args = RunArgs {
            config: Some(path),
            project_dir: None,
            output: Some("out.csv".into()),
            max_rows: None,
            first_stay_only: true,
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.project_dir, Path::new("data"));
        assert_eq!(config.first_hours, 48.);
        assert_eq!(config.output_or("x.csv"), Path::new("out.csv"));
        assert!(config.first_stay_only);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(toml::from_str::<RunConfig>("project = \"data\"\n").is_err());
    }

    #[test]
    fn window_must_be_positive() {
        let config = RunConfig {
            first_hours: 0.,
            ..RunConfig::default()
        };
        assert!(run_first_hours(&config).is_err());
    }

    #[test]
    fn summary_table_has_a_row_per_stream() {
        let stats = StreamStats {
            rows: 10,
            kept: 4,
            unknown_stay: 1,
            no_value: 2,
            unmapped: 0,
            outside_window: 3,
            degenerate_windows: 1,
        };
        assert_eq!(stats.skipped(), 6);
        let summary = RunSummary {
            layout: Layout::FirstHours,
            output: "out.csv".into(),
            stays: 2,
            rows: 2,
            columns: 12,
            streams: vec![("labs", 3, stats), ("charts", 1, StreamStats::default())],
        };
        let text = summary.term_table().for_terminal().to_string();
        assert!(text.contains("Skipped"));
        assert!(text.contains("labs"));
        assert!(text.contains("charts"));
    }

    #[test]
    fn output_must_be_csv() {
        let config = RunConfig {
            output: Some("out.tsv".into()),
            ..RunConfig::default()
        };
        let err = run_per_day(&config).unwrap_err();
        assert!(err.to_string().contains(".csv"));
    }
}

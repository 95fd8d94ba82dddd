//! Windowed aggregation of the clinical event streams.
//!
//! Each stream is read once, front to back. Every row is projected onto its stay's admission
//! time, put in a window, and its raw value kept in that `(stay, window, feature)` bucket. Feature
//! names are interned into a `CatalogBuilder` as they are first seen. When the file is consumed
//! the catalog is frozen and the buckets are reduced:
//!
//! - point streams (labs, chart vitals) give `[mean, trend]` per feature,
//! - the prescription stream gives a `0`/`1` presence flag per drug.
//!
//! Rows that cannot contribute (unknown stay, no numeric value, chart code that isn't a vital we
//! track, outside the window) are counted in `StreamStats` and skipped. Malformed timestamps and
//! missing columns abort the pass.
use crate::{
    admissions::Admissions,
    catalog::{CatalogBuilder, FeatureCatalog, FeatureIdx},
    chart::VitalCategory,
    trend::{mean, try_trend, Sample},
    util::{parse_numeric, parse_timestamp, resolve_columns, round3, select_fields},
    window::{Bucket, Interval, Window},
    StayId,
};
use qu::ick_use::*;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

/// How often to log progress while streaming.
pub const PROGRESS_EVERY: usize = 100_000;

/// Limits for quick runs over large files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamOptions {
    /// Stop after this many data rows.
    pub max_rows: Option<usize>,
    /// Stop at the first row belonging to a different stay than the first row. Assumes the file
    /// is grouped by stay.
    pub first_stay_only: bool,
}

/// What happened to the rows of one stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Data rows read.
    pub rows: usize,
    /// Rows that contributed to at least one window.
    pub kept: usize,
    pub unknown_stay: usize,
    /// Empty or non-numeric value, or a prescription missing its start, end or drug.
    pub no_value: usize,
    /// Chart codes outside the vital table, or lab rows without a label.
    pub unmapped: usize,
    pub outside_window: usize,
    /// Windows where every sample of a feature had the same offset, so the trend was set to `0`.
    pub degenerate_windows: usize,
}

impl StreamStats {
    pub fn skipped(&self) -> usize {
        self.unknown_stay + self.no_value + self.unmapped + self.outside_window
    }

    fn log(&self, name: &str) {
        event!(
            Level::INFO,
            "{}: read {} rows, kept {}",
            name,
            self.rows,
            self.kept
        );
        if self.unknown_stay > 0 {
            event!(
                Level::WARN,
                "{}: {} rows reference stays missing from admissions",
                name,
                self.unknown_stay
            );
        }
        if self.no_value > 0 {
            event!(Level::WARN, "{}: {} rows had no usable value", name, self.no_value);
        }
        if self.unmapped > 0 {
            event!(Level::WARN, "{}: {} rows had no feature mapping", name, self.unmapped);
        }
        if self.degenerate_windows > 0 {
            event!(
                Level::WARN,
                "{}: {} windows had all samples at one offset (trend set to 0)",
                name,
                self.degenerate_windows
            );
        }
    }
}

/// Whether a stream reduces to numeric summaries or to presence flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum AggregateKind {
    /// Two columns per feature: mean and trend.
    Numeric,
    /// One `0`/`1` column per feature.
    Presence,
}

/// The reduced vectors of one stream, keyed by stay and window.
#[derive(Debug, Clone)]
pub struct StreamAggregates {
    name: &'static str,
    kind: AggregateKind,
    catalog: FeatureCatalog,
    vectors: BTreeMap<StayId, BTreeMap<Bucket, Vec<f64>>>,
    stats: StreamStats,
}

impl StreamAggregates {
    pub(crate) fn new(
        name: &'static str,
        kind: AggregateKind,
        catalog: FeatureCatalog,
        vectors: BTreeMap<StayId, BTreeMap<Bucket, Vec<f64>>>,
        stats: StreamStats,
    ) -> Self {
        Self {
            name,
            kind,
            catalog,
            vectors,
            stats,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Number of output columns this stream contributes to every row.
    pub fn width(&self) -> usize {
        match self.kind {
            AggregateKind::Numeric => 2 * self.catalog.len(),
            AggregateKind::Presence => self.catalog.len(),
        }
    }

    /// Column names, in the same order as the values in `vector`.
    pub fn columns(&self) -> Vec<String> {
        match self.kind {
            AggregateKind::Numeric => self
                .catalog
                .names()
                .flat_map(|name| [name.to_owned(), format!("{}-trend", name)])
                .collect(),
            AggregateKind::Presence => self.catalog.names().map(str::to_owned).collect(),
        }
    }

    /// The vector for one stay and window, `None` if the stay had no events there.
    pub fn vector(&self, stay_id: &str, bucket: Bucket) -> Option<&[f64]> {
        self.vectors
            .get(stay_id)?
            .get(&bucket)
            .map(|v| v.as_slice())
    }

    /// Windows with at least one event for this stay.
    pub fn buckets(&self, stay_id: &str) -> impl Iterator<Item = Bucket> + '_ {
        self.vectors
            .get(stay_id)
            .into_iter()
            .flat_map(|buckets| buckets.keys().copied())
    }

    /// Number of stays with at least one window.
    pub fn stay_count(&self) -> usize {
        self.vectors.len()
    }
}

/// Lab results, by lab label.
pub fn aggregate_labs(
    path: impl AsRef<Path>,
    admissions: &Admissions,
    window: Window,
    opts: &StreamOptions,
) -> Result<StreamAggregates> {
    let stream = PointStream {
        name: "labs",
        columns: ["HADM_ID", "CHARTTIME", "LABEL", "VALUENUM"],
        round_values: true,
    };
    stream.aggregate(path.as_ref(), admissions, window, opts, |label| {
        Some(label).filter(|label| !label.is_empty())
    })
}

/// Chart vitals, by canonical vital category.
pub fn aggregate_charts(
    path: impl AsRef<Path>,
    admissions: &Admissions,
    window: Window,
    opts: &StreamOptions,
) -> Result<StreamAggregates> {
    let stream = PointStream {
        name: "charts",
        columns: ["HADM_ID", "CHARTTIME", "ITEMID", "VALUENUM"],
        round_values: false,
    };
    stream.aggregate(path.as_ref(), admissions, window, opts, |code| {
        VitalCategory::from_item_code(code).map(VitalCategory::label)
    })
}

/// Prescriptions, as presence flags per drug over each prescription's active interval.
pub fn aggregate_prescriptions(
    path: impl AsRef<Path>,
    admissions: &Admissions,
    window: Window,
    opts: &StreamOptions,
) -> Result<StreamAggregates> {
    const NAME: &str = "prescriptions";
    let path = path.as_ref();
    let mut catalog = CatalogBuilder::new();
    let mut active: BTreeMap<StayId, BTreeMap<Bucket, BTreeSet<FeatureIdx>>> = BTreeMap::new();
    let mut stats = StreamStats::default();

    for_each_row(
        NAME,
        path,
        ["HADM_ID", "STARTDATE", "ENDDATE", "DRUG"],
        opts,
        &mut stats,
        |[stay_id, start, end, drug], stats| {
            if start.is_empty() || end.is_empty() || drug.is_empty() {
                stats.no_value += 1;
                return Ok(());
            }
            let Ok(admission) = admissions.get(stay_id) else {
                stats.unknown_stay += 1;
                return Ok(());
            };
            let interval = Interval::new(
                admission.offset_hours(parse_timestamp(start)?),
                admission.offset_hours(parse_timestamp(end)?),
            );
            let buckets = window.interval_buckets(interval, admission.whole_days());
            if buckets.is_empty() {
                stats.outside_window += 1;
                // Every prescribed drug gets a day-level column, even if it is never active
                // during a whole day of the stay.
                if window == Window::PerDay {
                    catalog.intern(drug);
                }
                return Ok(());
            }

            let idx = catalog.intern(drug);
            let stay = active.entry(admission.stay_id.clone()).or_default();
            for bucket in buckets {
                stay.entry(bucket).or_default().insert(idx);
            }
            stats.kept += 1;
            Ok(())
        },
    )?;

    let catalog = catalog.freeze();
    let width = catalog.len();
    let vectors = active
        .into_iter()
        .map(|(stay_id, buckets)| {
            let buckets = buckets
                .into_iter()
                .map(|(bucket, drugs)| {
                    let mut flags = vec![0.; width];
                    for idx in drugs {
                        flags[idx] = 1.;
                    }
                    (bucket, flags)
                })
                .collect();
            (stay_id, buckets)
        })
        .collect();

    stats.log(NAME);
    Ok(StreamAggregates::new(
        NAME,
        AggregateKind::Presence,
        catalog,
        vectors,
        stats,
    ))
}

type SampleBuckets = BTreeMap<StayId, BTreeMap<Bucket, BTreeMap<FeatureIdx, Vec<Sample>>>>;

/// A stream of point-in-time measurements.
struct PointStream {
    name: &'static str,
    /// Stay id, event time, feature key, numeric value.
    columns: [&'static str; 4],
    round_values: bool,
}

impl PointStream {
    fn aggregate(
        &self,
        path: &Path,
        admissions: &Admissions,
        window: Window,
        opts: &StreamOptions,
        feature: impl for<'a> Fn(&'a str) -> Option<&'a str>,
    ) -> Result<StreamAggregates> {
        let mut catalog = CatalogBuilder::new();
        let mut samples = SampleBuckets::new();
        let mut stats = StreamStats::default();

        for_each_row(
            self.name,
            path,
            self.columns,
            opts,
            &mut stats,
            |[stay_id, time, key, value], stats| {
                let Ok(admission) = admissions.get(stay_id) else {
                    stats.unknown_stay += 1;
                    return Ok(());
                };
                let offset = round3(admission.offset_hours(parse_timestamp(time)?));
                let Some(bucket) = window.point_bucket(offset) else {
                    stats.outside_window += 1;
                    return Ok(());
                };
                let Some(name) = feature(key) else {
                    stats.unmapped += 1;
                    return Ok(());
                };
                let Some(mut value) = parse_numeric(value) else {
                    stats.no_value += 1;
                    return Ok(());
                };
                if self.round_values {
                    value = round3(value);
                }

                let idx = catalog.intern(name);
                samples
                    .entry(admission.stay_id.clone())
                    .or_default()
                    .entry(bucket)
                    .or_default()
                    .entry(idx)
                    .or_default()
                    .push(Sample::new(offset, value));
                stats.kept += 1;
                Ok(())
            },
        )?;

        let catalog = catalog.freeze();
        let vectors = reduce_numeric(samples, catalog.len(), &mut stats);
        stats.log(self.name);
        Ok(StreamAggregates::new(
            self.name,
            AggregateKind::Numeric,
            catalog,
            vectors,
            stats,
        ))
    }
}

/// Turn raw samples into interleaved `[mean, trend]` pairs in catalog order.
fn reduce_numeric(
    samples: SampleBuckets,
    features: usize,
    stats: &mut StreamStats,
) -> BTreeMap<StayId, BTreeMap<Bucket, Vec<f64>>> {
    let mut out = BTreeMap::new();
    for (stay_id, buckets) in samples {
        let mut reduced = BTreeMap::new();
        for (bucket, by_feature) in buckets {
            let mut v = vec![0.; 2 * features];
            for (idx, samples) in by_feature {
                v[2 * idx] = mean(&samples, |s| s.value);
                v[2 * idx + 1] = match try_trend(&samples) {
                    Ok(trend) => trend,
                    Err(_) => {
                        stats.degenerate_windows += 1;
                        0.
                    }
                };
            }
            reduced.insert(bucket, v);
        }
        out.insert(stay_id, reduced);
    }
    out
}

/// Stream the rows of an event file, handing `visit` the requested columns of each.
///
/// The first column is always the stay id.
fn for_each_row<const N: usize>(
    name: &str,
    path: &Path,
    columns: [&str; N],
    opts: &StreamOptions,
    stats: &mut StreamStats,
    mut visit: impl FnMut([&str; N], &mut StreamStats) -> Result<()>,
) -> Result<()> {
    event!(Level::INFO, "Processing {} file \"{}\"", name, path.display());
    let mut reader = crate::open_csv(path)?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading header of \"{}\"", path.display()))?
        .clone();
    let positions = resolve_columns(&headers, columns, path)?;

    let mut first_stay: Option<String> = None;
    let mut record = csv::StringRecord::new();
    loop {
        if matches!(opts.max_rows, Some(max) if stats.rows >= max) {
            event!(Level::INFO, "   {} stopping at the {} row cap", name, stats.rows);
            break;
        }
        let more = reader
            .read_record(&mut record)
            .with_context(|| format!("reading \"{}\"", path.display()))?;
        if !more {
            break;
        }
        let line = record.position().map_or(0, |p| p.line());
        let fields = select_fields(&record, &positions)
            .with_context(|| format!("at line {} of \"{}\"", line, path.display()))?;
        if opts.first_stay_only {
            let first = first_stay.get_or_insert_with(|| fields[0].to_owned());
            if first.as_str() != fields[0] {
                break;
            }
        }

        stats.rows += 1;
        visit(fields, &mut *stats)
            .with_context(|| format!("at line {} of \"{}\"", line, path.display()))?;
        if stats.rows % PROGRESS_EVERY == 0 {
            event!(Level::INFO, "   {} processed {} rows", name, stats.rows);
        }
    }
    Ok(())
}

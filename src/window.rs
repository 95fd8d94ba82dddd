use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive};

/// Index of the window an event is aggregated into.
///
/// In first-hours mode every event lands in window `0`. In per-day mode point events use the
/// 1-indexed admission day and interval events use the 0-indexed day.
pub type Bucket = i64;

pub const HOURS_PER_DAY: f64 = 24.;

/// How events are bucketed in time.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Window {
    /// One window, `[0, hours]` after admission.
    FirstHours(f64),
    /// One window per admission day.
    PerDay,
}

impl Window {
    /// The bucket a point event at `offset` hours falls in, if any.
    pub fn point_bucket(self, offset: f64) -> Option<Bucket> {
        match self {
            Window::FirstHours(hours) => (0. ..=hours).contains(&offset).then_some(0),
            Window::PerDay => Some((offset / HOURS_PER_DAY).floor() as Bucket + 1),
        }
    }

    /// All the buckets an interval event is active in, for a stay with `stay_days` whole days.
    ///
    /// Per-day buckets are limited to the days that get an output row.
    pub fn interval_buckets(self, interval: Interval, stay_days: Bucket) -> Vec<Bucket> {
        match self {
            Window::FirstHours(hours) => {
                if interval.start <= hours && interval.end >= 0. {
                    vec![0]
                } else {
                    vec![]
                }
            }
            Window::PerDay => {
                let days = interval.days_overlapping();
                (*days.start()..=(*days.end()).min(stay_days - 1)).collect()
            }
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Window::FirstHours(hours) => write!(f, "first {} hours", hours),
            Window::PerDay => f.write_str("per admission day"),
        }
    }
}

/// Interval in hours since admission, lower bound is inclusive, upper bound is exclusive.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Interval { start, end }
    }

    pub fn days_overlapping(&self) -> RangeInclusive<Bucket> {
        days_overlapping(self.start, self.end)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}h - {}h", self.start, self.end)
    }
}

/// The 0-indexed admission days that `[start, end)` overlaps.
///
/// Time before admission is ignored, so the first day is never below `0`. An interval ending on
/// an exact day boundary does not touch the following day.
pub fn days_overlapping(start: f64, end: f64) -> RangeInclusive<Bucket> {
    let start = start.max(0.);
    if end.is_nan() || end <= start {
        return 1..=0;
    }
    let first = (start / HOURS_PER_DAY).floor() as Bucket;
    let last = (end / HOURS_PER_DAY).ceil() as Bucket - 1;
    first..=last
}

#[cfg(test)]
mod test {
    use super::*;

    fn days(start: f64, end: f64) -> Vec<Bucket> {
        days_overlapping(start, end).collect()
    }

    #[test]
    fn partial_days() {
        assert_eq!(days(10., 50.), [0, 1, 2]);
    }

    #[test]
    fn day_boundaries() {
        assert_eq!(days(0., 48.), [0, 1]);
        assert_eq!(days(24., 48.), [1]);
        assert_eq!(days(24., 48.001), [1, 2]);
        assert_eq!(days(23.999, 24.), [0]);
    }

    #[test]
    fn before_admission() {
        assert_eq!(days(-30., 5.), [0]);
        assert!(days(-30., -2.).is_empty());
        assert!(days(-30., 0.).is_empty());
    }

    #[test]
    fn empty_intervals() {
        assert!(days(12., 12.).is_empty());
        assert!(days(40., 12.).is_empty());
    }

    #[test]
    fn point_buckets() {
        let first = Window::FirstHours(24.);
        assert_eq!(first.point_bucket(0.), Some(0));
        assert_eq!(first.point_bucket(24.), Some(0));
        assert_eq!(first.point_bucket(24.001), None);
        assert_eq!(first.point_bucket(-1.), None);

        assert_eq!(Window::PerDay.point_bucket(0.), Some(1));
        assert_eq!(Window::PerDay.point_bucket(23.9), Some(1));
        assert_eq!(Window::PerDay.point_bucket(24.), Some(2));
        assert_eq!(Window::PerDay.point_bucket(-3.), Some(0));
    }

    #[test]
    fn first_hours_intervals() {
        let window = Window::FirstHours(24.);
        assert_eq!(window.interval_buckets(Interval::new(-48., 0.), 5), [0]);
        assert_eq!(window.interval_buckets(Interval::new(24., 72.), 5), [0]);
        assert!(window.interval_buckets(Interval::new(25., 72.), 5).is_empty());
        assert!(window.interval_buckets(Interval::new(-48., -1.), 5).is_empty());
    }

    #[test]
    fn per_day_intervals_stop_at_the_last_whole_day() {
        let window = Window::PerDay;
        assert_eq!(window.interval_buckets(Interval::new(10., 50.), 3), [0, 1, 2]);
        assert_eq!(window.interval_buckets(Interval::new(10., 50.), 2), [0, 1]);
        // Roughly 7000 years of prescription on a 3 day stay.
        let far = Interval::new(0., 6.0e7);
        assert_eq!(window.interval_buckets(far, 3), [0, 1, 2]);
        assert!(window.interval_buckets(Interval::new(80., 100.), 3).is_empty());
        assert!(window.interval_buckets(Interval::new(0., 10.), 0).is_empty());
    }
}

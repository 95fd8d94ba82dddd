//! The admission index: one record per hospital stay.
//!
//! Every event stream is projected against this index, since it supplies the admission time that
//! event offsets are measured from. There are two source shapes:
//!
//! - the raw admissions extract, with many columns addressed by header name, and
//! - the compact derived file (`admissions.derived.csv`), with a fixed column layout.
//!
//! `Admissions::derive` turns the first into the second, applying the age-outlier policy.
use crate::{
    error::PipelineError,
    util::{
        bool_01, days_between, hours_between, parse_numeric, parse_timestamp, resolve_columns,
        select_fields, ser_bool_01, TIMESTAMP_FORMAT,
    },
    ArcStr, StayId,
};
use chrono::{Duration, NaiveDateTime};
use qu::ick_use::*;
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    SeedableRng,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Deref, path::Path};

/// One row of the derived admissions file. Field order is the column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DerivedRow {
    hadmid: ArcStr,
    admittime: ArcStr,
    age: f64,
    gender: ArcStr,
    insurance: ArcStr,
    language: ArcStr,
    religion: ArcStr,
    marital_status: ArcStr,
    ethnicity: ArcStr,
    #[serde(serialize_with = "ser_bool_01", deserialize_with = "bool_01")]
    status: bool,
    los: f64,
    #[serde(default)]
    dischtime: Option<ArcStr>,
}

/// A hospital stay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Admission {
    pub stay_id: StayId,
    pub admit_time: NaiveDateTime,
    pub discharge_time: NaiveDateTime,
    pub age: f64,
    pub gender: ArcStr,
    pub insurance: ArcStr,
    pub language: ArcStr,
    pub religion: ArcStr,
    pub marital_status: ArcStr,
    pub ethnicity: ArcStr,
    /// Died during the stay.
    pub deceased: bool,
    /// Length of stay in days.
    pub los: f64,
}

impl TryFrom<DerivedRow> for Admission {
    type Error = PipelineError;

    fn try_from(from: DerivedRow) -> Result<Self, Self::Error> {
        let admit_time = parse_timestamp(&from.admittime)?;
        let discharge_time = match from.dischtime.as_deref() {
            Some(disch) => parse_timestamp(disch)?,
            None => admit_time + Duration::seconds((from.los * 86_400.).round() as i64),
        };
        Ok(Self {
            stay_id: from.hadmid,
            admit_time,
            discharge_time,
            age: from.age,
            gender: from.gender,
            insurance: from.insurance,
            language: from.language,
            religion: from.religion,
            marital_status: from.marital_status,
            ethnicity: from.ethnicity,
            deceased: from.status,
            los: from.los,
        })
    }
}

impl Admission {
    /// Hours from admission to `at`. Negative for events before admission.
    pub fn offset_hours(&self, at: NaiveDateTime) -> f64 {
        hours_between(self.admit_time, at)
    }

    /// The number of complete days in the stay. The fractional last day is dropped.
    pub fn whole_days(&self) -> i64 {
        self.los.floor().max(0.) as i64
    }

    /// Text demographic fields in output order (after age).
    pub fn demographics(&self) -> [&str; 6] {
        [
            &*self.gender,
            &*self.insurance,
            &*self.language,
            &*self.religion,
            &*self.marital_status,
            &*self.ethnicity,
        ]
    }

    fn to_derived(&self) -> DerivedRow {
        DerivedRow {
            hadmid: self.stay_id.clone(),
            admittime: self.admit_time.format(TIMESTAMP_FORMAT).to_string().into(),
            age: self.age,
            gender: self.gender.clone(),
            insurance: self.insurance.clone(),
            language: self.language.clone(),
            religion: self.religion.clone(),
            marital_status: self.marital_status.clone(),
            ethnicity: self.ethnicity.clone(),
            status: self.deceased,
            los: self.los,
            dischtime: Some(
                self.discharge_time
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
                    .into(),
            ),
        }
    }
}

/// Counts from deriving the compact admissions file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeriveSummary {
    pub read: usize,
    pub written: usize,
    pub ages_smoothed: usize,
    pub excluded_young: usize,
    pub negative_los: usize,
}

/// The parsed list of admissions in source order, with a pre-built index for the stay id.
#[derive(Debug, Clone, Default)]
pub struct Admissions {
    els: Vec<Admission>,
    id_idx: BTreeMap<StayId, usize>,
}

impl Admissions {
    /// Load the compact derived admissions file, addressed by position.
    ///
    /// Stays discharged before they were admitted are skipped, as in `load_raw`. If
    /// `first_stay_only` is set only the first stay is kept, for quick smoke runs.
    pub fn load_derived(path: impl AsRef<Path>, first_stay_only: bool) -> Result<Self> {
        fn inner(path: &Path, first_stay_only: bool) -> Result<Admissions> {
            let mut reader = crate::open_csv(path)?;
            let mut els = vec![];
            let mut negative_los = 0;
            for record in reader.records() {
                let record = record?;
                let line = record.position().map_or(0, |p| p.line());
                let row: DerivedRow = record
                    .deserialize(None)
                    .with_context(|| format!("at line {}", line))?;
                let admission =
                    Admission::try_from(row).with_context(|| format!("at line {}", line))?;
                if admission.los < 0. || admission.discharge_time < admission.admit_time {
                    negative_los += 1;
                    continue;
                }
                els.push(admission);
                if first_stay_only {
                    break;
                }
            }
            if negative_los > 0 {
                event!(
                    Level::WARN,
                    "skipped {} stays discharged before admission",
                    negative_los
                );
            }
            Ok(Admissions::new(els))
        }
        let path = path.as_ref();
        inner(path, first_stay_only)
            .with_context(|| format!("while loading admissions from \"{}\"", path.display()))
    }

    /// Load the raw admissions extract, resolving columns by header name.
    ///
    /// Stays discharged before they were admitted are skipped.
    pub fn load_raw(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (admissions, negative_los) = Self::load_raw_counted(path)?;
        if negative_los > 0 {
            event!(
                Level::WARN,
                "skipped {} stays discharged before admission in \"{}\"",
                negative_los,
                path.display()
            );
        }
        Ok(admissions)
    }

    fn load_raw_counted(path: &Path) -> Result<(Self, usize)> {
        const COLUMNS: [&str; 11] = [
            "HADM_ID",
            "ADMITTIME",
            "DISCHTIME",
            "age",
            "gender",
            "INSURANCE",
            "LANGUAGE",
            "RELIGION",
            "MARITAL_STATUS",
            "ETHNICITY",
            "HOSPITAL_EXPIRE_FLAG",
        ];

        let mut reader = crate::open_csv(path)?;
        let headers = reader
            .headers()
            .with_context(|| format!("reading header of \"{}\"", path.display()))?
            .clone();
        let cols = resolve_columns(&headers, COLUMNS, path)?;

        let mut els = vec![];
        let mut negative_los = 0;
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            let row = parse_raw_row(&record, &cols).with_context(|| {
                format!("at line {} of \"{}\"", line, path.display())
            })?;
            match row {
                Some(admission) => els.push(admission),
                None => negative_los += 1,
            }
        }
        Ok((Self::new(els), negative_los))
    }

    /// Read the raw admissions file and write the compact derived file.
    ///
    /// Ages over 100 are smoothed and young patients are dropped, see `AgePolicy`.
    pub fn derive(
        raw_path: impl AsRef<Path>,
        derived_path: impl AsRef<Path>,
        policy: &mut AgePolicy,
    ) -> Result<DeriveSummary> {
        let raw_path = raw_path.as_ref();
        let derived_path = derived_path.as_ref();
        let (raw, negative_los) = Self::load_raw_counted(raw_path)?;
        let mut summary = DeriveSummary {
            read: raw.len() + negative_los,
            negative_los,
            ..DeriveSummary::default()
        };

        let mut writer = crate::create_csv(derived_path)?;
        for admission in raw.iter() {
            let age = match policy.apply(admission.age) {
                AgeOutcome::Kept(age) => age,
                AgeOutcome::Smoothed(age) => {
                    summary.ages_smoothed += 1;
                    age
                }
                AgeOutcome::Excluded => {
                    summary.excluded_young += 1;
                    continue;
                }
            };
            let mut row = admission.to_derived();
            row.age = age;
            writer.serialize(row)?;
            summary.written += 1;
        }
        writer
            .flush()
            .with_context(|| format!("writing \"{}\"", derived_path.display()))?;

        event!(
            Level::INFO,
            "derived {} of {} stays ({} ages smoothed, {} excluded as too young, {} with negative LOS)",
            summary.written,
            summary.read,
            summary.ages_smoothed,
            summary.excluded_young,
            summary.negative_los
        );
        Ok(summary)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Admission> {
        let idx = self.id_idx.get(id)?;
        self.els.get(*idx)
    }

    /// Find a stay, failing with `UnknownStay` if it's not indexed.
    pub fn get(&self, id: &str) -> Result<&Admission, PipelineError> {
        self.find_by_id(id)
            .ok_or_else(|| PipelineError::UnknownStay {
                stay_id: id.to_owned(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Admission> + '_ {
        self.els.iter()
    }

    fn new(els: Vec<Admission>) -> Self {
        let mut this = Admissions {
            els,
            id_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    /// Keeps the first record for a duplicated stay id.
    fn rebuild_index(&mut self) {
        self.id_idx.clear();
        let mut duplicates = vec![];
        for (idx, el) in self.els.iter().enumerate() {
            if self.id_idx.contains_key(&el.stay_id) {
                duplicates.push(idx);
                continue;
            }
            self.id_idx.insert(el.stay_id.clone(), idx);
        }
        if !duplicates.is_empty() {
            event!(
                Level::WARN,
                "{} duplicate stay ids in admissions, keeping the first of each",
                duplicates.len()
            );
            for idx in duplicates.into_iter().rev() {
                self.els.remove(idx);
            }
            self.id_idx = self
                .els
                .iter()
                .enumerate()
                .map(|(idx, el)| (el.stay_id.clone(), idx))
                .collect();
        }
    }
}

impl Deref for Admissions {
    type Target = [Admission];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Admission> for Admissions {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Admission>,
    {
        Self::new(iter.into_iter().collect())
    }
}

/// `None` if the stay has a negative length.
fn parse_raw_row(
    record: &csv::StringRecord,
    cols: &[usize; 11],
) -> Result<Option<Admission>, PipelineError> {
    let [hadm_id, admit, disch, age, gender, insurance, language, religion, marital, ethnicity, expire] =
        select_fields(record, cols)?;
    let admit_time = parse_timestamp(admit)?;
    let discharge_time = parse_timestamp(disch)?;
    let los = days_between(admit_time, discharge_time);
    if los < 0. {
        return Ok(None);
    }
    let age = parse_numeric(age).ok_or_else(|| PipelineError::InvalidValue {
        column: "age".into(),
        value: age.into(),
    })?;
    let deceased = match expire {
        "0" => false,
        "1" => true,
        other => {
            return Err(PipelineError::InvalidValue {
                column: "HOSPITAL_EXPIRE_FLAG".into(),
                value: other.into(),
            })
        }
    };
    Ok(Some(Admission {
        stay_id: hadm_id.into(),
        admit_time,
        discharge_time,
        age,
        gender: gender.into(),
        insurance: insurance.into(),
        language: language.into(),
        religion: religion.into(),
        marital_status: marital.into(),
        ethnicity: ethnicity.into(),
        deceased,
        los,
    }))
}

/// What the age policy did with one age.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AgeOutcome {
    Kept(f64),
    Smoothed(f64),
    Excluded,
}

impl AgeOutcome {
    pub fn age(self) -> Option<f64> {
        match self {
            AgeOutcome::Kept(age) | AgeOutcome::Smoothed(age) => Some(age),
            AgeOutcome::Excluded => None,
        }
    }
}

/// Age-outlier smoothing.
///
/// De-identified extracts shift the ages of the very old past 100. Those ages are replaced by
/// `89 + k`, `k` in `0..10`, drawn with weight `(10 - k) / 55`. Stays with a final age of 10 or
/// less are not part of the target population and are excluded.
///
/// The generator is seeded so a rerun over the same input gives the same ages.
#[derive(Debug, Clone)]
pub struct AgePolicy {
    rng: StdRng,
    offsets: WeightedIndex<f64>,
}

impl AgePolicy {
    pub const MAX_PLAUSIBLE_AGE: f64 = 100.;
    pub const MIN_INCLUDED_AGE: f64 = 10.;
    pub const SMOOTHED_BASE_AGE: f64 = 89.;

    pub fn seeded(seed: u64) -> Self {
        let offsets = WeightedIndex::new((0..10u32).map(|k| f64::from(10 - k) / 55.))
            .expect("age weights are positive");
        Self {
            rng: StdRng::seed_from_u64(seed),
            offsets,
        }
    }

    pub fn apply(&mut self, age: f64) -> AgeOutcome {
        let outcome = if age > Self::MAX_PLAUSIBLE_AGE {
            AgeOutcome::Smoothed(self.sample_old_age())
        } else {
            AgeOutcome::Kept(age)
        };
        match outcome.age() {
            Some(age) if age <= Self::MIN_INCLUDED_AGE => AgeOutcome::Excluded,
            _ => outcome,
        }
    }

    fn sample_old_age(&mut self) -> f64 {
        Self::SMOOTHED_BASE_AGE + self.offsets.sample(&mut self.rng) as f64
    }
}

impl Default for AgePolicy {
    fn default() -> Self {
        Self::seeded(0)
    }
}

//! Joining the reduced streams into output rows.
use crate::{
    aggregate::StreamAggregates,
    schema::{Layout, Schema},
    util::{fmt_value, round3},
    Admission, Admissions, Bucket,
};
use qu::ick_use::*;
use std::{io, iter, path::Path};

/// Builds rows for one schema from the three reduced streams.
///
/// Stays or days with no events in a stream get that stream's width of zeros.
#[derive(Debug, Clone, Copy)]
pub struct RowMaterializer<'a> {
    schema: &'a Schema,
    labs: &'a StreamAggregates,
    drugs: &'a StreamAggregates,
    charts: &'a StreamAggregates,
}

impl<'a> RowMaterializer<'a> {
    pub fn new(
        schema: &'a Schema,
        labs: &'a StreamAggregates,
        drugs: &'a StreamAggregates,
        charts: &'a StreamAggregates,
    ) -> Self {
        Self {
            schema,
            labs,
            drugs,
            charts,
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// The single row for a stay in first-hours mode.
    pub fn first_hours_row(&self, admission: &Admission) -> Vec<String> {
        let mut row = Vec::with_capacity(self.schema.width());
        self.push_demographics(&mut row, admission, admission.los);
        self.push_streams(&mut row, &admission.stay_id, 0);
        row
    }

    /// One row per whole day of the stay, with the remaining length of stay counting down.
    pub fn per_day_rows(&self, admission: &'a Admission) -> impl Iterator<Item = Vec<String>> + 'a {
        let this = *self;
        (0..admission.whole_days()).map(move |day| {
            let mut row = Vec::with_capacity(this.schema.width());
            row.push(day.to_string());
            this.push_demographics(&mut row, admission, admission.los - day as f64);
            this.push_streams(&mut row, &admission.stay_id, day);
            row
        })
    }

    /// All rows for `admissions`, in admission order.
    pub fn rows(
        &self,
        admissions: &'a Admissions,
    ) -> Box<dyn Iterator<Item = Vec<String>> + 'a> {
        let this = *self;
        match self.schema.layout() {
            Layout::FirstHours => Box::new(admissions.iter().map(move |a| this.first_hours_row(a))),
            Layout::PerDay => Box::new(admissions.iter().flat_map(move |a| this.per_day_rows(a))),
        }
    }

    fn push_demographics(&self, row: &mut Vec<String>, admission: &Admission, los: f64) {
        row.push(if admission.deceased { "1" } else { "0" }.to_owned());
        row.push(fmt_value(round3(los)));
        row.push(fmt_value(admission.age));
        row.extend(admission.demographics().map(str::to_owned));
    }

    fn push_streams(&self, row: &mut Vec<String>, stay_id: &str, bucket: Bucket) {
        for stream in [self.labs, self.drugs, self.charts] {
            match stream.vector(stay_id, bucket) {
                Some(v) => row.extend(v.iter().map(|v| fmt_value(*v))),
                None => row.extend(iter::repeat_with(|| "0".to_owned()).take(stream.width())),
            }
        }
    }
}

/// Write the header and every row of `admissions` to `path`.
///
/// Returns the number of data rows written.
pub fn write_matrix(
    path: impl AsRef<Path>,
    materializer: &RowMaterializer,
    admissions: &Admissions,
) -> Result<usize> {
    let path = path.as_ref();
    let mut writer = crate::create_csv(path)?;
    let count = write_rows(&mut writer, materializer.schema(), materializer.rows(admissions))
        .with_context(|| format!("writing \"{}\"", path.display()))?;
    event!(
        Level::INFO,
        "wrote {} rows of {} columns to \"{}\"",
        count,
        materializer.schema().width(),
        path.display()
    );
    Ok(count)
}

/// Write one row per stay.
pub fn write_first_hours(
    path: impl AsRef<Path>,
    materializer: &RowMaterializer,
    admissions: &Admissions,
) -> Result<usize> {
    ensure!(
        materializer.schema().layout() == Layout::FirstHours,
        "first-hours output needs a first-hours schema"
    );
    write_matrix(path, materializer, admissions)
}

/// Write one row per stay and whole day.
pub fn write_per_day(
    path: impl AsRef<Path>,
    materializer: &RowMaterializer,
    admissions: &Admissions,
) -> Result<usize> {
    ensure!(
        materializer.schema().layout() == Layout::PerDay,
        "per-day output needs a per-day schema"
    );
    write_matrix(path, materializer, admissions)
}

/// Write a header then `rows`, checking every row is as wide as the header.
pub fn write_rows<W: io::Write>(
    writer: &mut csv::Writer<W>,
    schema: &Schema,
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<usize> {
    writer.write_record(schema.header())?;
    let mut count = 0;
    for row in rows {
        ensure!(
            row.len() == schema.width(),
            "row {} has {} columns but the header has {}",
            count + 1,
            row.len(),
            schema.width()
        );
        writer.write_record(&row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        aggregate::{AggregateKind, StreamStats},
        util::parse_timestamp,
        FeatureCatalog, StayId,
    };
    use std::collections::BTreeMap;

    fn admission(id: &str, los: f64, deceased: bool) -> Admission {
        let admit_time = parse_timestamp("2100-01-01T00:00:00").unwrap();
        Admission {
            stay_id: id.into(),
            admit_time,
            discharge_time: admit_time + chrono::Duration::hours((los * 24.) as i64),
            age: 71.25,
            gender: "M".into(),
            insurance: "Medicare".into(),
            language: "ENGL".into(),
            religion: "CATHOLIC".into(),
            marital_status: "WIDOWED".into(),
            ethnicity: "WHITE".into(),
            deceased,
            los,
        }
    }

    fn stream(
        kind: AggregateKind,
        names: &[&str],
        vectors: &[(&str, Bucket, &[f64])],
    ) -> StreamAggregates {
        let mut map: BTreeMap<StayId, BTreeMap<Bucket, Vec<f64>>> = BTreeMap::new();
        for (stay, bucket, v) in vectors {
            map.entry((*stay).into())
                .or_default()
                .insert(*bucket, v.to_vec());
        }
        StreamAggregates::new(
            "test",
            kind,
            names.iter().collect::<FeatureCatalog>(),
            map,
            StreamStats::default(),
        )
    }

    #[test]
    fn first_hours_rows_are_zero_filled() {
        let labs = stream(
            AggregateKind::Numeric,
            &["Anion Gap"],
            &[("1", 0, &[15., 1.25])],
        );
        let drugs = stream(AggregateKind::Presence, &["Heparin", "Insulin"], &[]);
        let charts = stream(
            AggregateKind::Numeric,
            &["Heart Rate"],
            &[("2", 0, &[80.12345, -0.5])],
        );
        let schema = Schema::new(Layout::FirstHours, &labs, &drugs, &charts);
        let rows = RowMaterializer::new(&schema, &labs, &drugs, &charts);

        let one = rows.first_hours_row(&admission("1", 4.12345, true));
        assert_eq!(
            one,
            [
                "1", "4.123", "71.25", "M", "Medicare", "ENGL", "CATHOLIC", "WIDOWED", "WHITE",
                "15", "1.25", "0", "0", "0", "0"
            ]
        );
        let two = rows.first_hours_row(&admission("2", 1., false));
        assert_eq!(two.len(), schema.width());
        assert_eq!(&two[9..], ["0", "0", "0", "0", "80.123", "-0.5"]);
    }

    #[test]
    fn per_day_rows_count_down() {
        let labs = stream(
            AggregateKind::Numeric,
            &["Potassium"],
            &[("1", 1, &[4., 0.])],
        );
        let drugs = stream(
            AggregateKind::Presence,
            &["Heparin"],
            &[("1", 0, &[1.]), ("1", 2, &[1.])],
        );
        let charts = stream(AggregateKind::Numeric, &[], &[]);
        let schema = Schema::new(Layout::PerDay, &labs, &drugs, &charts);
        let rows = RowMaterializer::new(&schema, &labs, &drugs, &charts);

        let stay = admission("1", 3.5, false);
        let out: Vec<_> = rows.per_day_rows(&stay).collect();
        assert_eq!(out.len(), 3);
        let days: Vec<_> = out.iter().map(|r| (&*r[0], &*r[2])).collect();
        assert_eq!(days, [("0", "3.5"), ("1", "2.5"), ("2", "1.5")]);
        assert_eq!(&out[0][10..], ["0", "0", "1"]);
        assert_eq!(&out[1][10..], ["4", "0", "0"]);
        assert_eq!(&out[2][10..], ["0", "0", "1"]);

        assert_eq!(rows.per_day_rows(&admission("2", 0.9, false)).count(), 0);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let empty = stream(AggregateKind::Numeric, &["a"], &[]);
        let drugs = stream(AggregateKind::Presence, &[], &[]);
        let schema = Schema::new(Layout::FirstHours, &empty, &drugs, &empty);
        let mut writer = csv::Writer::from_writer(vec![]);
        let err = write_rows(&mut writer, &schema, iter::once(vec!["1".to_owned()])).unwrap_err();
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn writes_header_then_rows() {
        let labs = stream(AggregateKind::Numeric, &[], &[]);
        let drugs = stream(AggregateKind::Presence, &["Heparin"], &[("1", 0, &[1.])]);
        let schema = Schema::new(Layout::FirstHours, &labs, &drugs, &labs);
        let rows = RowMaterializer::new(&schema, &labs, &drugs, &labs);
        let admissions: Admissions = [admission("1", 2., false), admission("2", 2., true)]
            .into_iter()
            .collect();

        let mut writer = csv::Writer::from_writer(vec![]);
        let count = write_rows(&mut writer, &schema, rows.rows(&admissions)).unwrap();
        assert_eq!(count, 2);
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "status,los,age,gender,insurance,language,religion,marital_status,ethnicity,Heparin\n\
             0,2,71.25,M,Medicare,ENGL,CATHOLIC,WIDOWED,WHITE,1\n\
             1,2,71.25,M,Medicare,ENGL,CATHOLIC,WIDOWED,WHITE,0\n"
        );
    }
}

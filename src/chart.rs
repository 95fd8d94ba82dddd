//! Vital-sign categories for chart events.
//!
//! Chart rows carry an item code from one of two charting systems, so each category is reached
//! from more than one code. Codes not in the table are not vitals we aggregate.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum VitalCategory {
    HeartRate,
    RespiratoryRate,
    Diastolic,
    Systolic,
    O2,
    O2Flow,
    Temperature,
}

// `211` is heart rate in the older system; it is not also an O2 code.
static CODE_TABLE: Lazy<BTreeMap<&'static str, VitalCategory>> = Lazy::new(|| {
    use VitalCategory::*;
    BTreeMap::from([
        ("220045", HeartRate),
        ("211", HeartRate),
        ("618", RespiratoryRate),
        ("220210", RespiratoryRate),
        ("220180", Diastolic),
        ("8441", Diastolic),
        ("220179", Systolic),
        ("455", Systolic),
        ("220277", O2),
        ("223834", O2Flow),
        ("470", O2Flow),
        ("223762", Temperature),
        ("677", Temperature),
    ])
});

impl VitalCategory {
    pub const ALL: [VitalCategory; 7] = [
        VitalCategory::HeartRate,
        VitalCategory::RespiratoryRate,
        VitalCategory::Diastolic,
        VitalCategory::Systolic,
        VitalCategory::O2,
        VitalCategory::O2Flow,
        VitalCategory::Temperature,
    ];

    /// Look up a raw chart item code.
    pub fn from_item_code(code: &str) -> Option<Self> {
        CODE_TABLE.get(code.trim()).copied()
    }

    /// The column name used in output files.
    pub fn label(self) -> &'static str {
        use VitalCategory::*;
        match self {
            HeartRate => "Heart Rate",
            RespiratoryRate => "Respiratory Rate",
            Diastolic => "Diastolic",
            Systolic => "Systolic",
            O2 => "O2",
            O2Flow => "O2 Flow",
            Temperature => "Temperature",
        }
    }
}

impl fmt::Display for VitalCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

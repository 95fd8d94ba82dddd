use clap::Parser;
use qu::ick_use::*;
use stay_features::{header, AgePolicy, Admissions, RunConfig};
use std::path::PathBuf;

/// Turn the raw admissions extract into `admissions.derived.csv`.
#[derive(Parser)]
struct Opt {
    /// TOML file with run settings.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Directory holding `admissions.csv`.
    #[clap(long, short)]
    project_dir: Option<PathBuf>,
    /// Seed for sampling replacement ages.
    #[clap(long, short)]
    seed: Option<u64>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let mut config = match &opt.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(project_dir) = opt.project_dir {
        config.project_dir = project_dir;
    }
    if let Some(seed) = opt.seed {
        config.age_seed = seed;
    }

    let files = config.files();
    let mut policy = AgePolicy::seeded(config.age_seed);
    let summary = Admissions::derive(files.admissions(), files.derived_admissions(), &mut policy)?;

    header("Derived admissions");
    println!("stays read: {}", summary.read);
    println!("stays written: {}", summary.written);
    println!("ages over 100 smoothed: {}", summary.ages_smoothed);
    println!("excluded as too young: {}", summary.excluded_young);
    println!("discharged before admission: {}", summary.negative_los);
    Ok(())
}

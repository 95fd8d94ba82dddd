use clap::Parser;
use qu::ick_use::*;
use stay_features::pipeline::{run_first_hours, RunArgs};

/// Write one feature row per stay, summarising the first hours after admission.
#[derive(Parser)]
struct Opt {
    #[clap(flatten)]
    run: RunArgs,
    /// Window length in hours (default 24).
    #[clap(long, short = 'x')]
    hours: Option<f64>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let mut config = opt.run.into_config()?;
    if let Some(hours) = opt.hours {
        config.first_hours = hours;
    }
    let summary = run_first_hours(&config)?;
    summary.print();
    Ok(())
}

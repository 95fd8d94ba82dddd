use clap::Parser;
use qu::ick_use::*;
use stay_features::pipeline::{run_per_day, RunArgs};

/// Write one feature row per whole day of each stay.
#[derive(Parser)]
struct Opt {
    #[clap(flatten)]
    run: RunArgs,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = opt.run.into_config()?;
    run_per_day(&config)?.print();
    Ok(())
}

use anyhow::Result;
use clap::Parser;

use olicense_exporter::{logging, run, Args, ExporterConfig};

fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration problems are fatal and reported before anything starts.
    let config = ExporterConfig::load(&args)?;
    logging::init(config.log_level);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

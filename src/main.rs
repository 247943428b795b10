use clap::Parser;
use treedeck::cli::{run, Cli};
use treedeck::infrastructure::logging;

fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();
    log::debug!("Running {cli:?}");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    if let Err(err) = &result {
        log::error!("Command failed: {err:#}");
    }
    result
}

use anyhow::Result;
use clap::Parser;
use ksfa_loader::{
    bootstrap::{self, CommonArgs},
    config::UploadConfig,
    upload::hierarchical,
};
use tracing::info;

/// Replace every region/division's rankings and team rosters with the
/// contents of the local `<region>_football_data/` trees.
#[derive(Parser, Debug)]
#[command(name = "ksfa_loader")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    bootstrap::init_logging();
    let args = Args::parse();

    // ─── 2) config + store ───────────────────────────────────────────
    let (cfg, store) =
        bootstrap::prepare_or_exit(&args.common, UploadConfig::validate_hierarchy).await;
    info!(
        regions = ?cfg.regions,
        divisions = ?cfg.divisions,
        strategy = cfg.replace_strategy.as_str(),
        concurrency = cfg.concurrency,
        "configuration"
    );

    // ─── 3) replace every pair ───────────────────────────────────────
    let report = hierarchical::run(&store, &cfg).await;
    println!("{}", bootstrap::finish_run(&report));
    Ok(())
}

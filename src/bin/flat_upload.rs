use anyhow::Result;
use clap::Parser;
use ksfa_loader::{
    bootstrap::{self, CommonArgs},
    config::UploadConfig,
    upload::flat,
};
use tracing::info;

/// Upload the league table and the fixed team sheets to the app-wide
/// `leagueRankings` and `teamPlayers` collections.
#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_logging();
    let args = Args::parse();

    let (cfg, store) = bootstrap::prepare_or_exit(&args.common, UploadConfig::validate).await;
    info!(data_dir = %cfg.data_dir.display(), teams_dir = %cfg.teams_dir.display(), "starting flat upload");

    let report = flat::run(&store, &cfg).await;
    println!("{}", bootstrap::finish_run(&report));
    Ok(())
}

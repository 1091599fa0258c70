use anyhow::Result;
use clap::Parser;
use ksfa_loader::{
    bootstrap::{self, CommonArgs},
    config::UploadConfig,
    upload::feeds,
};
use tracing::info;

/// Upload the fixtures and news sheets, one document per row keyed by `id`.
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
    info!(
        fixtures = %cfg.fixtures_path().display(),
        news = %cfg.news_path().display(),
        "starting feed upload"
    );

    let report = feeds::run(&store, &cfg).await;
    println!("{}", bootstrap::finish_run(&report));
    Ok(())
}

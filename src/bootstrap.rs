// src/bootstrap.rs
//! Startup shared by every binary: logging, CLI overrides on top of the
//! YAML config, and opening the document store.

use anyhow::{Context, Result};
use clap::Args;
use std::{env, path::PathBuf, time::Duration};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::UploadConfig,
    store::{auth::ServiceAccount, Backend, FirestoreStore, MemoryStore},
    upload::RunReport,
};

/// Flags accepted by all uploaders. Anything given here beats the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// YAML config file; defaults are used for anything it leaves out
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// App id scoping the `artifacts/<app_id>/...` collections
    #[arg(long)]
    pub app_id: Option<String>,

    /// Service-account key file
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Directory holding the rankings sheet and feeds
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the flat per-team player sheets
    #[arg(long)]
    pub teams_dir: Option<PathBuf>,

    /// Root containing `<region>_football_data/` trees
    #[arg(long)]
    pub hierarchy_dir: Option<PathBuf>,

    /// Region/division pairs processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// `clear_first` or `sweep_stale`
    #[arg(long)]
    pub replace_strategy: Option<String>,

    /// Write to an in-memory store instead of Firestore
    #[arg(long)]
    pub dry_run: bool,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<UploadConfig> {
        let mut cfg = UploadConfig::load(self.config.as_deref())?;
        if let Some(v) = &self.app_id {
            cfg.app_id = v.clone();
        }
        if let Some(v) = &self.credentials {
            cfg.credentials_path = v.clone();
        }
        if let Some(v) = &self.data_dir {
            cfg.data_dir = v.clone();
        }
        if let Some(v) = &self.teams_dir {
            cfg.teams_dir = v.clone();
        }
        if let Some(v) = &self.hierarchy_dir {
            cfg.hierarchy_dir = v.clone();
        }
        if let Some(v) = self.concurrency {
            cfg.concurrency = v;
        }
        if let Some(v) = &self.replace_strategy {
            cfg.replace_strategy = v.parse()?;
        }
        Ok(cfg)
    }
}

/// fmt subscriber filtered by `RUST_LOG`, else `LOG_LEVEL`, else `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level.parse::<Level>().map(|l| l.to_string()).unwrap_or(level))
    });
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Open the store the run should write to: in-memory for dry runs, the
/// Firestore emulator when `FIRESTORE_EMULATOR_HOST` is set, otherwise
/// Firestore proper with the configured service-account key.
pub async fn open_store(cfg: &UploadConfig, dry_run: bool) -> Result<Backend> {
    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    if dry_run {
        return Ok(Backend::Memory(MemoryStore::new()));
    }
    if let Ok(host) = env::var("FIRESTORE_EMULATOR_HOST") {
        let project =
            env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_else(|_| "demo-project".to_string());
        info!(host = %host, project = %project, "using firestore emulator");
        return Ok(Backend::Firestore(FirestoreStore::emulator(
            &host, &project, timeout,
        )?));
    }
    let account = ServiceAccount::from_file(&cfg.credentials_path).await?;
    info!(
        project = account.project_id(),
        client = account.client_email(),
        "loaded service account"
    );
    let store =
        FirestoreStore::connect(account, timeout).context("initialising firestore client")?;
    Ok(Backend::Firestore(store))
}

/// Config plus store, or exit with status 1. Credential and configuration
/// problems are the only fatal errors.
pub async fn prepare_or_exit(
    args: &CommonArgs,
    validate: fn(&UploadConfig) -> Result<()>,
) -> (UploadConfig, Backend) {
    match prepare(args, validate).await {
        Ok((cfg, store)) => {
            info!(app_id = %cfg.app_id, store = store.label(), "initialised");
            (cfg, store)
        }
        Err(e) => {
            error!("initialisation failed: {:#}", e);
            eprintln!("Error initializing uploader: {:#}", e);
            eprintln!(
                "Please ensure the service account key exists and is valid, or pass --dry-run."
            );
            std::process::exit(1);
        }
    }
}

async fn prepare(
    args: &CommonArgs,
    validate: fn(&UploadConfig) -> Result<()>,
) -> Result<(UploadConfig, Backend)> {
    let cfg = args.load_config()?;
    validate(&cfg)?;
    let store = open_store(&cfg, args.dry_run).await?;
    Ok((cfg, store))
}

/// End-of-run summary for stdout. Item failures are warned about but do not
/// change the exit status.
pub fn finish_run(report: &RunReport) -> String {
    let summary = report.summary();
    if report.has_failures() {
        warn!(failed = summary.failed, "{}: some items failed, see summary", report.pipeline);
    } else {
        info!("{}: {}", report.pipeline, summary);
    }
    report.render()
}

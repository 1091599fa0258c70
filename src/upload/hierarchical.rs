// src/upload/hierarchical.rs
//! Per region/division uploader. Each pair owns two collections,
//! `.../<region>/<division>/Rankings` and `.../<region>/<division>/Teams`,
//! which are fully replaced on every run.

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use serde_json::Value;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

use super::{for_each_pair, ItemStatus, RunReport, StepReport};
use crate::{
    config::{RegionDivision, ReplaceStrategy, UploadConfig},
    process::{
        extract_team_name, read_csv,
        reshape::{document_id, prepare_rankings, TEAM_COLUMN},
        CellMode,
    },
    store::{paths, Document, DocumentStore},
};

pub const DELETE_STEP: &str = "delete existing";
pub const RANKINGS_STEP: &str = "division rankings";
pub const PLAYERS_STEP: &str = "division teams";
pub const SWEEP_STEP: &str = "sweep stale";

/// Remove every document under the pair's Rankings and Teams collections.
#[instrument(level = "info", skip_all, fields(pair = %pair))]
pub async fn clear_pair<S: DocumentStore>(
    store: &S,
    cfg: &UploadConfig,
    pair: &RegionDivision,
) -> StepReport {
    let mut report = StepReport::new(DELETE_STEP);
    for collection in [
        paths::division_rankings(&cfg.app_id, pair),
        paths::division_teams(&cfg.app_id, pair),
    ] {
        delete_where(store, &collection, |_| true, &mut report).await;
    }
    report
}

/// Delete the documents of `collection` whose id satisfies `doomed`.
async fn delete_where<S, F>(store: &S, collection: &str, doomed: F, report: &mut StepReport)
where
    S: DocumentStore,
    F: Fn(&str) -> bool,
{
    let ids = match store.list_document_ids(collection).await {
        Ok(ids) => ids,
        Err(e) => {
            report.failed(Some(collection), collection, &e);
            return;
        }
    };
    debug!(collection, existing = ids.len(), "listed existing documents");
    for id in ids.iter().filter(|id| doomed(id.as_str())) {
        match store.delete_document(collection, id).await {
            Ok(()) => report.deleted(collection, id),
            Err(e) => report.failed(Some(collection), id.clone(), &e),
        }
    }
}

/// Upload `<division>_League_Rankings.csv` for one pair.
#[instrument(level = "info", skip_all, fields(pair = %pair))]
pub async fn upload_pair_rankings<S: DocumentStore>(
    store: &S,
    cfg: &UploadConfig,
    pair: &RegionDivision,
) -> StepReport {
    let mut report = StepReport::new(RANKINGS_STEP);
    let path = cfg.division_rankings_path(pair);
    let label = path.display().to_string();

    if !path.is_file() {
        report.skipped(label, "rankings file not found");
        return report;
    }

    let mut table = match read_csv(&path, CellMode::Infer) {
        Ok(t) => t,
        Err(e) => {
            report.failed(None, label, &e);
            return report;
        }
    };
    if table.is_empty() {
        report.skipped(label, "rankings file has no data rows");
        return report;
    }
    prepare_rankings(&mut table, "division", &pair.division);

    let collection = paths::division_rankings(&cfg.app_id, pair);
    for (idx, record) in table.records.iter().enumerate() {
        let Some(team) = document_id(record, TEAM_COLUMN) else {
            report.skipped(
                format!("{} row {}", label, idx + 2),
                format!("missing '{}' field", TEAM_COLUMN),
            );
            continue;
        };
        match store.set_document(&collection, &team, record).await {
            Ok(()) => report.written(&collection, &team),
            Err(e) => report.failed(Some(&collection), team, &e),
        }
    }
    report
}

/// Every regular `*.csv` directly inside `dir`, sorted by path.
pub fn team_sheets(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.csv", Pattern::escape(&dir.to_string_lossy()));
    let mut sheets = glob(&pattern)
        .with_context(|| format!("invalid glob pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect::<Vec<_>>();
    sheets.sort();
    Ok(sheets)
}

/// Team roster document: the sheet's rows plus the pair it belongs to.
fn roster_document(players: Value, pair: &RegionDivision) -> Document {
    let mut doc = Document::new();
    doc.insert("players".to_string(), players);
    doc.insert("state".to_string(), Value::String(pair.region.clone()));
    doc.insert("division".to_string(), Value::String(pair.division.clone()));
    doc
}

/// Upload one roster document per sheet in `teams/<division>/`.
#[instrument(level = "info", skip_all, fields(pair = %pair))]
pub async fn upload_pair_players<S: DocumentStore>(
    store: &S,
    cfg: &UploadConfig,
    pair: &RegionDivision,
) -> StepReport {
    let mut report = StepReport::new(PLAYERS_STEP);
    let dir = cfg.division_teams_dir(pair);

    if !dir.is_dir() {
        report.skipped(dir.display().to_string(), "team directory not found");
        return report;
    }
    let sheets = match team_sheets(&dir) {
        Ok(s) => s,
        Err(e) => {
            report.failed(None, dir.display().to_string(), &e);
            return report;
        }
    };
    info!(sheets = sheets.len(), dir = %dir.display(), "found team sheets");

    let collection = paths::division_teams(&cfg.app_id, pair);
    for path in sheets {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let team = extract_team_name(&file_name);

        let table = match read_csv(&path, CellMode::Infer) {
            Ok(t) => t,
            Err(e) => {
                report.failed(None, path.display().to_string(), &e);
                continue;
            }
        };
        let doc = roster_document(table.to_value(), pair);
        match store.set_document(&collection, &team, &doc).await {
            Ok(()) => report.written(&collection, &team),
            Err(e) => report.failed(Some(&collection), team, &e),
        }
    }
    report
}

/// Clear every pair.
pub async fn delete_existing<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> StepReport {
    for_each_pair(cfg, DELETE_STEP, |pair| async move {
        clear_pair(store, cfg, &pair).await
    })
    .await
}

/// Rankings for every pair.
pub async fn upload_rankings<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> StepReport {
    for_each_pair(cfg, RANKINGS_STEP, |pair| async move {
        upload_pair_rankings(store, cfg, &pair).await
    })
    .await
}

/// Team rosters for every pair.
pub async fn upload_players<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> StepReport {
    for_each_pair(cfg, PLAYERS_STEP, |pair| async move {
        upload_pair_players(store, cfg, &pair).await
    })
    .await
}

/// After a fresh upload, delete documents that this run did not touch.
///
/// A collection is swept only if at least one document was written to it,
/// so a pair whose source files are missing keeps what it had. Ids whose
/// write failed are kept as well.
pub async fn sweep_stale<S: DocumentStore>(
    store: &S,
    cfg: &UploadConfig,
    uploads: &[&StepReport],
) -> StepReport {
    for_each_pair(cfg, SWEEP_STEP, |pair| async move {
        let mut report = StepReport::new(SWEEP_STEP);
        for collection in [
            paths::division_rankings(&cfg.app_id, &pair),
            paths::division_teams(&cfg.app_id, &pair),
        ] {
            let written: HashSet<&str> = uploads
                .iter()
                .flat_map(|u| u.keys_in(&collection, ItemStatus::Written))
                .collect();
            if written.is_empty() {
                debug!(collection = %collection, "nothing written, not sweeping");
                continue;
            }
            let keep: HashSet<&str> = uploads
                .iter()
                .flat_map(|u| u.keys_in(&collection, ItemStatus::Failed))
                .chain(written.iter().copied())
                .collect();
            delete_where(store, &collection, |id| !keep.contains(id), &mut report).await;
        }
        report
    })
    .await
}

/// Full hierarchical run. With the default strategy: delete, then rankings,
/// then players, each stage finishing for every pair before the next starts.
pub async fn run<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> RunReport {
    let mut run = RunReport::start("hierarchical upload");
    info!(
        pairs = cfg.pairs().len(),
        strategy = cfg.replace_strategy.as_str(),
        concurrency = cfg.concurrency,
        "starting hierarchical upload"
    );

    match cfg.replace_strategy {
        ReplaceStrategy::ClearFirst => {
            run.push(delete_existing(store, cfg).await);
            run.push(upload_rankings(store, cfg).await);
            run.push(upload_players(store, cfg).await);
        }
        ReplaceStrategy::SweepStale => {
            let rankings = upload_rankings(store, cfg).await;
            let players = upload_players(store, cfg).await;
            let sweep = sweep_stale(store, cfg, &[&rankings, &players]).await;
            run.push(rankings);
            run.push(players);
            run.push(sweep);
        }
    }
    run.finish()
}

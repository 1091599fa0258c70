// src/upload/flat.rs
//! First-generation uploader: one league table and a fixed list of team
//! sheets, written to two app-wide collections.

use anyhow::Context;
use serde_json::Value;
use tracing::{info, instrument};

use super::{RunReport, StepReport};
use crate::{
    config::UploadConfig,
    process::{
        extract_team_name, read_csv,
        reshape::{document_id, prepare_rankings, TEAM_COLUMN},
        CellMode,
    },
    store::{paths, Document, DocumentStore},
};

pub const RANKINGS_STEP: &str = "league rankings";
pub const PLAYERS_STEP: &str = "team players";

/// Upload the league table, one document per team under `leagueRankings`.
#[instrument(level = "info", skip_all, fields(app_id = %cfg.app_id))]
pub async fn upload_rankings<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> StepReport {
    let mut report = StepReport::new(RANKINGS_STEP);
    let path = cfg.rankings_path();
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
    prepare_rankings(&mut table, "League", &cfg.default_league);

    let collection = paths::league_rankings(&cfg.app_id);
    for (idx, record) in table.records.iter().enumerate() {
        let Some(team) = document_id(record, TEAM_COLUMN) else {
            // +2: header line, one-based
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

/// Upload each configured team sheet as `{players: "<json text>"}` under `teamPlayers`.
#[instrument(level = "info", skip_all, fields(app_id = %cfg.app_id))]
pub async fn upload_players<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> StepReport {
    let mut report = StepReport::new(PLAYERS_STEP);
    let collection = paths::team_players(&cfg.app_id);

    for file_name in &cfg.player_files {
        let team = extract_team_name(file_name);
        let path = cfg.player_path(file_name);
        info!(team = %team, file = %path.display(), "processing team");

        if !path.is_file() {
            report.skipped(path.display().to_string(), "player file not found");
            continue;
        }

        let doc = match read_csv(&path, CellMode::Infer).and_then(|table| {
            let text = serde_json::to_string(&table.to_value())
                .context("serialising player list")?;
            let mut doc = Document::new();
            doc.insert("players".to_string(), Value::String(text));
            Ok(doc)
        }) {
            Ok(doc) => doc,
            Err(e) => {
                report.failed(None, path.display().to_string(), &e);
                continue;
            }
        };

        match store.set_document(&collection, &team, &doc).await {
            Ok(()) => report.written(&collection, &team),
            Err(e) => report.failed(Some(&collection), team, &e),
        }
    }
    report
}

/// Rankings, then players. Neither step stops the other.
pub async fn run<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> RunReport {
    let mut run = RunReport::start("flat upload");
    run.push(upload_rankings(store, cfg).await);
    run.push(upload_players(store, cfg).await);
    run.finish()
}

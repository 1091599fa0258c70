// src/upload/feeds.rs
//! Fixtures and news: plain sheets uploaded row by row, keyed by their `id`
//! column, with every cell kept as text.

use std::path::Path;
use tracing::instrument;

use super::{RunReport, StepReport};
use crate::{
    config::UploadConfig,
    process::{read_csv, reshape::document_id, CellMode},
    store::{paths, DocumentStore},
};

pub const FIXTURES_STEP: &str = "fixtures";
pub const NEWS_STEP: &str = "news";
pub const ID_COLUMN: &str = "id";

/// Upload every row of `path` into `collection`, keyed by its `id` cell.
#[instrument(level = "info", skip(store, path), fields(path = %path.display()))]
pub async fn upload_feed<S: DocumentStore>(
    store: &S,
    step: &str,
    path: &Path,
    collection: &str,
) -> StepReport {
    let mut report = StepReport::new(step);
    let label = path.display().to_string();

    if !path.is_file() {
        report.skipped(label, "feed file not found");
        return report;
    }
    let table = match read_csv(path, CellMode::Text) {
        Ok(t) => t,
        Err(e) => {
            report.failed(None, label, &e);
            return report;
        }
    };

    if table.is_empty() {
        report.skipped(label, "feed file has no data rows");
        return report;
    }
    for (idx, record) in table.records.iter().enumerate() {
        let Some(id) = document_id(record, ID_COLUMN) else {
            report.skipped(
                format!("{} row {}", label, idx + 2),
                format!("missing '{}' field", ID_COLUMN),
            );
            continue;
        };
        match store.set_document(collection, &id, record).await {
            Ok(()) => report.written(collection, &id),
            Err(e) => report.failed(Some(collection), id, &e),
        }
    }
    report
}

/// Fixtures, then news.
pub async fn run<S: DocumentStore>(store: &S, cfg: &UploadConfig) -> RunReport {
    let mut run = RunReport::start("feed upload");
    run.push(upload_feed(store, FIXTURES_STEP, &cfg.fixtures_path(), paths::FIXTURES).await);
    run.push(upload_feed(store, NEWS_STEP, &cfg.news_path(), paths::NEWS).await);
    run.finish()
}

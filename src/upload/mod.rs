// src/upload/mod.rs
//! CSV → document uploaders and the per-item outcome reporting they share.

use chrono::{DateTime, Utc};
use futures::{stream, Future, StreamExt};
use std::fmt;
use tracing::{error, info, warn};

use crate::config::{RegionDivision, UploadConfig};

pub mod feeds;
pub mod flat;
pub mod hierarchical;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    Written,
    Deleted,
    Skipped,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ItemStatus::Written => "written",
            ItemStatus::Deleted => "deleted",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
        }
    }
}

/// What happened to one file, row or document.
#[derive(Clone, Debug)]
pub struct ItemOutcome {
    pub status: ItemStatus,
    /// Collection the item lives in, when it got as far as the database.
    pub collection: Option<String>,
    /// Document id, file path or row label.
    pub key: String,
    /// Skip reason or error text.
    pub detail: Option<String>,
}

/// Outcomes of one pipeline step, in processing order.
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    pub step: String,
    pub items: Vec<ItemOutcome>,
}

impl StepReport {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            items: Vec::new(),
        }
    }

    /// Concatenate per-pair reports into one step report.
    pub fn merged(step: impl Into<String>, parts: impl IntoIterator<Item = StepReport>) -> Self {
        let mut out = Self::new(step);
        for part in parts {
            out.items.extend(part.items);
        }
        out
    }

    pub fn written(&mut self, collection: &str, id: &str) {
        info!(step = %self.step, collection, id, "uploaded");
        self.items.push(ItemOutcome {
            status: ItemStatus::Written,
            collection: Some(collection.to_string()),
            key: id.to_string(),
            detail: None,
        });
    }

    pub fn deleted(&mut self, collection: &str, id: &str) {
        info!(step = %self.step, collection, id, "deleted");
        self.items.push(ItemOutcome {
            status: ItemStatus::Deleted,
            collection: Some(collection.to_string()),
            key: id.to_string(),
            detail: None,
        });
    }

    pub fn skipped(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        let (key, reason) = (key.into(), reason.into());
        warn!(step = %self.step, key = %key, "skipping: {}", reason);
        self.items.push(ItemOutcome {
            status: ItemStatus::Skipped,
            collection: None,
            key,
            detail: Some(reason),
        });
    }

    pub fn failed(&mut self, collection: Option<&str>, key: impl Into<String>, err: &anyhow::Error) {
        let key = key.into();
        error!(step = %self.step, key = %key, "failed: {:#}", err);
        self.items.push(ItemOutcome {
            status: ItemStatus::Failed,
            collection: collection.map(str::to_string),
            key,
            detail: Some(format!("{:#}", err)),
        });
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    /// Items with `status` in `collection`.
    pub fn keys_in(&self, collection: &str, status: ItemStatus) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.status == status && i.collection.as_deref() == Some(collection))
            .map(|i| i.key.as_str())
            .collect()
    }
}

/// Aggregated counts for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub written: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written, {} deleted, {} skipped, {} failed",
            self.written, self.deleted, self.skipped, self.failed
        )
    }
}

/// Everything one binary did, step by step.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn start(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: StepReport) {
        info!(
            pipeline = %self.pipeline,
            step = %step.step,
            written = step.count(ItemStatus::Written),
            deleted = step.count(ItemStatus::Deleted),
            skipped = step.count(ItemStatus::Skipped),
            failed = step.count(ItemStatus::Failed),
            "step complete"
        );
        self.steps.push(step);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn summary(&self) -> Summary {
        let mut s = Summary::default();
        for step in &self.steps {
            s.written += step.count(ItemStatus::Written);
            s.deleted += step.count(ItemStatus::Deleted);
            s.skipped += step.count(ItemStatus::Skipped);
            s.failed += step.count(ItemStatus::Failed);
        }
        s
    }

    pub fn has_failures(&self) -> bool {
        self.summary().failed > 0
    }

    /// Human-readable end-of-run report: one line per step, then every skip
    /// and failure.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default();
        out.push_str(&format!(
            "{}: {} ({:.1}s)\n",
            self.pipeline,
            self.summary(),
            elapsed
        ));
        for step in &self.steps {
            out.push_str(&format!(
                "  {}: {} written, {} deleted, {} skipped, {} failed\n",
                step.step,
                step.count(ItemStatus::Written),
                step.count(ItemStatus::Deleted),
                step.count(ItemStatus::Skipped),
                step.count(ItemStatus::Failed)
            ));
            for item in step
                .items
                .iter()
                .filter(|i| matches!(i.status, ItemStatus::Skipped | ItemStatus::Failed))
            {
                out.push_str(&format!(
                    "    - {} {}: {}\n",
                    item.status.as_str(),
                    item.key,
                    item.detail.as_deref().unwrap_or("")
                ));
            }
        }
        out
    }
}

/// Run `per_pair` for every configured region/division pair, at most
/// `cfg.concurrency` at a time, and merge the results in pair order.
pub(crate) async fn for_each_pair<F, Fut>(cfg: &UploadConfig, step: &str, per_pair: F) -> StepReport
where
    F: FnMut(RegionDivision) -> Fut,
    Fut: Future<Output = StepReport>,
{
    let parts: Vec<StepReport> = stream::iter(cfg.pairs().into_iter().map(per_pair))
        .buffered(cfg.concurrency.max(1))
        .collect()
        .await;
    StepReport::merged(step, parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn step_counts_and_keys() {
        let mut step = StepReport::new("rankings");
        step.written("c", "Foo");
        step.written("d", "Bar");
        step.skipped("row 3", "missing 'Team' field");
        step.failed(Some("c"), "Baz", &anyhow!("boom"));

        assert_eq!(step.count(ItemStatus::Written), 2);
        assert_eq!(step.keys_in("c", ItemStatus::Written), vec!["Foo"]);
        assert_eq!(step.keys_in("c", ItemStatus::Failed), vec!["Baz"]);
    }

    #[test]
    fn run_summary_and_render() {
        let mut run = RunReport::start("flat");
        let mut a = StepReport::new("rankings");
        a.written("c", "Foo");
        a.skipped("row 2", "missing 'Team' field");
        let mut b = StepReport::new("players");
        b.failed(None, "x.csv", &anyhow!("unreadable"));
        run.push(a);
        run.push(b);
        let run = run.finish();

        assert_eq!(
            run.summary(),
            Summary {
                written: 1,
                deleted: 0,
                skipped: 1,
                failed: 1
            }
        );
        assert!(run.has_failures());
        let text = run.render();
        assert!(text.contains("rankings: 1 written"));
        assert!(text.contains("failed x.csv: unreadable"));
        assert!(run.step("players").is_some());
    }

    #[tokio::test]
    async fn pairs_merge_in_order_regardless_of_concurrency() {
        let cfg = UploadConfig {
            regions: vec!["r1".into(), "r2".into()],
            divisions: vec!["d1".into(), "d2".into()],
            concurrency: 3,
            ..Default::default()
        };
        let report = for_each_pair(&cfg, "fan-out", |pair| async move {
            let mut s = StepReport::new("part");
            s.written("c", &pair.to_string());
            s
        })
        .await;
        let keys: Vec<&str> = report.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["r1/d1", "r1/d2", "r2/d1", "r2/d2"]);
        assert_eq!(report.step, "fan-out");
    }
}

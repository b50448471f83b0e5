use crate::collection::Collection;
use crate::date_range::DateRange;
use crate::error::StorageError;
use crate::storage::StorageLocation;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BuildUrl,
    Download,
    Store,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildUrl => f.write_str("build_url"),
            Self::Download => f.write_str("download"),
            Self::Store => f.write_str("store"),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every active target holds the image.
    Success,
    /// Some targets hold the image, the rest are listed in `storage_errors`.
    Partial,
    Failure { stage: Stage, reason: String },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ItemEntry {
    pub identifier: String,
    pub image: String,
    pub date: NaiveDate,
    pub outcome: Outcome,
    pub locations: Vec<StorageLocation>,
    pub storage_errors: Vec<StorageError>,
}

impl ItemEntry {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Success | Outcome::Partial)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DateFailure {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total_attempted: usize,
    pub total_succeeded: usize,
    pub total_partial: usize,
    pub total_failed: usize,
    pub date_failures: usize,
}

impl Summary {
    /// True when work was attempted and none of it landed anywhere.
    pub fn nothing_succeeded(&self) -> bool {
        self.total_succeeded == 0 && (self.total_attempted > 0 || self.date_failures > 0)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct DownloadResult {
    pub collection: Collection,
    pub range: DateRange,
    pub items: Vec<ItemEntry>,
    pub date_failures: Vec<DateFailure>,
}

impl DownloadResult {
    pub fn new(collection: Collection, range: DateRange) -> Self {
        Self {
            collection,
            range,
            items: vec![],
            date_failures: vec![],
        }
    }

    pub(crate) fn record_item(&mut self, entry: ItemEntry) {
        self.items.push(entry);
    }

    pub(crate) fn record_date_failure(&mut self, date: NaiveDate, reason: String) {
        self.date_failures.push(DateFailure { date, reason });
    }

    pub fn summary(&self) -> Summary {
        self.items.iter().fold(
            Summary {
                date_failures: self.date_failures.len(),
                ..Default::default()
            },
            |mut summary, item| {
                summary.total_attempted += 1;
                match item.outcome {
                    Outcome::Success => summary.total_succeeded += 1,
                    Outcome::Partial => {
                        summary.total_succeeded += 1;
                        summary.total_partial += 1;
                    }
                    Outcome::Failure { .. } => summary.total_failed += 1,
                }
                summary
            },
        )
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        #[derive(Serialize)]
        struct Report<'a> {
            summary: Summary,
            #[serde(flatten)]
            result: &'a DownloadResult,
        }

        let content = serde_json::to_string_pretty(&Report {
            summary: self.summary(),
            result: self,
        })?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(outcome: Outcome) -> ItemEntry {
        ItemEntry {
            identifier: "20240105001751".to_string(),
            image: "epic_1b_20240105001751".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            outcome,
            locations: vec![StorageLocation::Local {
                path: PathBuf::from("natural/2024/01/05/epic_1b_20240105001751.png"),
            }],
            storage_errors: vec![],
        }
    }

    fn result() -> DownloadResult {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let mut result = DownloadResult::new(Collection::Natural, DateRange::single(day));
        result.record_item(entry(Outcome::Success));
        result.record_item(entry(Outcome::Partial));
        result.record_item(entry(Outcome::Failure {
            stage: Stage::Download,
            reason: "HTTP status 404".to_string(),
        }));
        result.record_date_failure(day, "timeout".to_string());
        result
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            result().summary(),
            Summary {
                total_attempted: 3,
                total_succeeded: 2,
                total_partial: 1,
                total_failed: 1,
                date_failures: 1,
            }
        );
    }

    #[test]
    fn test_nothing_succeeded() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let empty = DownloadResult::new(Collection::Natural, DateRange::single(day));
        assert!(!empty.summary().nothing_succeeded());

        let mut failed = empty.clone();
        failed.record_date_failure(day, "HTTP status 500".to_string());
        assert!(failed.summary().nothing_succeeded());
    }

    #[test]
    fn test_write_report() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.json");
        result().write(&path).unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report["summary"]["total_failed"], 1);
        assert_eq!(report["items"][2]["outcome"]["stage"], "download");
        assert_eq!(report["items"][0]["locations"][0]["target"], "local");
    }
}

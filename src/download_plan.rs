use crate::collection::{Collection, ImageFormat};
use crate::date_range::{self, DateInputs, DateRange};
use crate::downloader::ImageSource;
use crate::error::{UnsupportedFormatError, ValidationError};
use crate::image_url;
use crate::metadata::{ImageRecord, MetadataSource, ARCHIVE_URL};
use crate::result::{DownloadResult, ItemEntry, Outcome, Stage};
use crate::storage::{StorageTargets, StorageWriter};
use chrono::NaiveDate;
use tracing::{info, warn};

/// One batch: a collection and a resolved range of days.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    collection: Collection,
    range: DateRange,
    /// Parsed once; an unsupported format fails each image at the URL stage.
    format: Result<ImageFormat, UnsupportedFormatError>,
    archive_url: String,
}

impl DownloadPlan {
    pub fn new(collection: Collection, range: DateRange, format: &str) -> Self {
        Self {
            collection,
            range,
            format: format.parse(),
            archive_url: ARCHIVE_URL.to_string(),
        }
    }

    /// Resolves the date range first; a bad range means there is no plan at all.
    pub fn resolve(
        inputs: &DateInputs,
        today: NaiveDate,
        collection: Collection,
        format: &str,
    ) -> Result<Self, ValidationError> {
        let resolved = date_range::resolve(inputs, today)?;
        info!(
            source = ?resolved.source,
            range = %resolved.range,
            %collection,
            "resolved date range"
        );
        Ok(Self::new(collection, resolved.range, format))
    }

    pub fn with_archive_url(mut self, archive_url: &str) -> Self {
        self.archive_url = archive_url.to_string();
        self
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub async fn execute<L, R>(
        &self,
        metadata: &impl MetadataSource,
        images: &impl ImageSource,
        targets: &StorageTargets<L, R>,
    ) -> DownloadResult
    where
        L: StorageWriter,
        R: StorageWriter,
    {
        let mut result = DownloadResult::new(self.collection, self.range);

        for date in self.range.days() {
            info!(collection = %self.collection, %date, "processing date");

            let records = match metadata.fetch(self.collection, date).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(%date, error = %e, "skipping date");
                    result.record_date_failure(date, e.to_string());
                    continue;
                }
            };

            if records.is_empty() {
                info!(%date, "no images found");
                continue;
            }
            info!(%date, count = records.len(), "found images");

            for record in records {
                let entry = self.process_image(&record, images, targets).await;
                result.record_item(entry);
            }
        }

        let summary = result.summary();
        info!(
            attempted = summary.total_attempted,
            succeeded = summary.total_succeeded,
            partial = summary.total_partial,
            failed = summary.total_failed,
            date_failures = summary.date_failures,
            "batch complete"
        );
        result
    }

    async fn process_image<L, R>(
        &self,
        record: &ImageRecord,
        images: &impl ImageSource,
        targets: &StorageTargets<L, R>,
    ) -> ItemEntry
    where
        L: StorageWriter,
        R: StorageWriter,
    {
        let mut entry = ItemEntry {
            identifier: record.identifier.clone(),
            image: record.image.clone(),
            date: record.capture_date(),
            outcome: Outcome::Success,
            locations: vec![],
            storage_errors: vec![],
        };

        let (url, format) = match self.build_url(record) {
            Ok(built) => built,
            Err(e) => {
                warn!(image = %record.image, error = %e, "cannot build image url");
                entry.outcome = failure(Stage::BuildUrl, e);
                return entry;
            }
        };

        let bytes = match images.download(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %record.image, error = %e, "download failed");
                entry.outcome = failure(Stage::Download, e);
                return entry;
            }
        };

        let filename = image_url::file_name(record, format);
        let outcomes = targets
            .write_all(&bytes, self.collection, entry.date, &filename)
            .await;

        for outcome in outcomes {
            match outcome.result {
                Ok(location) => {
                    info!(%location, "stored {}", filename);
                    entry.locations.push(location);
                }
                Err(e) => {
                    warn!(storage = %outcome.target, error = %e, "store failed");
                    entry.storage_errors.push(e);
                }
            }
        }

        entry.outcome = match (entry.locations.is_empty(), entry.storage_errors.is_empty()) {
            (false, true) => Outcome::Success,
            (false, false) => Outcome::Partial,
            (true, _) => Outcome::Failure {
                stage: Stage::Store,
                reason: entry
                    .storage_errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            },
        };
        entry
    }

    fn build_url(
        &self,
        record: &ImageRecord,
    ) -> Result<(String, ImageFormat), UnsupportedFormatError> {
        let format = self.format.clone()?;
        let url = image_url::archive_url(&self.archive_url, record, self.collection, format);
        Ok((url, format))
    }
}

fn failure(stage: Stage, e: impl std::fmt::Display) -> Outcome {
    Outcome::Failure {
        stage,
        reason: e.to_string(),
    }
}

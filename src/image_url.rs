use crate::collection::{Collection, ImageFormat};
use crate::error::UnsupportedFormatError;
use crate::metadata::{ImageRecord, ARCHIVE_URL};
use chrono::Datelike;

/// Archive URL of `record` in the requested rendition, using the public archive.
pub fn build(
    record: &ImageRecord,
    collection: Collection,
    format: &str,
) -> Result<String, UnsupportedFormatError> {
    build_with_base(ARCHIVE_URL, record, collection, format)
}

/// `{base}/{collection}/{yyyy}/{mm}/{dd}/{png|jpg|thumbs}/{image}.{ext}`
pub fn build_with_base(
    base: &str,
    record: &ImageRecord,
    collection: Collection,
    format: &str,
) -> Result<String, UnsupportedFormatError> {
    let format: ImageFormat = format.parse()?;
    Ok(archive_url(base, record, collection, format))
}

pub fn archive_url(
    base: &str,
    record: &ImageRecord,
    collection: Collection,
    format: ImageFormat,
) -> String {
    let date = record.capture_date();
    format!(
        "{}/{}/{:04}/{:02}/{:02}/{}/{}",
        base.trim_end_matches('/'),
        collection,
        date.year(),
        date.month(),
        date.day(),
        format.directory(),
        file_name(record, format),
    )
}

pub fn file_name(record: &ImageRecord, format: ImageFormat) -> String {
    format!("{}.{}", record.image, format.extension())
}

use crate::collection::Collection;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Bad or conflicting batch parameters. A batch never starts with one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a YYYY-MM-DD date")]
    MalformedDate { field: &'static str, value: String },

    #[error("{start_field} ({start}) is after {end_field} ({end})")]
    StartAfterEnd {
        start_field: &'static str,
        end_field: &'static str,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("{field}: '{value}' is not an integer")]
    NotAnInteger { field: &'static str, value: String },

    #[error("{field}: offset of {value} days is out of the calendar range")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("unknown collection '{0}', expected one of natural, enhanced, aerosol, cloud")]
    UnknownCollection(String),

    #[error("no storage target: give a bucket, a local directory, or --local-only")]
    NoStorageTarget,
}

#[derive(Error, Debug, Clone)]
#[error("failed to fetch {collection} metadata ({}): {cause}", query_label(.date))]
pub struct MetadataFetchError {
    pub collection: Collection,
    /// `None` for the recent and all-dates queries.
    pub date: Option<NaiveDate>,
    pub cause: String,
}

fn query_label(date: &Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.to_string(),
        None => "no date".to_string(),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported image format '{0}', expected png, jpg or thumbs")]
pub struct UnsupportedFormatError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFailure {
    Status(u16),
    Transport(String),
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Transport(msg) => f.write_str(msg),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("download of {url} failed: {cause}")]
pub struct DownloadError {
    pub url: String,
    pub cause: DownloadFailure,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Local,
    Remote,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
#[error("{target} write to {location} failed: {cause}")]
pub struct StorageError {
    pub target: TargetKind,
    pub location: String,
    pub cause: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_error_message() {
        let err = MetadataFetchError {
            collection: Collection::Enhanced,
            date: NaiveDate::from_ymd_opt(2024, 1, 5),
            cause: "HTTP status 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch enhanced metadata (2024-01-05): HTTP status 503"
        );
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::MalformedDate {
            field: "start_date",
            value: "2024-13-01".to_string(),
        };
        assert!(err.to_string().starts_with("start_date"));
    }
}

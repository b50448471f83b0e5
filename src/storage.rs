use crate::collection::Collection;
use crate::error::{StorageError, TargetKind, ValidationError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_LOCAL_DIR: &str = "nasa_epic_images";
pub const DEFAULT_KEY_PREFIX: &str = "nasa-epic";

/// Where a copy of an image ended up.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum StorageLocation {
    Local { path: PathBuf },
    Remote { bucket: String, key: String },
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Remote { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}

pub trait StorageWriter {
    fn target(&self) -> TargetKind;

    async fn write(
        &self,
        bytes: &Bytes,
        collection: Collection,
        date: NaiveDate,
        filename: &str,
    ) -> Result<StorageLocation, StorageError>;
}

/// `{collection}/{yyyy}/{mm}/{dd}`, shared by both backends.
pub fn relative_dir(collection: Collection, date: NaiveDate) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}",
        collection,
        date.year(),
        date.month(),
        date.day()
    )
}

#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, collection: Collection, date: NaiveDate, filename: &str) -> PathBuf {
        self.root
            .join(relative_dir(collection, date))
            .join(filename)
    }
}

impl StorageWriter for LocalDisk {
    fn target(&self) -> TargetKind {
        TargetKind::Local
    }

    async fn write(
        &self,
        bytes: &Bytes,
        collection: Collection,
        date: NaiveDate,
        filename: &str,
    ) -> Result<StorageLocation, StorageError> {
        let dst = self.path_for(collection, date, filename);
        let fail = |e: std::io::Error| StorageError {
            target: TargetKind::Local,
            location: dst.display().to_string(),
            cause: e.to_string(),
        };

        if let Some(parent_dir) = dst.parent() {
            tokio::fs::create_dir_all(parent_dir).await.map_err(fail)?;
        }

        // Write beside the destination, then rename over it
        let partial = dst.with_file_name(format!("{filename}.partial"));
        let written = match tokio::fs::write(&partial, bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &dst).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(fail(e));
        }

        debug!(path = %dst.display(), size = bytes.len(), "wrote image to disk");
        Ok(StorageLocation::Local { path: dst })
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
    key_prefix: String,
}

impl ObjectStore {
    pub fn new(client: Client, bucket: &str, key_prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key_prefix: key_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key_for(&self, collection: Collection, date: NaiveDate, filename: &str) -> String {
        object_key(&self.key_prefix, collection, date, filename)
    }

    /// Confirms the bucket exists and is reachable with the loaded credentials.
    pub async fn check_bucket(&self) -> anyhow::Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "bucket {} is not accessible: {}",
                    self.bucket,
                    aws_sdk_s3::error::DisplayErrorContext(e)
                )
            })?;
        Ok(())
    }
}

pub fn object_key(prefix: &str, collection: Collection, date: NaiveDate, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let dir = relative_dir(collection, date);
    if prefix.is_empty() {
        format!("{dir}/{filename}")
    } else {
        format!("{prefix}/{dir}/{filename}")
    }
}

fn content_type(filename: &str) -> &'static str {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

impl StorageWriter for ObjectStore {
    fn target(&self) -> TargetKind {
        TargetKind::Remote
    }

    async fn write(
        &self,
        bytes: &Bytes,
        collection: Collection,
        date: NaiveDate,
        filename: &str,
    ) -> Result<StorageLocation, StorageError> {
        let key = self.key_for(collection, date, filename);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type(filename))
            .body(ByteStream::from(bytes.clone()))
            .send()
            .await
            .map_err(|e| StorageError {
                target: TargetKind::Remote,
                location: format!("s3://{}/{}", self.bucket, key),
                cause: aws_sdk_s3::error::DisplayErrorContext(e).to_string(),
            })?;

        debug!(bucket = %self.bucket, %key, size = bytes.len(), "uploaded image");
        Ok(StorageLocation::Remote {
            bucket: self.bucket.clone(),
            key,
        })
    }
}

/// The outcome of one writer for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: TargetKind,
    pub result: Result<StorageLocation, StorageError>,
}

/// The active storage backends. At least one is always present.
#[derive(Debug, Clone)]
pub struct StorageTargets<L, R> {
    local: Option<L>,
    remote: Option<R>,
}

impl<L: StorageWriter, R: StorageWriter> StorageTargets<L, R> {
    pub fn new(local: Option<L>, remote: Option<R>) -> Result<Self, ValidationError> {
        if local.is_none() && remote.is_none() {
            return Err(ValidationError::NoStorageTarget);
        }
        Ok(Self { local, remote })
    }

    pub fn local(&self) -> Option<&L> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    /// Hands the same buffer to every active writer, local first. A failing writer
    /// never stops the next one.
    pub async fn write_all(
        &self,
        bytes: &Bytes,
        collection: Collection,
        date: NaiveDate,
        filename: &str,
    ) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::with_capacity(2);
        if let Some(local) = &self.local {
            outcomes.push(TargetOutcome {
                target: local.target(),
                result: local.write(bytes, collection, date, filename).await,
            });
        }
        if let Some(remote) = &self.remote {
            outcomes.push(TargetOutcome {
                target: remote.target(),
                result: remote.write(bytes, collection, date, filename).await,
            });
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            object_key("nasa-epic", Collection::Natural, day(), "epic_1b_1.png"),
            "nasa-epic/natural/2024/01/05/epic_1b_1.png"
        );
        assert_eq!(
            object_key("/archive/epic/", Collection::Cloud, day(), "a.png"),
            "archive/epic/cloud/2024/01/05/a.png"
        );
        assert_eq!(
            object_key("", Collection::Aerosol, day(), "a.png"),
            "aerosol/2024/01/05/a.png"
        );
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.png"), "image/png");
        assert_eq!(content_type("a.jpg"), "image/jpeg");
        assert_eq!(content_type("a"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_local_write_creates_dirs_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(tmp.path());

        let first = disk
            .write(&Bytes::from_static(b"one"), Collection::Enhanced, day(), "img.png")
            .await
            .unwrap();
        let second = disk
            .write(&Bytes::from_static(b"two"), Collection::Enhanced, day(), "img.png")
            .await
            .unwrap();

        let expected = tmp.path().join("enhanced/2024/01/05/img.png");
        assert_eq!(first, StorageLocation::Local { path: expected.clone() });
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&expected).unwrap(), b"two");
        assert!(!expected.with_file_name("img.png.partial").exists());
    }

    #[tokio::test]
    async fn test_local_write_failure_is_tagged_local() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the collection directory should go
        std::fs::write(tmp.path().join("natural"), b"").unwrap();
        let disk = LocalDisk::new(tmp.path());

        let err = disk
            .write(&Bytes::from_static(b"x"), Collection::Natural, day(), "img.png")
            .await
            .unwrap_err();
        assert_eq!(err.target, TargetKind::Local);
        assert!(err.location.ends_with("img.png"));
    }

    #[tokio::test]
    async fn test_failed_rename_removes_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(tmp.path());
        // A non-empty directory where the image should land
        let dst = disk.path_for(Collection::Natural, day(), "img.png");
        std::fs::create_dir_all(dst.join("occupied")).unwrap();

        let err = disk
            .write(&Bytes::from_static(b"x"), Collection::Natural, day(), "img.png")
            .await
            .unwrap_err();
        assert_eq!(err.target, TargetKind::Local);
        assert!(dst.is_dir());
        assert!(!dst.with_file_name("img.png.partial").exists());
    }

    #[test]
    fn test_targets_require_one_backend() {
        let none: Result<StorageTargets<LocalDisk, LocalDisk>, _> = StorageTargets::new(None, None);
        assert_eq!(none.unwrap_err(), ValidationError::NoStorageTarget);
    }
}

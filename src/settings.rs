use crate::date_range::EnvDates;
use crate::error::ValidationError;
use crate::metadata::{EpicClient, API_URL, ARCHIVE_URL};
use crate::s3;
use crate::storage::{LocalDisk, ObjectStore, StorageTargets, DEFAULT_KEY_PREFIX, DEFAULT_LOCAL_DIR};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub archive_url: String,
    pub timeout_secs: u64,
    pub format: String,
    pub key_prefix: String,
    pub s3: S3Settings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct S3Settings {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            archive_url: ARCHIVE_URL.to_string(),
            timeout_secs: 30,
            format: "png".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            s3: S3Settings::default(),
        }
    }
}

impl Settings {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_url).map_err(|e| anyhow!("api_url '{}': {e}", self.api_url))?;
        Url::parse(&self.archive_url)
            .map_err(|e| anyhow!("archive_url '{}': {e}", self.archive_url))?;
        if let Some(endpoint) = &self.s3.endpoint_url {
            Url::parse(endpoint).map_err(|e| anyhow!("s3.endpoint_url '{endpoint}': {e}"))?;
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn epic_client(&self) -> Result<EpicClient> {
        EpicClient::new(&self.api_url, &self.archive_url, self.timeout())
    }
}

/// Fallbacks taken from the process environment, captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    pub dates: EnvDates,
    pub bucket: Option<String>,
    pub collection: Option<String>,
    pub local_dir: Option<String>,
    pub local_only: bool,
}

impl EnvDefaults {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let days_back = match get("DAYS_BACK") {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                ValidationError::NotAnInteger {
                    field: "DAYS_BACK",
                    value: raw.clone(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            dates: EnvDates {
                start_date: get("START_DATE"),
                end_date: get("END_DATE"),
                days_back,
            },
            bucket: get("S3_BUCKET"),
            collection: get("COLLECTION"),
            local_dir: get("LOCAL_DIR"),
            local_only: get("LOCAL_ONLY").is_some_and(|v| is_truthy(&v)),
        })
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Which storage backends a batch should write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    pub local_dir: Option<PathBuf>,
    pub bucket: Option<String>,
    pub local_only: bool,
    pub key_prefix: String,
}

impl StorageOptions {
    /// `--local-only` without a directory falls back to `nasa_epic_images`.
    pub fn local_root(&self) -> Option<PathBuf> {
        match (&self.local_dir, self.local_only) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => Some(PathBuf::from(DEFAULT_LOCAL_DIR)),
            (None, false) => None,
        }
    }

    pub fn remote_bucket(&self) -> Option<&str> {
        if self.local_only {
            return None;
        }
        self.bucket.as_deref().filter(|b| !b.trim().is_empty())
    }

    pub fn check(&self) -> Result<(), ValidationError> {
        if self.local_root().is_none() && self.remote_bucket().is_none() {
            return Err(ValidationError::NoStorageTarget);
        }
        Ok(())
    }

    /// Builds the writers. The bucket is checked once so bad credentials fail here
    /// rather than on every image.
    pub async fn build_targets(
        &self,
        s3_settings: &S3Settings,
    ) -> Result<StorageTargets<LocalDisk, ObjectStore>> {
        self.check()?;

        let local = self.local_root().map(LocalDisk::new);
        let remote = match self.remote_bucket() {
            Some(bucket) => {
                let client = s3::client_from_settings(s3_settings).await;
                let store = ObjectStore::new(client, bucket, &self.key_prefix);
                store.check_bucket().await?;
                Some(store)
            }
            None => None,
        };

        if let Some(local) = &local {
            info!(root = %local.root().display(), "writing images to local disk");
        }
        if let Some(remote) = &remote {
            info!(bucket = remote.bucket(), prefix = %self.key_prefix, "uploading images to s3");
        }
        Ok(StorageTargets::new(local, remote)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options(local_dir: Option<&str>, bucket: Option<&str>, local_only: bool) -> StorageOptions {
        StorageOptions {
            local_dir: local_dir.map(PathBuf::from),
            bucket: bucket.map(str::to_string),
            local_only,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    #[test]
    fn test_write_and_read_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("epic.toml");
        let mut settings = Settings::default();
        settings.key_prefix = "imagery/epic".to_string();
        settings.s3.endpoint_url = Some("http://localhost:9000".to_string());
        settings.write(&path).unwrap();

        assert_eq!(Settings::read(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str("format = \"jpg\"\n[s3]\nregion = \"eu-west-1\"").unwrap();
        assert_eq!(settings.format, "jpg");
        assert_eq!(settings.api_url, API_URL);
        assert_eq!(settings.s3.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let settings = Settings {
            api_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_defaults() {
        let vars: HashMap<&str, &str> = [
            ("START_DATE", "2024-01-01"),
            ("END_DATE", "2024-01-02"),
            ("DAYS_BACK", "2"),
            ("S3_BUCKET", "epic-bucket"),
            ("LOCAL_ONLY", "TRUE"),
            ("LOCAL_DIR", ""),
        ]
        .into_iter()
        .collect();
        let env = EnvDefaults::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(env.dates.start_date.as_deref(), Some("2024-01-01"));
        assert_eq!(env.dates.days_back, Some(2));
        assert_eq!(env.bucket.as_deref(), Some("epic-bucket"));
        assert!(env.local_only);
        assert_eq!(env.local_dir, None);
    }

    #[test]
    fn test_env_days_back_must_be_integer() {
        let err = EnvDefaults::from_lookup(|k| (k == "DAYS_BACK").then(|| "two".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NotAnInteger {
                field: "DAYS_BACK",
                ..
            }
        ));
    }

    #[test]
    fn test_storage_targets_selection() {
        let both = options(Some("/data"), Some("bucket"), false);
        assert_eq!(both.local_root(), Some(PathBuf::from("/data")));
        assert_eq!(both.remote_bucket(), Some("bucket"));

        let local_only = options(None, Some("bucket"), true);
        assert_eq!(local_only.local_root(), Some(PathBuf::from(DEFAULT_LOCAL_DIR)));
        assert_eq!(local_only.remote_bucket(), None);

        let remote_only = options(None, Some("bucket"), false);
        assert_eq!(remote_only.local_root(), None);
        assert!(remote_only.check().is_ok());

        let nothing = options(None, None, false);
        assert_eq!(nothing.check(), Err(ValidationError::NoStorageTarget));
    }
}

use crate::collection::Collection;
use crate::error::MetadataFetchError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::debug;

pub const API_URL: &str = "https://epic.gsfc.nasa.gov/api";
pub const ARCHIVE_URL: &str = "https://epic.gsfc.nasa.gov/archive";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One entry of an EPIC metadata listing.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub identifier: String,
    /// Archive filename without extension, e.g. `epic_1b_20240105001751`.
    pub image: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub version: String,
    /// Capture timestamp (UTC).
    #[serde(deserialize_with = "deserialize_timestamp", serialize_with = "serialize_timestamp")]
    pub date: NaiveDateTime,
    #[serde(default)]
    pub centroid_coordinates: Option<Coordinates>,
}

impl ImageRecord {
    pub fn capture_date(&self) -> NaiveDate {
        self.date.date()
    }
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(d)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
}

fn serialize_timestamp<S: serde::Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

#[derive(Deserialize, Debug)]
struct AvailableDate {
    date: NaiveDate,
}

pub trait MetadataSource {
    /// Images captured on `date`, in the order the API lists them.
    async fn fetch(
        &self,
        collection: Collection,
        date: NaiveDate,
    ) -> Result<Vec<ImageRecord>, MetadataFetchError>;

    async fn fetch_recent(
        &self,
        collection: Collection,
    ) -> Result<Vec<ImageRecord>, MetadataFetchError>;

    async fn fetch_available_dates(
        &self,
        collection: Collection,
    ) -> Result<Vec<NaiveDate>, MetadataFetchError>;
}

/// HTTP client for the EPIC metadata API and image archive.
#[derive(Debug, Clone)]
pub struct EpicClient {
    http: reqwest::Client,
    api_url: String,
    archive_url: String,
}

impl EpicClient {
    pub fn new(api_url: &str, archive_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("epic-archive/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            archive_url: archive_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn archive_url(&self) -> &str {
        &self.archive_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn endpoint(&self, collection: Collection, date: Option<NaiveDate>) -> String {
        match date {
            Some(date) => format!("{}/{}/date/{}", self.api_url, collection, date),
            None => format!("{}/{}", self.api_url, collection),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        collection: Collection,
        date: Option<NaiveDate>,
    ) -> Result<T, MetadataFetchError> {
        let fail = |cause: String| MetadataFetchError {
            collection,
            date,
            cause,
        };

        debug!(url, "requesting metadata");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP status {}", status.as_u16())));
        }

        response.json::<T>().await.map_err(|e| fail(e.to_string()))
    }
}

impl MetadataSource for EpicClient {
    async fn fetch(
        &self,
        collection: Collection,
        date: NaiveDate,
    ) -> Result<Vec<ImageRecord>, MetadataFetchError> {
        let url = self.endpoint(collection, Some(date));
        self.get_json(&url, collection, Some(date)).await
    }

    async fn fetch_recent(
        &self,
        collection: Collection,
    ) -> Result<Vec<ImageRecord>, MetadataFetchError> {
        let url = self.endpoint(collection, None);
        self.get_json(&url, collection, None).await
    }

    async fn fetch_available_dates(
        &self,
        collection: Collection,
    ) -> Result<Vec<NaiveDate>, MetadataFetchError> {
        let url = format!("{}/all", self.endpoint(collection, None));
        let dates: Vec<AvailableDate> = self.get_json(&url, collection, None).await?;
        Ok(dates.into_iter().map(|d| d.date).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one HTTP request on a loopback port with `status` and `body`,
    /// returning the server's base URL.
    pub(crate) async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base: &str) -> EpicClient {
        EpicClient::new(&format!("{base}/api"), &format!("{base}/archive"), DEFAULT_TIMEOUT)
            .unwrap()
    }

    const SAMPLE: &str = r#"[
        {
            "identifier": "20240105001751",
            "caption": "This image was taken by NASA's EPIC camera onboard the NOAA DSCOVR spacecraft",
            "image": "epic_1b_20240105001751",
            "version": "03",
            "centroid_coordinates": {"lat": -12.5, "lon": 165.2},
            "dscovr_j2000_position": {"x": -1335296.5, "y": 517040.8, "z": 205488.3},
            "date": "2024-01-05 00:13:03",
            "coords": {}
        },
        {
            "identifier": "20240105020526",
            "caption": "This image was taken by NASA's EPIC camera onboard the NOAA DSCOVR spacecraft",
            "image": "epic_1b_20240105020526",
            "version": "03",
            "date": "2024-01-05 02:00:38"
        }
    ]"#;

    #[test]
    fn test_deserialize_records() {
        let records: Vec<ImageRecord> = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image, "epic_1b_20240105001751");
        assert_eq!(
            records[0].capture_date(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert_eq!(records[0].centroid_coordinates.unwrap().lat, -12.5);
        assert!(records[1].centroid_coordinates.is_none());
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let json = r#"[{"identifier": "1", "image": "x", "date": "yesterday"}]"#;
        assert!(serde_json::from_str::<Vec<ImageRecord>>(json).is_err());
    }

    #[test]
    fn test_available_dates() {
        let json = r#"[{"date": "2024-01-05"}, {"date": "2024-01-04"}]"#;
        let dates: Vec<AvailableDate> = serde_json::from_str(json).unwrap();
        assert_eq!(dates[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn test_endpoints() {
        let client = EpicClient::new("https://example.test/api/", ARCHIVE_URL, DEFAULT_TIMEOUT)
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            client.endpoint(Collection::Cloud, Some(day)),
            "https://example.test/api/cloud/date/2024-01-05"
        );
        assert_eq!(
            client.endpoint(Collection::Natural, None),
            "https://example.test/api/natural"
        );
    }

    #[tokio::test]
    async fn test_fetch_parses_listing() {
        let base = serve_once("200 OK", SAMPLE).await;
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let records = client_for(&base)
            .fetch(Collection::Natural, day)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].image, "epic_1b_20240105020526");
    }

    #[tokio::test]
    async fn test_fetch_reports_http_status() {
        let base = serve_once("503 Service Unavailable", "").await;
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let err = client_for(&base)
            .fetch(Collection::Enhanced, day)
            .await
            .unwrap_err();
        assert_eq!(err.collection, Collection::Enhanced);
        assert_eq!(err.date, Some(day));
        assert_eq!(err.cause, "HTTP status 503");
    }

    #[tokio::test]
    async fn test_fetch_reports_undecodable_body() {
        let base = serve_once("200 OK", r#"{"not":"a list"}"#).await;
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let err = client_for(&base)
            .fetch(Collection::Natural, day)
            .await
            .unwrap_err();
        assert_eq!(err.collection, Collection::Natural);
        assert_eq!(err.date, Some(day));
        assert!(!err.cause.is_empty());
        assert!(!err.cause.starts_with("HTTP status"));
    }

    #[tokio::test]
    async fn test_available_dates_failure_has_no_date() {
        let base = serve_once("500 Internal Server Error", "").await;
        let err = client_for(&base)
            .fetch_available_dates(Collection::Aerosol)
            .await
            .unwrap_err();
        assert_eq!(err.collection, Collection::Aerosol);
        assert_eq!(err.date, None);
        assert_eq!(err.cause, "HTTP status 500");
    }
}

use crate::error::{DownloadError, DownloadFailure};
use crate::metadata::EpicClient;
use bytes::Bytes;
use tracing::debug;

pub trait ImageSource {
    /// Fetches the whole image in one request.
    async fn download(&self, url: &str) -> Result<Bytes, DownloadError>;
}

impl ImageSource for EpicClient {
    async fn download(&self, url: &str) -> Result<Bytes, DownloadError> {
        let fail = |cause: DownloadFailure| DownloadError {
            url: url.to_string(),
            cause,
        };

        let response = self
            .http()
            .get(url)
            .send()
            .await
            .map_err(|e| fail(DownloadFailure::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(DownloadFailure::Status(status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fail(DownloadFailure::Transport(e.to_string())))?;
        debug!(url, size = bytes.len(), "downloaded image");
        Ok(bytes)
    }
}

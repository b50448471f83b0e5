//! Utility functions for creating s3 clients
use crate::settings::S3Settings;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;

const DEFAULT_REGION: &str = "us-east-1";

/// Builds a client from the ambient AWS credential chain, optionally pinned to a
/// named profile. A custom endpoint (minio, localstack) switches to path-style
/// addressing.
pub async fn client_from_settings(settings: &S3Settings) -> Client {
    let mut loader = aws_config::from_env();
    if let Some(profile) = &settings.profile {
        loader = loader.profile_name(profile);
    }
    let base_config = loader.load().await;

    let region = settings
        .region
        .clone()
        .or_else(|| base_config.region().map(|r| r.to_string()))
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let mut builder = aws_sdk_s3::config::Builder::from(&base_config).region(Region::new(region));
    if let Some(url) = &settings.endpoint_url {
        builder = builder.endpoint_url(url).force_path_style(true);
    }

    Client::from_conf(builder.build())
}

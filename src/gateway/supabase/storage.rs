//! Object storage for booking attachments.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{Endpoint, check};
use crate::error::{AppError, AppResult};
use crate::gateway::FileUpload;

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

pub(crate) async fn upload(endpoint: &Endpoint, bearer: Option<&str>, upload: &FileUpload) -> AppResult<()> {
    let url = endpoint.url(&format!("storage/v1/object/{}/{}", upload.bucket, upload.path))?;
    let response = endpoint
        .request(Method::POST, url, bearer)
        .header("Content-Type", &upload.content_type)
        .header("x-upsert", "true")
        .body(upload.bytes.clone())
        .send()
        .await?;
    check(response).await?;
    tracing::info!("Uploaded {} bytes to {}/{}", upload.bytes.len(), upload.bucket, upload.path);
    Ok(())
}

pub(crate) async fn create_signed_url(
    endpoint: &Endpoint,
    bearer: Option<&str>,
    bucket: &str,
    path: &str,
    expires_in: Duration,
) -> AppResult<String> {
    let url = endpoint.url(&format!("storage/v1/object/sign/{}/{}", bucket, path))?;
    let response = endpoint
        .request(Method::POST, url, bearer)
        .json(&json!({ "expiresIn": expires_in.as_secs() }))
        .send()
        .await?;
    let signed: SignedUrlResponse = check(response).await?.json().await?;
    absolute_signed_url(endpoint.base(), &signed.signed_url)
}

/// Storage answers with a path relative to `/storage/v1`
fn absolute_signed_url(base: &Url, signed: &str) -> AppResult<String> {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        return Ok(signed.to_string());
    }
    let relative = format!("storage/v1/{}", signed.trim_start_matches('/'));
    base.join(&relative)
        .map(|u| u.to_string())
        .map_err(|e| AppError::gateway(200, format!("unusable signed URL '{}': {}", signed, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_paths_become_absolute() {
        let base = Url::parse("https://demo.supabase.co/").unwrap();
        let url = absolute_signed_url(&base, "/object/sign/bookings/t1/1.pdf?token=abc").unwrap();
        assert_eq!(url, "https://demo.supabase.co/storage/v1/object/sign/bookings/t1/1.pdf?token=abc");
    }
}

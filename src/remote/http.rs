//! HTTP multipart client for the try-on endpoint.

use std::time::Instant;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{TryOnFuture, TryOnRequest, TryOnResult, TryOnService};
use crate::error::RemoteError;
use crate::RemoteConfig;

const FRAME_FIELD: &str = "frame";
const GARMENT_FIELD: &str = "clothingItemId";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TryOnResponse {
    #[serde(default, alias = "resultImageRef")]
    result_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

#[derive(Clone)]
pub struct HttpTryOnService {
    client: Client,
    base: Url,
    endpoint: Url,
}

impl HttpTryOnService {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Self::with_client(builder.build()?, config)
    }

    pub fn with_client(client: Client, config: &RemoteConfig) -> Result<Self, RemoteError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::Malformed(format!("base url {:?}: {e}", config.base_url)))?;
        let endpoint = resolve_reference(&base, &config.tryon_path)?;
        Ok(Self {
            client,
            base,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn submit(&self, request: TryOnRequest) -> Result<TryOnResult, RemoteError> {
        let started = Instant::now();
        let part = Part::bytes(request.frame.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part(FRAME_FIELD, part)
            .text(GARMENT_FIELD, request.garment_id.to_string());

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        let Some(reference) = parse_response(status, &body)? else {
            return Ok(TryOnResult::Empty);
        };
        let url = resolve_reference(&self.base, &reference)?;
        debug!("Fetching try-on result {}", url);

        let image = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let image = image::load_from_memory(&image)?.to_rgb8();

        metrics::histogram!("tryon_round_trip_ms").record(started.elapsed().as_millis() as f64);
        Ok(TryOnResult::Image(image))
    }
}

impl TryOnService for HttpTryOnService {
    fn try_on(&self, request: TryOnRequest) -> TryOnFuture {
        let service = self.clone();
        Box::pin(async move { service.submit(request).await })
    }
}

/// Extract the result reference from a try-on response.
///
/// `Ok(None)` means the service accepted the frame but returned no image.
pub(crate) fn parse_response(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<String>, RemoteError> {
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| format!("Server error: {}", status.as_u16()));
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let response: TryOnResponse =
        serde_json::from_slice(body).map_err(|e| RemoteError::Malformed(e.to_string()))?;
    Ok(response
        .result_image_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty()))
}

/// Resolve a possibly relative result reference against the service origin.
pub(crate) fn resolve_reference(base: &Url, reference: &str) -> Result<Url, RemoteError> {
    base.join(reference)
        .map_err(|e| RemoteError::Malformed(format!("result reference {reference:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn base() -> Url {
        Url::parse("http://127.0.0.1:5000").unwrap()
    }

    #[test]
    fn success_yields_reference() {
        let body = br#"{"resultImageUrl": "/r/abc.jpg"}"#;
        let reference = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(reference.as_deref(), Some("/r/abc.jpg"));
    }

    #[test]
    fn result_image_ref_alias_is_accepted() {
        let body = br#"{"resultImageRef": "/uploads/out.png"}"#;
        let reference = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(reference.as_deref(), Some("/uploads/out.png"));
    }

    #[test]
    fn missing_or_blank_reference_is_empty() {
        assert_eq!(parse_response(StatusCode::OK, b"{}").unwrap(), None);
        assert_eq!(
            parse_response(StatusCode::OK, br#"{"resultImageUrl": "  "}"#).unwrap(),
            None
        );
        assert_eq!(
            parse_response(StatusCode::OK, br#"{"resultImageUrl": null}"#).unwrap(),
            None
        );
    }

    #[test]
    fn error_status_uses_error_payload() {
        let body = br#"{"error": "No person detected in frame"}"#;
        let err = parse_response(StatusCode::UNPROCESSABLE_ENTITY, body).unwrap_err();
        match err {
            RemoteError::Rejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "No person detected in frame");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn error_status_without_payload() {
        let err = parse_response(StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert_eq!(
            err.to_string(),
            "service rejected frame (502): Server error: 502"
        );
    }

    #[test]
    fn malformed_success_body() {
        let err = parse_response(StatusCode::OK, b"not json").unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[test]
    fn relative_reference_resolves_against_origin() {
        let url = resolve_reference(&base(), "/r/abc.jpg").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/r/abc.jpg");
    }

    #[test]
    fn absolute_reference_is_kept() {
        let url = resolve_reference(&base(), "https://cdn.example.com/r/abc.jpg").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/r/abc.jpg");
    }

    #[test]
    fn endpoint_comes_from_config() {
        let service = HttpTryOnService::new(&Config::default().remote).unwrap();
        assert_eq!(
            service.endpoint().as_str(),
            "http://127.0.0.1:5000/api/live-tryon"
        );
    }
}

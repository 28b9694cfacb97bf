//! REST client for an image-synthesis service.
//!
//! Images travel as base64 strings inside JSON bodies:
//!
//! | Endpoint          | Request body                          | Response body       |
//! |-------------------|---------------------------------------|---------------------|
//! | `POST /v1/sheets` | `{ base_image, request }`             | `{ image }`         |
//! | `POST /v1/edits`  | `{ image, instruction }`              | `{ image }`         |

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::SynthesisError;
use crate::provider::{ItemEditor, SheetSynthesizer};
use crate::request::SheetRequest;

/// HTTP client for a single synthesis endpoint.
#[derive(Clone)]
pub struct SynthesisApi {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

/// Response body shared by both endpoints.
#[derive(Debug, Deserialize)]
pub struct ImageResponse {
    /// Base64-encoded image bytes.
    pub image: Option<String>,
    /// Provider-side refusal reason, when the service declines.
    #[serde(default)]
    pub error: Option<String>,
}

impl SynthesisApi {
    /// Create a client for `api_url`, e.g. `http://host:8080`.
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, api_key)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn post_image(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<u8>, SynthesisError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = Self::ensure_success(request.send().await?).await?;
        let payload: ImageResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))?;
        decode_image_payload(payload)
    }

    /// Return the response unchanged on 2xx, otherwise an
    /// [`SynthesisError::Api`] carrying status and body.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SynthesisError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SheetSynthesizer for SynthesisApi {
    async fn synthesize(
        &self,
        base_image: &[u8],
        request: &SheetRequest,
    ) -> Result<Vec<u8>, SynthesisError> {
        tracing::debug!(
            sheet_index = request.sheet_index,
            total = request.total_sheets,
            items = request.items.len(),
            "Requesting sheet synthesis",
        );
        self.post_image("/v1/sheets", &sheet_body(base_image, request))
            .await
    }
}

#[async_trait]
impl ItemEditor for SynthesisApi {
    async fn edit(
        &self,
        masked_image: &[u8],
        instruction: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        tracing::debug!("Requesting single-item edit");
        self.post_image("/v1/edits", &edit_body(masked_image, instruction))
            .await
    }
}

// ---- body helpers ----

pub fn sheet_body(base_image: &[u8], request: &SheetRequest) -> serde_json::Value {
    serde_json::json!({
        "base_image": BASE64.encode(base_image),
        "request": request,
    })
}

pub fn edit_body(masked_image: &[u8], instruction: &str) -> serde_json::Value {
    serde_json::json!({
        "image": BASE64.encode(masked_image),
        "instruction": instruction,
    })
}

pub fn decode_image_payload(payload: ImageResponse) -> Result<Vec<u8>, SynthesisError> {
    if let Some(reason) = payload.error {
        return Err(SynthesisError::Rejected(reason));
    }
    let encoded = payload
        .image
        .ok_or_else(|| SynthesisError::MalformedResponse("missing image field".to_string()))?;
    // Some providers return data URLs.
    let encoded = encoded
        .split_once(";base64,")
        .map_or(encoded.as_str(), |(_, data)| data);
    BASE64
        .decode(encoded.trim())
        .map_err(|e| SynthesisError::MalformedResponse(format!("invalid base64 image: {e}")))
}

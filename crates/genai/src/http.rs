//! REST client for the generation service HTTP endpoints.
//!
//! Wraps the service's `images:generate` and `images:faceSwap` endpoints
//! using [`reqwest`]. Image bytes travel base64-encoded inside the JSON
//! bodies.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{FaceSwapOutcome, GenAiError, GenerateOptions, GenerateOutcome, ImagePayload};
use crate::GenerationService;

/// HTTP client for the generation service.
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct WireImage {
    data: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct WireImageIn {
    data: String,
    #[serde(default = "default_mime")]
    mime_type: String,
}

fn default_mime() -> String {
    "image/png".to_string()
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a Value,
    aspect_ratio: &'a str,
    image_size: &'a str,
    reference_images: Vec<WireImage>,
    google_search: bool,
    safety_override: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    success: bool,
    #[serde(default)]
    images: Vec<WireImageIn>,
    #[serde(default)]
    text_response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct FaceSwapRequest {
    base_image: WireImage,
    reference_image: WireImage,
}

#[derive(Deserialize)]
struct FaceSwapResponse {
    success: bool,
    #[serde(default)]
    image: Option<WireImageIn>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpGenerationService {
    /// Create a new client for the service.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `https://genai.internal`.
    /// * `api_key`  - Bearer token sent with every request.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn encode(image: &ImagePayload) -> WireImage {
        WireImage {
            data: BASE64.encode(&image.bytes),
            mime_type: image.mime_type.clone(),
        }
    }

    fn decode(image: WireImageIn) -> Result<ImagePayload, GenAiError> {
        let bytes = BASE64
            .decode(image.data.as_bytes())
            .map_err(|e| GenAiError::Payload(format!("base64 decode failed: {e}")))?;
        Ok(ImagePayload {
            bytes,
            mime_type: image.mime_type,
        })
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, GenAiError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenAiError::Api {
                message: format!("HTTP {status}"),
                response_text: (!text.is_empty()).then_some(text),
            });
        }

        Ok(response.json::<Resp>().await?)
    }
}

#[async_trait::async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(
        &self,
        prompt: &Value,
        opts: &GenerateOptions,
    ) -> Result<GenerateOutcome, GenAiError> {
        let request = GenerateRequest {
            prompt,
            aspect_ratio: &opts.aspect_ratio,
            image_size: &opts.image_size,
            reference_images: opts.reference_images.iter().map(Self::encode).collect(),
            google_search: opts.google_search,
            safety_override: opts.safety_override,
        };

        tracing::debug!(
            references = opts.reference_images.len(),
            aspect_ratio = %opts.aspect_ratio,
            "Submitting generation request",
        );

        let response: GenerateResponse = self.post("v1/images:generate", &request).await?;

        if !response.success {
            return Err(GenAiError::Api {
                message: response
                    .error
                    .unwrap_or_else(|| "generation failed".to_string()),
                response_text: response.text_response,
            });
        }

        if response.images.is_empty() {
            return Err(GenAiError::NoImage {
                response_text: response.text_response,
            });
        }

        let images = response
            .images
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenerateOutcome {
            images,
            text_response: response.text_response,
        })
    }

    async fn face_swap(
        &self,
        base: &ImagePayload,
        reference: &ImagePayload,
    ) -> Result<FaceSwapOutcome, GenAiError> {
        let request = FaceSwapRequest {
            base_image: Self::encode(base),
            reference_image: Self::encode(reference),
        };

        let response: FaceSwapResponse = self.post("v1/images:faceSwap", &request).await?;

        if !response.success {
            return Err(GenAiError::Api {
                message: response
                    .error
                    .unwrap_or_else(|| "face swap failed".to_string()),
                response_text: None,
            });
        }

        let image = response.image.ok_or(GenAiError::NoImage {
            response_text: None,
        })?;

        Ok(FaceSwapOutcome {
            image: Self::decode(image)?,
        })
    }
}

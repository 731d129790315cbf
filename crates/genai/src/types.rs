//! Request/response types for the generation service.

/// Aspect ratio requested for every generation. Fixed policy.
pub const DEFAULT_ASPECT_RATIO: &str = "2:3";

/// Output resolution tier requested for every generation. Fixed policy.
pub const DEFAULT_IMAGE_SIZE: &str = "1K";

/// An image travelling to or from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// Options for a single generation call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub aspect_ratio: String,
    pub image_size: String,
    /// Identity references, in request order. May be empty.
    pub reference_images: Vec<ImagePayload>,
    /// Passed through to the service untouched.
    pub google_search: bool,
    /// Passed through to the service untouched.
    pub safety_override: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            reference_images: Vec::new(),
            google_search: false,
            safety_override: false,
        }
    }
}

/// A successful generation: at least one image, plus any text the model
/// produced alongside it.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub images: Vec<ImagePayload>,
    pub text_response: Option<String>,
}

/// A successful face-swap: the composited image.
#[derive(Debug, Clone)]
pub struct FaceSwapOutcome {
    pub image: ImagePayload,
}

/// Errors from the generation service layer.
#[derive(Debug, thiserror::Error)]
pub enum GenAiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a failure.
    #[error("Generation API error: {message}")]
    Api {
        message: String,
        /// Raw text the service returned, kept for the generation record.
        response_text: Option<String>,
    },

    /// The service reported success but returned no usable image.
    #[error("Generation API returned no image")]
    NoImage {
        response_text: Option<String>,
    },

    /// A payload could not be decoded.
    #[error("Invalid image payload: {0}")]
    Payload(String),
}

impl GenAiError {
    /// Any raw response text worth persisting alongside the error.
    pub fn response_text(&self) -> Option<&str> {
        match self {
            Self::Api { response_text, .. } | Self::NoImage { response_text } => {
                response_text.as_deref()
            }
            _ => None,
        }
    }
}

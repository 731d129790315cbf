/// Worker configuration loaded from environment variables.
///
/// `DATABASE_URL` is required; everything else has a local-development
/// default.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Base HTTP URL of the generation service.
    pub genai_base_url: String,
    /// Bearer token for the generation service.
    pub genai_api_key: String,
    /// Root directory for generated image files.
    pub image_store_root: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                  |
    /// |--------------------|--------------------------|
    /// | `DATABASE_URL`     | (required)               |
    /// | `GENAI_BASE_URL`   | `http://localhost:8780`  |
    /// | `GENAI_API_KEY`    | (empty)                  |
    /// | `IMAGE_STORE_ROOT` | `./data/images`          |
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let genai_base_url =
            std::env::var("GENAI_BASE_URL").unwrap_or_else(|_| "http://localhost:8780".into());
        let genai_api_key = std::env::var("GENAI_API_KEY").unwrap_or_default();
        let image_store_root =
            std::env::var("IMAGE_STORE_ROOT").unwrap_or_else(|_| "./data/images".into());

        Ok(Self {
            database_url,
            genai_base_url,
            genai_api_key,
            image_store_root,
        })
    }
}

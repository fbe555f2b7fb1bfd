//! Default values for configuration

/// Default owner identity for CLI operation
pub fn default_owner() -> String {
    std::env::var("PROFITIQ_OWNER").unwrap_or_else(|_| "default".to_string())
}

/// Default extraction model backend URL
pub fn default_model_backend_url() -> String {
    std::env::var("PROFITIQ_MODEL_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8750".to_string())
}

/// Default extraction model identifier
pub fn default_model_name() -> String {
    std::env::var("PROFITIQ_MODEL").unwrap_or_else(|_| "extraction-model".to_string())
}

/// Default maximum tokens for an extraction response
pub fn default_model_max_tokens() -> u32 {
    4096
}

/// Default model request timeout in seconds
pub fn default_model_timeout() -> u64 {
    60
}

/// Default prompt identifier recorded in telemetry
pub fn default_prompt_id() -> String {
    "extraction-v1".to_string()
}

/// Default maximum upload size (10 MB)
pub fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Default minimum attachment size; smaller files are signature images
pub fn default_min_attachment_bytes() -> u64 {
    1000
}

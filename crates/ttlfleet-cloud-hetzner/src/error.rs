//! Hetzner provider error types

use thiserror::Error;
use ttlfleet_cloud::CloudError;

#[derive(Error, Debug)]
pub enum HetznerError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Hetzner API error (HTTP {status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<HetznerError> for CloudError {
    fn from(err: HetznerError) -> Self {
        match err {
            HetznerError::Api {
                status: 404,
                message,
                ..
            } => CloudError::ResourceNotFound(message),
            HetznerError::Api { code, message, .. } if code == "not_found" => {
                CloudError::ResourceNotFound(message)
            }
            HetznerError::Api {
                status: 401 | 403,
                message,
                ..
            } => CloudError::AuthenticationFailed(message),
            HetznerError::Api { code, message, .. } => CloudError::ApiError { code, message },
            HetznerError::MissingEnvVar(var) => {
                CloudError::InvalidConfig(format!("{} must be set", var))
            }
            HetznerError::Http(e) => CloudError::Transport(e.to_string()),
            HetznerError::JsonError(e) => CloudError::Json(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HetznerError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Site enumeration failed: {0}")]
    Enumeration(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("No access token available. Configure a client secret or set PERMSWEEP_ACCESS_TOKEN")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SweepError {
    /// HTTP status of a provider rejection, if this error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            SweepError::ApiError { status, .. } => Some(*status),
            SweepError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error means the site itself cannot be reached with the current credential
    /// (deleted, locked, or access denied), as opposed to a transient failure.
    pub fn is_site_unreachable(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 404 | 410 | 423))
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

pub use SweepError as Error;

/// Parse a Graph or SharePoint REST error body and provide helpful context
pub fn enhance_api_error(error_response: &str) -> String {
    let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) else {
        return error_response.to_string();
    };

    // Graph: {"error": {"code": "...", "message": "..."}}
    // SharePoint nometadata: {"odata.error": {"code": "...", "message": {"value": "..."}}}
    let (code, message) = if let Some(error_obj) = error_json.get("error") {
        (
            error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown"),
            error_obj
                .get("message")
                .and_then(|m| m.as_str().or_else(|| m.get("value").and_then(|v| v.as_str())))
                .unwrap_or("No message"),
        )
    } else if let Some(error_obj) = error_json.get("odata.error") {
        (
            error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown"),
            error_obj
                .get("message")
                .and_then(|m| m.get("value").and_then(|v| v.as_str()).or_else(|| m.as_str()))
                .unwrap_or("No message"),
        )
    } else {
        return error_response.to_string();
    };

    let hint = match code {
        "Unauthorized" | "InvalidAuthenticationToken" => {
            "\nHint: The access token was rejected. SharePoint REST requires a token issued for the SharePoint resource."
        }
        "Forbidden" | "accessDenied" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
            "\nHint: Check that the app registration has Sites.FullControl.All and admin consent is granted."
        }
        "TooManyRequests" | "activityLimitReached" => {
            "\nHint: The tenant is throttling requests. Lower the sweep concurrency."
        }
        "itemNotFound" | "NotFound" => "\nHint: The site may have been deleted or moved.",
        _ if message.contains("Access denied") => {
            "\nHint: The app does not have access to this site collection."
        }
        _ => "",
    };

    format!("{}: {}{}", code, message, hint)
}

//! Standardized translation of HTTP and transport failures into [`MigrateError`]

use crate::error::MigrateError;
use reqwest::StatusCode;

/// Maps unexpected registry responses to errors with operation context
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    pub fn handle_registry_error(
        status: StatusCode,
        error_text: &str,
        operation: &str,
    ) -> MigrateError {
        let message = match status.as_u16() {
            401 => format!("Unauthorized: {}", error_text),
            403 => format!("Forbidden, insufficient permissions: {}", error_text),
            404 => format!("Resource not found: {}", error_text),
            416 => format!("Requested range not satisfiable: {}", error_text),
            429 => format!("Rate limited by registry: {}", error_text),
            400 if error_text.contains("DIGEST_INVALID") => format!(
                "Uploaded content does not match the expected digest: {}",
                error_text
            ),
            400 if error_text.contains("MANIFEST_BLOB_UNKNOWN") => format!(
                "Manifest references a blob the registry does not have: {}",
                error_text
            ),
            500 => format!("Registry server error: {}", error_text),
            502 | 503 => format!("Registry unavailable: {}", error_text),
            507 => format!("Registry out of storage: {}", error_text),
            _ => error_text.to_string(),
        };

        MigrateError::registry(operation, status.as_u16(), message)
    }

    /// Consume an error response and build the error for it
    pub async fn from_response(response: reqwest::Response, operation: &str) -> MigrateError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Self::handle_registry_error(status, &error_text, operation)
    }
}

/// Network error categorization
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> MigrateError {
        if error.is_timeout() {
            MigrateError::Network(format!("{} timed out: {}", context, error))
        } else if error.is_connect() {
            MigrateError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            MigrateError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            MigrateError::Network(format!("{} network error: {}", context, error))
        }
    }
}

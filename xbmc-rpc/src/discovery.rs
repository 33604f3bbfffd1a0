//! Schema discovery over the XBMC web server

use std::time::Duration;

use crate::config::XbmcConfig;
use crate::error::{Result, XbmcError};
use crate::schema::Schema;

/// Fetch and normalize the schema of the instance described by `config`
pub fn discover(config: &XbmcConfig) -> Result<Schema> {
    fetch_schema(&config.discovery_url(), config.discovery_timeout)
}

/// Fetch the schema document at `url`
///
/// # Errors
///
/// `XbmcError::Discovery` when the endpoint is unreachable or answers with a
/// non-success status, `XbmcError::Schema` when the body is not a schema
/// document.
pub fn fetch_schema(url: &str, timeout: Duration) -> Result<Schema> {
    let discovery_error = |reason: String| XbmcError::Discovery {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| discovery_error(format!("Failed to create HTTP client: {}", e)))?;

    tracing::debug!("Loading schema from {}", url);
    let response = client
        .get(url)
        .send()
        .map_err(|e| discovery_error(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(discovery_error(format!("HTTP status {}", status)));
    }

    let body = response
        .text()
        .map_err(|e| discovery_error(format!("Failed to read response body: {}", e)))?;

    let schema = Schema::from_document(&body)?;
    tracing::debug!(
        "Schema from {}: {} methods, {} notifications",
        url,
        schema.methods.len(),
        schema.notifications.len()
    );
    Ok(schema)
}

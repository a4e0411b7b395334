// SPDX-License-Identifier: GPL-3.0-only
use anyhow::{Context, Result};
use url::Url;

/// Maximum allowed URL length
const MAX_URL_LENGTH: usize = 2048;

/// Validate a configured backend endpoint and return it parsed.
///
/// Only http/https with a host are accepted. Plain http is tolerated for
/// loopback hosts (emulators, test servers) and logged otherwise.
pub fn validate_endpoint_url(url_str: &str) -> Result<Url> {
    if url_str.len() > MAX_URL_LENGTH {
        return Err(anyhow::anyhow!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH));
    }

    let url = Url::parse(url_str).context("Invalid URL format")?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(anyhow::anyhow!(
                "Invalid URL scheme: {} (only http and https are allowed)",
                scheme
            ));
        }
    }

    let Some(host) = url.host_str() else {
        return Err(anyhow::anyhow!("URL must have a host"));
    };

    if url.scheme() == "http" && !is_loopback_host(host) {
        tracing::warn!(host = %host, "Backend endpoint uses plain http");
    }

    Ok(url)
}

/// Check if a hostname is a loopback variant
pub fn is_loopback_host(host: &str) -> bool {
    let host_lower = host.to_lowercase();
    matches!(host_lower.as_str(), "localhost" | "::1" | "[::1]") || host_lower.starts_with("127.")
}

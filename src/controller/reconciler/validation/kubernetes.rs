//! # Kubernetes Validation
//!
//! Validates object names, remote URLs and header names taken from specs.

use anyhow::Result;
use regex::Regex;

const NAME_PATTERN: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";
const URL_PATTERN: &str = r"^https?://[A-Za-z0-9.\-\[\]:]+(/\S*)?$";
const HEADER_PATTERN: &str = r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$";

fn matches(pattern: &str, value: &str) -> Result<bool> {
    let regex =
        Regex::new(pattern).map_err(|e| anyhow::anyhow!("invalid pattern {pattern}: {e}"))?;
    Ok(regex.is_match(value))
}

/// Object name referenced from a spec (RFC 1123 subdomain, at most 253 chars)
pub fn validate_kubernetes_name(name: &str, field_name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }
    if name.len() > 253 {
        return Err(anyhow::anyhow!(
            "{field_name} '{name}' is {} characters long, the limit is 253",
            name.len()
        ));
    }
    if !matches(NAME_PATTERN, name)? {
        return Err(anyhow::anyhow!(
            "{field_name} '{name}' must consist of lowercase alphanumerics, '-' and '.', starting and ending alphanumeric"
        ));
    }
    Ok(())
}

/// Absolute http:// or https:// URL with a host
pub fn validate_remote_url(url: &str, field_name: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }
    if !matches(URL_PATTERN, url)? {
        return Err(anyhow::anyhow!(
            "{field_name} '{url}' must be an http:// or https:// URL"
        ));
    }
    Ok(())
}

/// HTTP header name (RFC 7230 token)
pub fn validate_header_name(name: &str) -> Result<()> {
    if !matches(HEADER_PATTERN, name)? {
        return Err(anyhow::anyhow!(
            "headerName '{name}' is not a valid HTTP header name"
        ));
    }
    Ok(())
}

//! Process-wide default for the public base URL.
//!
//! Email-context sanitization rewrites site-relative links to absolute URLs.
//! Callers can pass a base URL per call; when they don't, the value configured
//! here is used. It is read-only after first use.

use crate::error::{Error, Result};
use std::sync::OnceLock;
use url::Url;

static PUBLIC_BASE_URL: OnceLock<Option<String>> = OnceLock::new();

/// Validates and normalizes a public base URL. Must parse as an absolute
/// `http`/`https` URL; the trailing `/` is trimmed so that link rewriting can
/// concatenate a site-relative href without producing a double slash.
fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw).map_err(|e| Error::InvalidBaseUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidBaseUrl {
            url: raw.to_string(),
            message: format!("unsupported scheme `{}`", parsed.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Sets the process-wide public base URL.
///
/// Call once at startup, before the first email-context sanitize call.
/// Returns [`Error::BaseUrlAlreadySet`] if the value was already initialized
/// (explicitly, or implicitly from the environment on first read).
pub fn set_public_base_url(raw: &str) -> Result<()> {
    let normalized = normalize_base_url(raw)?;
    PUBLIC_BASE_URL
        .set(Some(normalized))
        .map_err(|_| Error::BaseUrlAlreadySet)
}

/// The process-wide public base URL, if configured.
///
/// Falls back to the `PUBLIC_BASE_URL` environment variable on first read; an
/// unset or invalid variable leaves the default unset.
pub fn public_base_url() -> Option<&'static str> {
    PUBLIC_BASE_URL
        .get_or_init(|| {
            std::env::var("PUBLIC_BASE_URL")
                .ok()
                .and_then(|raw| normalize_base_url(&raw).ok())
        })
        .as_deref()
}

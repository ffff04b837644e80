//! Link-handling rules shared by both rendering contexts.

/// Where sanitized HTML will be displayed. Link handling differs between the
/// two: an in-app page has a client-side router that intercepts clicks on
/// site-relative links, while an email client does not, so email bodies need
/// every link absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderContext {
    /// Rendered inside an application page with client-side routing.
    Web,
    /// Rendered inside a transactional email body.
    Email,
}

/// Tokens forced onto the `rel` of every retained external anchor.
pub(crate) const REL_HARDENING: &[&str] = &["noopener", "noreferrer", "nofollow"];

/// A site-relative link starts with `/` and resolves against the application's
/// own origin. `//host/path` is protocol-relative, i.e. external.
pub(crate) fn is_site_relative(href: &str) -> bool {
    href.starts_with('/') && !href.starts_with("//")
}

/// Merges the hardening tokens into an existing `rel` value. Author-supplied
/// tokens come first and are kept; nothing is ever duplicated, so applying
/// this to its own output is a no-op.
pub(crate) fn harden_rel(existing: Option<&str>) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    if let Some(existing) = existing {
        for tok in existing.split_ascii_whitespace() {
            if !tokens.iter().any(|t| t.eq_ignore_ascii_case(tok)) {
                tokens.push(tok);
            }
        }
    }
    for required in REL_HARDENING {
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(required)) {
            tokens.push(required);
        }
    }
    tokens.join(" ")
}

/// Prefixes `base_url` onto a site-relative href with exactly one `/`
/// separator between them.
pub(crate) fn absolutize(base_url: &str, href: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), href)
}

#![forbid(unsafe_code)]

//! Allowlist HTML sanitizer with a context-aware link policy.
//!
//! Turns arbitrary user- or admin-authored HTML into a safe-to-render subset:
//! tags and attributes outside an allowlist are stripped, URI-valued
//! attributes are checked against a scheme allowlist, and anchors are
//! rewritten for the environment the output will be displayed in.
//! [`RenderContext::Web`] leaves site-relative links untouched so a
//! client-side router can intercept them; [`RenderContext::Email`] absolutizes
//! them against a public base URL, since email clients have no router.
//!
//! Sanitization never fails and never panics: malformed markup degrades to
//! stripped text, and disallowed content is silently removed. The output is
//! stable under re-sanitization.

pub mod config;
pub mod error;
mod links;
pub mod policy;
pub mod sanitize;

pub use error::{Error, Result};
pub use links::RenderContext;
pub use policy::{Policy, PolicyOverrides};
pub use sanitize::{sanitize, sanitize_with};

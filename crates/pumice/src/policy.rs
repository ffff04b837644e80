//! The sanitization policy: declarative allowlist tables.
//!
//! The policy is plain data. Tags, per-tag attributes, and URI schemes are
//! each an explicit enumeration; anything absent is stripped. A [`Policy`] is
//! immutable once built and safe to share across threads.

use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Safe-to-render tag subset: paragraphs, inline emphasis, headings, lists,
/// block quotes, code, images, anchors, and generic containers.
const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i",
    "img", "li", "ol", "p", "pre", "s", "span", "strong", "u", "ul",
];

/// Per-tag attribute allowlist. Tags not listed here carry no attributes.
const DEFAULT_TAG_ATTRS: &[(&str, &[&str])] = &[
    ("a", &["href", "title", "target", "rel", "class"]),
    ("img", &["src", "alt", "width", "height"]),
    ("div", &["class"]),
    ("span", &["class"]),
];

/// URI schemes accepted on `href`/`src` values, any tag.
const DEFAULT_URI_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Tags whose `src` may additionally carry a `data:` URI.
const DEFAULT_DATA_URI_TAGS: &[&str] = &["img"];

/// Executable-payload containers: removed together with their content instead
/// of being unwrapped like other disallowed tags.
const DROP_CONTENT_TAGS: &[&str] = &["script", "style", "iframe", "object", "embed"];

fn drop_content_tags() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| DROP_CONTENT_TAGS.iter().copied().collect())
}

/// Characters DOMPurify strips from attribute values before scheme checks;
/// defeats `java\tscript:` style smuggling.
fn attr_whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\u{0000}-\u{0020}\u{00A0}\u{1680}\u{180E}\u{2000}-\u{2029}\u{205F}\u{3000}]")
            .expect("valid regex")
    })
}

/// Builds the allowed-URI matcher for a scheme set. Accepts an allowlisted
/// scheme, a site-relative path (`/` not followed by another `/`), a value
/// starting with a non-letter (`#fragment`, `?query`, `./x`), or a schemeless
/// word. Everything carrying an unlisted scheme fails, as does the
/// protocol-relative `//host` form.
fn compile_allowed_uri(schemes: &HashSet<String>) -> Regex {
    let mut alts: Vec<String> = schemes.iter().map(|s| regex::escape(s)).collect();
    alts.sort_unstable();
    let alts = alts.join("|");
    Regex::new(&format!(
        r"(?i)^(?:(?:{alts}):|/(?:[^/]|$)|[^a-z/]|[a-z+.\-]+(?:[^a-z+.\-:]|$))"
    ))
    .expect("valid allowed-URI regex")
}

/// Serde-deserializable adjustments layered over [`Policy::default`].
/// Removals win over additions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyOverrides {
    /// Extra tags to allow (lowercased on merge).
    pub add_tags: Vec<String>,
    /// Tags to strip even if allowed by default. Their content is still
    /// unwrapped, not dropped.
    pub forbid_tags: Vec<String>,
    /// Extra attributes to allow, keyed by tag.
    pub add_attrs: HashMap<String, Vec<String>>,
    /// Attributes to strip on every tag even if allowed by default.
    pub forbid_attrs: Vec<String>,
    /// Extra URI schemes to accept on `href`/`src`.
    pub add_schemes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Policy {
    allowed_tags: HashSet<String>,
    tag_attrs: HashMap<String, HashSet<String>>,
    forbid_attrs: HashSet<String>,
    data_uri_tags: HashSet<String>,
    allowed_uri: Regex,
}

impl Default for Policy {
    fn default() -> Self {
        Self::with_overrides(&PolicyOverrides::default())
    }
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default tables adjusted by `overrides`.
    pub fn with_overrides(overrides: &PolicyOverrides) -> Self {
        let mut allowed_tags: HashSet<String> = DEFAULT_ALLOWED_TAGS
            .iter()
            .map(|t| t.to_string())
            .collect();
        for t in &overrides.add_tags {
            allowed_tags.insert(t.to_ascii_lowercase());
        }
        for t in &overrides.forbid_tags {
            allowed_tags.remove(&t.to_ascii_lowercase());
        }

        let mut tag_attrs: HashMap<String, HashSet<String>> = DEFAULT_TAG_ATTRS
            .iter()
            .map(|(tag, attrs)| {
                (
                    tag.to_string(),
                    attrs.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect();
        for (tag, attrs) in &overrides.add_attrs {
            let entry = tag_attrs.entry(tag.to_ascii_lowercase()).or_default();
            for a in attrs {
                entry.insert(a.to_ascii_lowercase());
            }
        }

        let forbid_attrs: HashSet<String> = overrides
            .forbid_attrs
            .iter()
            .map(|a| a.to_ascii_lowercase())
            .collect();

        let mut schemes: HashSet<String> = DEFAULT_URI_SCHEMES
            .iter()
            .map(|s| s.to_string())
            .collect();
        for s in &overrides.add_schemes {
            schemes.insert(s.to_ascii_lowercase());
        }

        let allowed_uri = compile_allowed_uri(&schemes);

        Self {
            allowed_tags,
            tag_attrs,
            forbid_attrs,
            data_uri_tags: DEFAULT_DATA_URI_TAGS.iter().map(|t| t.to_string()).collect(),
            allowed_uri,
        }
    }

    pub(crate) fn tag_allowed(&self, lc_tag: &str) -> bool {
        self.allowed_tags.contains(lc_tag)
    }

    /// Tags whose removal takes the content with it.
    pub(crate) fn drops_content(&self, lc_tag: &str) -> bool {
        drop_content_tags().contains(lc_tag)
    }

    pub(crate) fn attr_allowed(&self, lc_tag: &str, lc_name: &str) -> bool {
        if self.forbid_attrs.contains(lc_name) {
            return false;
        }
        self.tag_attrs
            .get(lc_tag)
            .is_some_and(|attrs| attrs.contains(lc_name))
    }

    /// Validates an entity-decoded `href`/`src` value. The whitespace strip
    /// runs only for the check; the caller keeps the decoded value.
    pub(crate) fn uri_allowed(&self, lc_tag: &str, decoded_value: &str) -> bool {
        if decoded_value.is_empty() {
            return true;
        }
        let stripped = attr_whitespace_regex().replace_all(decoded_value, "");
        if self.allowed_uri.is_match(&stripped) {
            return true;
        }
        self.data_uri_tags.contains(lc_tag)
            && stripped
                .get(..5)
                .is_some_and(|p| p.eq_ignore_ascii_case("data:"))
    }
}

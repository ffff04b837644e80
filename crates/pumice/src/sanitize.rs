//! The sanitizer: a single streaming rewrite pass over the input fragment.
//!
//! Built on `lol_html::rewrite_str`. Executable containers are removed with
//! their content, disallowed tags are unwrapped, attributes are filtered per
//! tag, URI values are validated against the scheme allowlist, and anchors get
//! the context-dependent link treatment.

use crate::config;
use crate::links::{self, RenderContext};
use crate::policy::Policy;
use lol_html::html_content::Element;
use lol_html::{RewriteStrSettings, doc_comments, element, rewrite_str};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn line_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn tag_strip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// `lol_html::rewrite_str` is less permissive than browser parsing: a stray
/// `<` that does not open a tag (e.g. `"a < b"`) can fail the rewrite.
/// Browsers treat such tokens as text and serialize them as `&lt;`, so we
/// pre-escape them the same way.
fn escape_stray_lt(input: &str) -> Cow<'_, str> {
    fn opens_tag(next: Option<&u8>) -> bool {
        matches!(next, Some(&b) if b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
    }

    let bytes = input.as_bytes();
    let stray = |i: usize| bytes[i] == b'<' && !opens_tag(bytes.get(i + 1));
    if !(0..bytes.len()).any(|i| stray(i)) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    let mut last = 0usize;
    for i in 0..bytes.len() {
        if stray(i) {
            out.push_str(&input[last..i]);
            out.push_str("&lt;");
            last = i + 1;
        }
    }
    out.push_str(&input[last..]);
    Cow::Owned(out)
}

/// Attribute values arrive raw from the tokenizer, entities included.
/// Validation (and the retained value) must see the decoded form, or
/// `javascript&colon;alert(1)` sails through the scheme check.
fn decode_attr_value(value: &str) -> Cow<'_, str> {
    if value.contains('&') {
        htmlize::unescape(value)
    } else {
        Cow::Borrowed(value)
    }
}

fn harden_anchor(el: &mut Element<'_, '_>) {
    let rel = links::harden_rel(el.get_attribute("rel").as_deref());
    let _ = el.set_attribute("rel", &rel);
    if el.get_attribute("target").is_none() {
        let _ = el.set_attribute("target", "_blank");
    }
}

fn apply_link_policy(el: &mut Element<'_, '_>, context: RenderContext, base_url: Option<&str>) {
    let Some(href) = el.get_attribute("href") else {
        return;
    };

    match context {
        RenderContext::Web => {
            if links::is_site_relative(&href) {
                // The in-app router intercepts clicks on site-relative links;
                // a target attribute would punch them out of the page.
                el.remove_attribute("target");
                return;
            }
            harden_anchor(el);
        }
        RenderContext::Email => {
            if links::is_site_relative(&href) {
                let Some(base) = base_url else {
                    tracing::warn!(
                        href = %href,
                        "email-context sanitize found a site-relative link but no public \
                         base URL is configured; leaving it unrewritten"
                    );
                    return;
                };
                let _ = el.set_attribute("href", &links::absolutize(base, &href));
            }
            harden_anchor(el);
        }
    }
}

/// Sanitizes `html` with the default [`Policy`].
///
/// Never fails and never panics: empty input yields an empty string, and
/// markup the rewriter cannot parse degrades to tag-stripped text. The result
/// is stable under re-sanitization with the same context and base URL.
///
/// `base_url` is consulted only in [`RenderContext::Email`]; when `None`, the
/// process-wide value from [`config::public_base_url`] is used. With neither
/// available, site-relative links are left unrewritten (and a warning is
/// logged) rather than interrupting message composition.
pub fn sanitize(html: &str, context: RenderContext, base_url: Option<&str>) -> String {
    static DEFAULT_POLICY: OnceLock<Policy> = OnceLock::new();
    sanitize_with(html, DEFAULT_POLICY.get_or_init(Policy::default), context, base_url)
}

/// [`sanitize`] with a caller-supplied [`Policy`].
pub fn sanitize_with(
    html: &str,
    policy: &Policy,
    context: RenderContext,
    base_url: Option<&str>,
) -> String {
    if html.is_empty() || !html.contains('<') {
        return html.to_string();
    }

    let base_url: Option<String> = match context {
        RenderContext::Email => base_url
            .map(|b| b.trim_end_matches('/').to_string())
            .or_else(|| config::public_base_url().map(str::to_string)),
        RenderContext::Web => None,
    };

    let text = escape_stray_lt(html);

    let mut handlers = vec![
        element!("script", |el| {
            el.remove();
            Ok(())
        }),
        element!("style", |el| {
            el.remove();
            Ok(())
        }),
        element!("iframe", |el| {
            el.remove();
            Ok(())
        }),
        element!("object", |el| {
            el.remove();
            Ok(())
        }),
        element!("embed", |el| {
            el.remove();
            Ok(())
        }),
    ];

    handlers.push(element!("*", |el| {
        let lc_tag = el.tag_name().to_ascii_lowercase();

        if policy.drops_content(&lc_tag) {
            el.remove();
            return Ok(());
        }
        if !policy.tag_allowed(&lc_tag) {
            el.remove_and_keep_content();
            return Ok(());
        }

        let attrs: Vec<(String, String)> = el
            .attributes()
            .iter()
            .map(|a| (a.name(), a.value()))
            .collect();

        for (name, value) in attrs {
            let lc_name = name.to_ascii_lowercase();
            if !policy.attr_allowed(&lc_tag, &lc_name) {
                el.remove_attribute(&name);
                continue;
            }

            if matches!(lc_name.as_str(), "href" | "src") {
                let decoded = decode_attr_value(&value);
                if !policy.uri_allowed(&lc_tag, &decoded) {
                    tracing::debug!(tag = %lc_tag, attr = %lc_name, "dropping disallowed URI value");
                    el.remove_attribute(&name);
                    continue;
                }
                if decoded != value {
                    let _ = el.set_attribute(&name, &decoded);
                }
            }
        }

        if lc_tag == "a" {
            apply_link_policy(el, context, base_url.as_deref());
        }
        Ok(())
    }));

    let rewritten = rewrite_str(
        text.as_ref(),
        RewriteStrSettings {
            element_content_handlers: handlers,
            // Comments are not in the allowlist either, and conditional
            // comments are live content in some email clients.
            document_content_handlers: vec![doc_comments!(|c| {
                c.remove();
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    );

    let out = match rewritten {
        Ok(out) => out,
        // Unparseable fragment: keep the text, lose every tag.
        Err(_) => tag_strip_regex().replace_all(text.as_ref(), "").into_owned(),
    };

    // Void-element normalization so output is well formed regardless of how
    // the author wrote their line breaks.
    line_break_regex().replace_all(&out, "<br/>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyOverrides;

    const BASE: &str = "https://myapp.test";

    fn web(html: &str) -> String {
        sanitize(html, RenderContext::Web, None)
    }

    fn email(html: &str) -> String {
        sanitize(html, RenderContext::Email, Some(BASE))
    }

    #[test]
    fn empty_and_plain_text_pass_through() {
        assert_eq!(web(""), "");
        assert_eq!(web("hello world"), "hello world");
        assert_eq!(email("no markup here"), "no markup here");
    }

    #[test]
    fn script_blocks_are_removed_with_their_content() {
        let input = r#"1<script src="http://abc.test/script1.js"></script>1
<b>two</b>: 1<script>alert('run');</script>1"#;
        let out = web(input);
        assert!(!out.contains("<script"));
        assert!(!out.contains("alert"));
        assert!(out.contains("<b>two</b>"));
        assert!(out.contains("11"));
    }

    #[test]
    fn style_iframe_object_embed_drop_content_too() {
        assert_eq!(web("<style>.x{color:red}</style><b>ok</b>"), "<b>ok</b>");
        assert_eq!(web(r#"<iframe src="http://abc.test/x"></iframe>"#), "");
        assert_eq!(web(r#"<object data="x"></object><embed src="y">"#), "");
    }

    #[test]
    fn disallowed_tags_are_unwrapped_keeping_text() {
        assert_eq!(web(r#"<custom-tag onclick="alert(1)">x</custom-tag>"#), "x");
        assert_eq!(web("<form><p>keep me</p></form>"), "<p>keep me</p>");
    }

    #[test]
    fn event_handlers_and_style_attributes_are_stripped() {
        let out = web(r#"<a href="/dashboard" style="color:red" onclick="alert(1)">Dashboard</a>"#);
        assert!(out.contains(r#"<a href="/dashboard""#));
        assert!(!out.contains("style="));
        assert!(!out.contains("onclick"));

        assert_eq!(web(r#"<img onerror="alert('x')">"#), "<img>");
        assert_eq!(web(r#"<b foo="bar">ok</b>"#), "<b>ok</b>");
    }

    #[test]
    fn javascript_hrefs_lose_the_attribute_entirely() {
        let out = web(r#"This is a <a href="javascript:runHijack();">clean link</a>"#);
        assert_eq!(out, "This is a <a>clean link</a>");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));

        let out = web(r#"<a href="vbscript:msgbox(1)">y</a>"#);
        assert!(!out.to_ascii_lowercase().contains("vbscript:"));
    }

    #[test]
    fn entity_encoded_scheme_smuggling_is_defeated() {
        for input in [
            r#"<a href="javascript&colon;bypass();">me too</a>"#,
            r#"<a href="java&Tab;script:alert(1)">x</a>"#,
            r#"<a href="javascript&#0000058alert(1)">x</a>"#,
            r#"<a href="javascript&#x3A;alert(1)">x</a>"#,
        ] {
            let out = web(input);
            assert!(
                !out.to_ascii_lowercase().contains("javascript"),
                "{input} leaked through as {out}"
            );
            assert!(out.ends_with("</a>"));
        }
    }

    #[test]
    fn allowed_entity_encoded_urls_survive_decoding() {
        let out = web(r#"<a href="/search?a=1&amp;b=2">q</a>"#);
        assert!(out.contains("/search?a=1"));
        assert!(out.contains("b=2"));
        // And stays stable on a second pass.
        assert_eq!(web(&out), out);
    }

    #[test]
    fn web_context_leaves_site_relative_links_for_the_router() {
        let out = web(r#"<a href="/dashboard">Dashboard</a>"#);
        assert!(out.contains(r#"href="/dashboard""#));
        assert!(!out.contains("target="));
        assert!(!out.contains("rel="));
    }

    #[test]
    fn web_context_strips_author_target_from_site_relative_links() {
        let out = web(r#"<a href="/jobs" target="_blank">Jobs</a>"#);
        assert!(out.contains(r#"href="/jobs""#));
        assert!(!out.contains("target="));
    }

    #[test]
    fn web_context_hardens_external_links() {
        let out = web(r#"<a href="https://example.com">Example</a>"#);
        assert!(out.contains(r#"href="https://example.com""#));
        assert!(out.contains(r#"target="_blank""#));
        assert!(out.contains("noopener"));
        assert!(out.contains("noreferrer"));
        assert!(out.contains("nofollow"));
    }

    #[test]
    fn web_context_respects_an_explicit_target_on_external_links() {
        let out = web(r#"<a href="https://example.com" target="_self">x</a>"#);
        assert!(out.contains(r#"target="_self""#));
        assert!(!out.contains(r#"target="_blank""#));
        assert!(out.contains("noopener"));
    }

    #[test]
    fn web_context_preserves_existing_rel_tokens() {
        let out = web(r#"<a href="https://example.com" rel="external">x</a>"#);
        assert!(out.contains(r#"rel="external noopener noreferrer nofollow""#));
    }

    #[test]
    fn protocol_relative_links_are_not_site_relative() {
        let out = web(r#"<a href="//evil.test/phish">x</a>"#);
        assert!(!out.contains("//evil.test"));
        assert!(out.contains("<a"));
    }

    #[test]
    fn email_context_absolutizes_site_relative_links() {
        let out = email(r#"<a href="/dashboard">Go</a>"#);
        assert!(out.contains(r#"href="https://myapp.test/dashboard""#));
        assert!(!out.contains("myapp.test//"));
    }

    #[test]
    fn email_context_handles_trailing_slash_in_base_url() {
        let out = sanitize(
            r#"<a href="/dashboard">Go</a>"#,
            RenderContext::Email,
            Some("http://localhost:3000/"),
        );
        assert!(out.contains(r#"href="http://localhost:3000/dashboard""#));
    }

    #[test]
    fn email_context_leaves_absolute_links_alone_but_hardens_them() {
        let out = email(r#"<a href="https://example.com/features">Features</a>"#);
        assert!(out.contains(r#"href="https://example.com/features""#));
        assert!(out.contains(r#"target="_blank""#));
        assert!(out.contains("noopener noreferrer nofollow"));
    }

    #[test]
    fn email_context_keeps_mailto_and_tel() {
        let out = email(
            r#"<a href="mailto:support@example.com">Support</a> <a href="tel:+15551230000">Call</a>"#,
        );
        assert!(out.contains(r#"href="mailto:support@example.com""#));
        assert!(out.contains(r#"href="tel:+15551230000""#));
    }

    #[test]
    fn email_context_without_base_url_leaves_relative_links_unrewritten() {
        // No explicit base; the process-wide default is not configured in tests.
        let out = sanitize(r#"<a href="/dashboard">Go</a>"#, RenderContext::Email, None);
        assert!(out.contains(r#"href="/dashboard""#));
        assert!(!out.contains("target="));
    }

    #[test]
    fn data_uri_only_on_img_src() {
        let data = "data:image/png;base64,iVBORw0KGgo=";
        let out = web(&format!(r#"<img src="{data}" alt="pic">"#));
        assert!(out.contains(r#"src="data:image/png;base64,iVBORw0KGgo=""#));
        assert!(out.contains(r#"alt="pic""#));

        let out = web(&format!(r#"<a href="{data}">x</a>"#));
        assert!(!out.contains("data:"));
    }

    #[test]
    fn img_keeps_dimensional_attributes_only() {
        let out = web(r#"<img src="/cdn/p.png" width="40" height="40" class="avatar">"#);
        assert!(out.contains(r#"src="/cdn/p.png""#));
        assert!(out.contains(r#"width="40""#));
        assert!(!out.contains("class="));
    }

    #[test]
    fn container_tags_keep_class_only() {
        let out = web(r#"<div class="note" id="n1"><span class="hl" data-x="1">t</span></div>"#);
        assert!(out.contains(r#"<div class="note">"#));
        assert!(out.contains(r#"<span class="hl">"#));
        assert!(!out.contains("id="));
        assert!(!out.contains("data-x"));
    }

    #[test]
    fn comments_are_removed() {
        assert_eq!(web("a<!-- hidden -->b"), "ab");
        assert_eq!(
            web("<!--[if mso]><p>outlook only</p><![endif]-->x"),
            "x"
        );
    }

    #[test]
    fn br_variants_are_normalized_to_self_closing() {
        assert_eq!(web("a<br>b<BR />c<br/>d"), "a<br/>b<br/>c<br/>d");
    }

    #[test]
    fn stray_angle_brackets_degrade_to_text() {
        let out = web("5 < 6 and <b>bold</b>");
        assert!(out.contains("&lt;"));
        assert!(out.contains("<b>bold</b>"));

        // Unclosed markup must not panic or error out.
        let out = web(r#"<p>open <a href="/x">link"#);
        assert!(out.contains("link"));
    }

    #[test]
    fn sanitization_is_idempotent() {
        let inputs = [
            r#"<a href="/dashboard">Dashboard</a>"#,
            r#"<a href="https://example.com" rel="external" target="_self">x</a>"#,
            r#"<p>Hello <strong>world</strong> <script>alert(1)</script></p>"#,
            r#"<a href="/search?a=1&amp;b=2">q</a>"#,
            "a<br>b and 5 < 6",
            r#"<img src="data:image/png;base64,AAAA" alt="x">"#,
        ];
        for input in inputs {
            for (ctx, base) in [
                (RenderContext::Web, None),
                (RenderContext::Email, Some(BASE)),
            ] {
                let once = sanitize(input, ctx, base);
                let twice = sanitize(&once, ctx, base);
                assert_eq!(once, twice, "not idempotent for {input} in {ctx:?}");
            }
        }
    }

    #[test]
    fn custom_policy_overrides_flow_through() {
        let overrides: PolicyOverrides = serde_json::from_value(serde_json::json!({
            "forbidTags": ["img"],
            "addAttrs": { "p": ["class"] }
        }))
        .unwrap();
        let policy = Policy::with_overrides(&overrides);

        let out = sanitize_with(
            r#"<p class="lead"><img src="/x.png">text</p>"#,
            &policy,
            RenderContext::Web,
            None,
        );
        assert!(out.contains(r#"<p class="lead">"#));
        assert!(!out.contains("<img"));
        assert!(out.contains("text"));
    }
}

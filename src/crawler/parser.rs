//! Link extraction and server identification
//!
//! Both functions here are stateless. The coordinator normalizes, filters and
//! caps whatever [`extract_links`] returns.

use reqwest::header::{HeaderMap, SERVER};
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Elements and attributes that can point at another page
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("form[action]", "action"),
    ("button[formaction]", "formaction"),
];

/// Bytes inspected when sniffing for binary content
const SNIFF_LEN: usize = 1024;

/// Extraction failure; the caller treats it as a page with no links
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Body looks binary, not markup")]
    Binary,
}

/// Returns true if a response with this Content-Type should be parsed for links
///
/// A missing header is given the benefit of the doubt.
pub fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        }
    }
}

/// Extracts absolute candidate URLs from a page body
///
/// # Link Extraction Rules
///
/// **Include:** `a[href]`, `link[href]`, `script[src]`, `img[src]`,
/// `form[action]`, `button[formaction]`
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links (same page anchors)
/// - Anything that does not resolve to http or https
///
/// Candidates are returned once each, in document order. Invalid UTF-8 is
/// replaced rather than rejected; a NUL byte near the start of the body is
/// taken as binary content and reported as [`ParseError::Binary`].
///
/// # Example
///
/// ```
/// use domain_reach::crawler::extract_links;
/// use url::Url;
///
/// let html = br#"<html><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let links = extract_links(html, &base_url).unwrap();
/// assert_eq!(links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn extract_links(body: &[u8], base_url: &Url) -> Result<Vec<String>, ParseError> {
    if body[..body.len().min(SNIFF_LEN)].contains(&0) {
        return Err(ParseError::Binary);
    }

    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for (selector, attr) in LINK_SOURCES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for element in document.select(&selector) {
            if let Some(absolute_url) = element
                .value()
                .attr(attr)
                .and_then(|href| resolve_link(href, base_url))
            {
                if seen.insert(absolute_url.clone()) {
                    links.push(absolute_url);
                }
            }
        }
    }

    Ok(links)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}

/// Identifies the server software from response headers
///
/// Prefers `Server`, falls back to `X-Powered-By`, and returns an empty
/// string when neither is present.
pub fn detect_server(headers: &HeaderMap) -> String {
    headers
        .get(SERVER)
        .or_else(|| headers.get("x-powered-by"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn links(html: &str) -> Vec<String> {
        extract_links(html.as_bytes(), &base_url()).unwrap()
    }

    #[test]
    fn test_extract_absolute_link() {
        let found = links(r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#);
        assert_eq!(found, vec!["https://other.com/page".to_string()]);
    }

    #[test]
    fn test_extract_relative_path_link() {
        let found = links(r#"<html><body><a href="other">Link</a></body></html>"#);
        assert_eq!(found, vec!["https://example.com/other".to_string()]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let found = links(
            r##"<html><body>
                <a href="javascript:void(0)">js</a>
                <a href="MAILTO:test@example.com">mail</a>
                <a href="tel:+1234567890">call</a>
                <a href="data:text/html,<h1>x</h1>">data</a>
                <a href="#section">jump</a>
                <a href="ftp://files.example.com/">ftp</a>
            </body></html>"##,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_extracts_all_link_sources() {
        let found = links(
            r#"<html><head>
                <link rel="canonical" href="https://example.com/canonical">
                <script src="https://cdn.one.com/app"></script>
            </head><body>
                <img src="https://img.two.com/logo">
                <form action="https://forms.three.com/submit"><button formaction="/alt">Go</button></form>
            </body></html>"#,
        );
        assert_eq!(
            found,
            vec![
                "https://example.com/canonical".to_string(),
                "https://cdn.one.com/app".to_string(),
                "https://img.two.com/logo".to_string(),
                "https://forms.three.com/submit".to_string(),
                "https://example.com/alt".to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicates_collapsed() {
        let found = links(
            r#"<html><body>
                <a href="/a">1</a><a href="/a">2</a><a href="https://example.com/a">3</a>
            </body></html>"#,
        );
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_binary_body_is_parse_error() {
        let body = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
        assert!(matches!(
            extract_links(body, &base_url()),
            Err(ParseError::Binary)
        ));
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut body = b"<html><body>\xff\xfe<a href=\"/ok\">x</a>".to_vec();
        body.extend_from_slice(b"</body></html>");
        let found = extract_links(&body, &base_url()).unwrap();
        assert_eq!(found, vec!["https://example.com/ok".to_string()]);
    }

    #[test]
    fn test_is_html() {
        assert!(is_html(Some("text/html; charset=utf-8")));
        assert!(is_html(Some("application/xhtml+xml")));
        assert!(is_html(None));
        assert!(!is_html(Some("application/json")));
        assert!(!is_html(Some("image/png")));
    }

    #[test]
    fn test_detect_server() {
        let mut headers = HeaderMap::new();
        assert_eq!(detect_server(&headers), "");

        headers.insert("x-powered-by", HeaderValue::from_static("PHP/8.2"));
        assert_eq!(detect_server(&headers), "PHP/8.2");

        headers.insert(SERVER, HeaderValue::from_static("nginx"));
        assert_eq!(detect_server(&headers), "nginx");
    }
}

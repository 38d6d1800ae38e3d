//! Pull release anchors out of the calendar page.
//!
//! The page is matched structurally: every `<a>` whose class list contains
//! [`RELEASE_ANCHOR_CLASS`] is one release, in document order.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Class carried by each title link on the calendar page.
pub const RELEASE_ANCHOR_CLASS: &str = "ipc-metadata-list-summary-item__t";

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("anchor regex"));

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("attribute regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));

static NUMERIC_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:[xX]([0-9A-Fa-f]+)|([0-9]+));").expect("entity regex"));

/// One upcoming release: link text and absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub title: String,
    pub url: String,
}

fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    ATTR_RE.captures_iter(attrs).find_map(|c| {
        let key = c.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        c.get(2)
            .or_else(|| c.get(3))
            .or_else(|| c.get(4))
            .map(|m| m.as_str())
    })
}

/// Decode the handful of entities that appear in titles and hrefs.
pub fn decode_entities(s: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |c: &regex::Captures<'_>| {
        let code = match (c.get(1), c.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| c[0].to_string())
    });
    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

/// First non-blank text node inside the anchor's inner HTML.
fn first_text(inner: &str) -> String {
    TAG_RE
        .split(inner)
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(decode_entities)
        .unwrap_or_default()
}

/// Extract up to `limit` release anchors, resolving each href against `base`.
/// Anchors without a usable href are skipped and do not count toward `limit`.
pub fn extract_releases(html: &str, base: &Url, limit: usize) -> Vec<ReleaseEntry> {
    let mut out = Vec::new();
    for cap in ANCHOR_RE.captures_iter(html) {
        if out.len() >= limit {
            break;
        }
        let attrs = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let is_release = attribute(attrs, "class")
            .map(|c| c.split_whitespace().any(|cls| cls == RELEASE_ANCHOR_CLASS))
            .unwrap_or(false);
        if !is_release {
            continue;
        }
        let Some(href) = attribute(attrs, "href") else {
            continue;
        };
        let url = match base.join(decode_entities(href).trim()) {
            Ok(u) => u,
            Err(e) => {
                log::debug!("releases: skipping anchor with bad href {:?}: {}", href, e);
                continue;
            }
        };
        let inner = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        out.push(ReleaseEntry {
            title: first_text(inner),
            url: url.to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.imdb.com/calendar/?ref_=rlm&region=US&type=MOVIE").unwrap()
    }

    fn page(n: usize) -> String {
        let mut html = String::from("<html><body><ul>");
        for i in 0..n {
            html.push_str(&format!(
                r#"<li><a class="ipc-metadata-list-summary-item__t" href="/title/tt{:07}/?ref_=rlm">Movie {}</a></li>"#,
                i, i
            ));
        }
        html.push_str("</ul></body></html>");
        html
    }

    #[test]
    fn takes_at_most_limit_in_order() {
        for (n, expected) in [(0, 0), (1, 1), (10, 10), (15, 10)] {
            let entries = extract_releases(&page(n), &base(), 10);
            assert_eq!(entries.len(), expected, "n = {}", n);
            for (i, e) in entries.iter().enumerate() {
                assert_eq!(e.title, format!("Movie {}", i));
            }
        }
    }

    #[test]
    fn relative_href_is_resolved_against_request_url() {
        let entries = extract_releases(&page(1), &base(), 10);
        assert_eq!(entries[0].url, "https://www.imdb.com/title/tt0000000/?ref_=rlm");
    }

    #[test]
    fn absolute_href_is_kept() {
        let html = r#"<a href="https://example.com/x" class="foo ipc-metadata-list-summary-item__t bar">X</a>"#;
        let entries = extract_releases(html, &base(), 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/x");
    }

    #[test]
    fn other_anchors_are_ignored() {
        let html = r#"
            <a href="/a" class="nav">Nav</a>
            <a href="/b" class="ipc-metadata-list-summary-item__tc">Near miss</a>
            <a class="ipc-metadata-list-summary-item__t">No href</a>
            <a class='ipc-metadata-list-summary-item__t' href='/c'>Kept</a>
        "#;
        let entries = extract_releases(html, &base(), 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Kept");
        assert_eq!(entries[0].url, "https://www.imdb.com/c");
    }

    #[test]
    fn anchors_without_href_do_not_use_a_slot() {
        let mut html = String::from(r#"<a class="ipc-metadata-list-summary-item__t">Gone</a>"#);
        html.push_str(&page(2));
        let entries = extract_releases(&html, &base(), 2);
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Movie 0", "Movie 1"]);
    }

    #[test]
    fn title_is_first_text_node_decoded() {
        let html = r#"<a class="ipc-metadata-list-summary-item__t" href="/t?a=1&amp;b=2">
            <span>Tom &amp; Jerry&#39;s</span><span>(2024)</span></a>"#;
        let entries = extract_releases(html, &base(), 10);
        assert_eq!(entries[0].title, "Tom & Jerry's");
        assert_eq!(entries[0].url, "https://www.imdb.com/t?a=1&b=2");
    }

    #[test]
    fn decodes_hex_and_named_entities() {
        assert_eq!(decode_entities("&#x41;&lt;&gt;&quot;"), "A<>\"");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }
}

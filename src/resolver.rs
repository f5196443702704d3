//! Musl runtime asset resolution.
//!
//! The vendor's home page links the architecture-specific musl runtime
//! shared library, but the URL is not predictable. We scan the page's
//! anchors for the first one whose link (href plus visible text) mentions
//! both "runtime" and the architecture needle, resolve it against the page
//! base, and verify it answers a metadata request.
//!
//! The page format is not under our control, so the match is a deliberately
//! loose substring heuristic rather than structured parsing. When the page
//! lists several runtime assets for one architecture, the first in document
//! order wins; the scan does not disambiguate further.

use anyhow::{Context, Result};
use regex::Regex;
use url::Url;

use crate::error::ReleaseError;
use crate::http;

/// Substring every runtime-library link is expected to contain.
const RUNTIME_NEEDLE: &str = "runtime";

/// An anchor element extracted from the page, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Raw href attribute value (entities not yet decoded).
    pub href: String,
    /// Raw inner markup between the opening and closing tags.
    pub text: String,
}

/// Extract all `<a href="...">...</a>` elements in document order.
pub fn extract_anchors(html: &str) -> Result<Vec<Anchor>> {
    let pattern = Regex::new(r#"(?is)<a\s+[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .context("failed to compile anchor pattern")?;

    Ok(pattern
        .captures_iter(html)
        .map(|captures| Anchor {
            href: captures[1].to_string(),
            text: captures[2].to_string(),
        })
        .collect())
}

/// Replace markup tags with spaces.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Decode the common named HTML entities plus numeric character references.
///
/// Unknown entities are kept literally; the downstream substring match only
/// needs the forms that actually occur in hrefs and link text.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        // An entity ends with ';' within a short window; anything else is a
        // bare ampersand.
        let Some(semi) = tail[..tail.len().min(12)].find(';') else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };

        let name = &tail[1..semi];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => decode_numeric_entity(name),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decode `#NN` / `#xHH` character-reference names.
fn decode_numeric_entity(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

/// Normalize anchor text: strip nested markup, decode entities, collapse
/// whitespace, lower-case.
pub fn normalize_text(input: &str) -> String {
    let stripped = strip_tags(input);
    let decoded = decode_entities(&stripped);
    decoded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Find the first anchor, in document order, whose decoded href plus
/// normalized text contains both "runtime" and the architecture needle.
///
/// Returns the decoded href of the match. Order is significant: the scan
/// must not sort or otherwise reorder the anchors.
pub fn find_runtime_asset(anchors: &[Anchor], needle_arch: &str) -> Option<String> {
    let needle = needle_arch.to_lowercase();

    for anchor in anchors {
        let href = decode_entities(&anchor.href);
        let haystack = format!("{} {}", href.to_lowercase(), normalize_text(&anchor.text));
        if haystack.contains(RUNTIME_NEEDLE) && haystack.contains(&needle) {
            return Some(href);
        }
    }
    None
}

/// Resolve the musl runtime library URL for an architecture by scraping the
/// vendor page and validating the result.
pub fn resolve_runtime_url(page_url: &str, needle_arch: &str) -> Result<String> {
    let html = http::fetch_text(page_url)
        .with_context(|| format!("failed to fetch vendor page {page_url}"))?;

    let anchors = extract_anchors(&html)?;
    let href = find_runtime_asset(&anchors, needle_arch).ok_or_else(|| {
        ReleaseError::AssetNotFound {
            needle: needle_arch.to_string(),
        }
    })?;

    let base = Url::parse(page_url)
        .with_context(|| format!("vendor page URL {page_url} is not a valid base"))?;
    let resolved = base
        .join(&href)
        .with_context(|| format!("failed to resolve href '{href}' against {page_url}"))?;

    let status = http::head_status(resolved.as_str())?;
    if !(200..400).contains(&status) {
        return Err(ReleaseError::AssetUnreachable {
            url: resolved.into(),
            status,
        }
        .into());
    }

    Ok(resolved.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

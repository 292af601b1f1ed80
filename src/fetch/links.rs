// src/fetch/links.rs

use scraper::{Html, Selector};
use tracing::trace;
use url::Url;

/// Collect `<a href>` targets ending in `suffix` (case-insensitive), resolved
/// against `base`. Duplicates are dropped, first occurrence wins.
pub fn extract_links(html: &str, base: &Url, suffix: &str) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("selector should parse");
    let suffix = suffix.to_ascii_lowercase();

    let mut out: Vec<Url> = Vec::new();
    for href in document
        .select(&selector)
        .filter_map(|elem| elem.value().attr("href"))
    {
        if !href.trim().to_ascii_lowercase().ends_with(&suffix) {
            continue;
        }
        if let Ok(full) = base.join(href.trim()) {
            if !out.contains(&full) {
                trace!(url = %full, "found link");
                out.push(full);
            }
        }
    }
    out
}

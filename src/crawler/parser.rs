//! HTML extraction for navigation and container pages
//!
//! This module is the boundary to the selector engine. Documents are parsed
//! and dropped inside each function, so callers only ever hold owned strings
//! (the parsed DOM is not `Send` and must not live across an await).

use crate::site::ResourceSelector;
use scraper::{Html, Selector};

/// What a container page yielded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerPage {
    /// Trimmed text of the info-text selector, shared by every resource
    pub description: String,

    /// Number of elements the resource selector matched
    pub matched: usize,

    /// Values of the resource attribute, in document order
    pub resource_links: Vec<String>,
}

fn compile(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector '{selector}': {e:?}"))
}

/// Returns the `href` of every element matching `selector`, in document order
///
/// Elements without an `href`, and hrefs that cannot lead to another page
/// (`javascript:`, `mailto:`, `tel:`, `data:`, fragment-only), are skipped.
///
/// # Example
///
/// ```
/// use site_harvester::crawler::extract_links;
///
/// let html = r#"<ul class="albums"><li><a href="/a/1">One</a></li><li><a>none</a></li></ul>"#;
/// let links = extract_links(html, "ul.albums a").unwrap();
/// assert_eq!(links, vec!["/a/1"]);
/// ```
pub fn extract_links(html: &str, selector: &str) -> Result<Vec<String>, String> {
    let selector = compile(selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| is_followable(href))
        .map(str::to_string)
        .collect())
}

/// Extracts the resources and description of a container page
pub fn extract_container(
    html: &str,
    resources: &ResourceSelector,
    info_text: Option<&str>,
) -> Result<ContainerPage, String> {
    let selector = compile(&resources.selector)?;
    let info_selector = info_text.map(compile).transpose()?;
    let document = Html::parse_document(html);

    let description = info_selector
        .map(|info| {
            document
                .select(&info)
                .flat_map(|element| element.text())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .unwrap_or_default();

    let mut matched = 0;
    let mut resource_links = Vec::new();
    for element in document.select(&selector) {
        matched += 1;
        if let Some(value) = element.value().attr(&resources.attribute) {
            let value = value.trim();
            if !value.is_empty() && !value.starts_with("data:") {
                resource_links.push(value.to_string());
            }
        }
    }

    Ok(ContainerPage {
        description,
        matched,
        resource_links,
    })
}

fn is_followable(href: &str) -> bool {
    !(href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:"))
}

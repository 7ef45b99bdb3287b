//! URL handling module for Site-Harvester
//!
//! This module provides link resolution against a page URL, URL
//! normalization, and the page-token arithmetic used to synthesize
//! pagination siblings.

mod pagination;
mod resolve;

// Re-export main functions
pub use pagination::{locate_page_token, sibling_hrefs, PagePattern};
pub use resolve::{normalize_url, resolve};

use url::Url;

/// Derives a file extension from the trailing path segment of `url`
///
/// The suffix after the last `.` of the final segment is used when it is
/// 1 to 8 ASCII alphanumeric characters; otherwise `default_suffix` is used,
/// and `bin` when that is empty too. The result is lowercase.
///
/// # Examples
///
/// ```
/// use site_harvester::url::extension_for;
/// use url::Url;
///
/// let url = Url::parse("http://img.example.com/2015/0505/a_145.JPG?683x1024").unwrap();
/// assert_eq!(extension_for(&url, "png"), "jpg");
/// ```
pub fn extension_for(url: &Url, default_suffix: &str) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, suffix)| suffix)
        .filter(|suffix| {
            !suffix.is_empty() && suffix.len() <= 8 && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
        });

    match from_path {
        Some(suffix) => suffix.to_ascii_lowercase(),
        None if !default_suffix.is_empty() => default_suffix.to_ascii_lowercase(),
        None => "bin".to_string(),
    }
}

use crate::{ConfigError, PaginationError};
use regex::Regex;
use std::fmt;

/// A compiled turn-page pattern
///
/// The pattern must contain exactly one capturing group; that group marks the
/// digits of the page index inside a matched href, e.g. `vpageId=(\d+)`.
#[derive(Clone)]
pub struct PagePattern {
    regex: Regex,
}

impl PagePattern {
    /// Compiles and checks a turn-page pattern
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] when the regex does not compile
    /// or does not have exactly one capturing group.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        // captures_len counts the implicit whole-match group
        let groups = regex.captures_len().saturating_sub(1);
        if groups != 1 {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: format!("expected exactly one capturing group, found {groups}"),
            });
        }

        Ok(Self { regex })
    }

    /// The pattern source text
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for PagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PagePattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for PagePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Locates the page-index digits inside `href`
///
/// Returns the byte offsets `(left, right)` of the captured digit run, so that
/// `href[..left]` and `href[right..]` can be kept verbatim while a different
/// page number is spliced in between.
///
/// # Errors
///
/// Returns [`PaginationError::NoPageToken`] when the pattern does not match,
/// or when what it captured is not a non-empty run of ASCII digits.
///
/// # Examples
///
/// ```
/// use site_harvester::url::{locate_page_token, PagePattern};
///
/// let pattern = PagePattern::new(r"vpageId=(\d+)").unwrap();
/// let href = "/p/65286/26498?vpageId=2abc";
/// let (left, right) = locate_page_token(href, &pattern).unwrap();
/// assert_eq!(&href[left..right], "2");
/// ```
pub fn locate_page_token(href: &str, pattern: &PagePattern) -> Result<(usize, usize), PaginationError> {
    let no_token = || PaginationError::NoPageToken {
        href: href.to_string(),
        pattern: pattern.as_str().to_string(),
    };

    let token = pattern
        .regex
        .captures(href)
        .and_then(|caps| caps.get(1))
        .ok_or_else(no_token)?;

    let digits = token.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(no_token());
    }

    Ok((token.start(), token.end()))
}

/// Builds the sibling hrefs `href[..left] + i + href[right..]` for `i` in `1..=count`
pub fn sibling_hrefs(href: &str, span: (usize, usize), count: u32) -> Vec<String> {
    let (left, right) = span;
    let (Some(prefix), Some(suffix)) = (href.get(..left), href.get(right..)) else {
        return Vec::new();
    };

    (1..=count)
        .map(|page| format!("{prefix}{page}{suffix}"))
        .collect()
}

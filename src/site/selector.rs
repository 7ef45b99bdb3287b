use crate::ConfigError;
use scraper::Selector;
use std::fmt;

/// A container's resource selector, written `selector[attribute][defaultSuffix]`
///
/// The trailing bracket groups are bare words: the first names the element
/// attribute that holds the resource URL, the optional second one is the file
/// extension used when the URL itself carries none. Bracket groups that are
/// part of the CSS (`a[href$=jpg]`) stay with the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSelector {
    pub selector: String,
    pub attribute: String,
    pub default_suffix: String,
}

impl ResourceSelector {
    /// Parses a compound resource selector
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSelector`] when there is no attribute
    /// group, the remaining CSS is empty, or the CSS does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use site_harvester::site::ResourceSelector;
    ///
    /// let parsed = ResourceSelector::parse("div.pic img[data-src][jpg]").unwrap();
    /// assert_eq!(parsed.selector, "div.pic img");
    /// assert_eq!(parsed.attribute, "data-src");
    /// assert_eq!(parsed.default_suffix, "jpg");
    /// ```
    pub fn parse(compound: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSelector {
            selector: compound.to_string(),
            reason: reason.to_string(),
        };

        let compound = compound.trim();
        let (rest, last) = split_trailing_group(compound)
            .ok_or_else(|| invalid("expected selector[attribute][defaultSuffix]"))?;

        let (selector, attribute, default_suffix) = match split_trailing_group(rest) {
            Some((selector, attribute)) if !attribute.is_empty() => (selector, attribute, last),
            _ => (rest, last, ""),
        };

        if attribute.is_empty() {
            return Err(invalid("attribute group is empty"));
        }

        let selector = selector.trim();
        if selector.is_empty() {
            return Err(invalid("CSS selector part is empty"));
        }
        check_css(selector)?;

        Ok(Self {
            selector: selector.to_string(),
            attribute: attribute.to_string(),
            default_suffix: default_suffix.to_string(),
        })
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.selector, self.attribute)?;
        if !self.default_suffix.is_empty() {
            write!(f, "[{}]", self.default_suffix)?;
        }
        Ok(())
    }
}

/// Splits `text` into `(before, word)` when it ends in `[word]` and word is bare
fn split_trailing_group(text: &str) -> Option<(&str, &str)> {
    let inner_end = text.strip_suffix(']')?;
    let open = inner_end.rfind('[')?;
    let word = &inner_end[open + 1..];

    let bare = word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
    bare.then(|| (&inner_end[..open], word))
}

/// Checks that `selector` is a CSS selector the extraction engine accepts
pub fn check_css(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            reason: format!("{e:?}"),
        })
}

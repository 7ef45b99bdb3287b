use crate::site::selector::{check_css, ResourceSelector};
use crate::url::{normalize_url, PagePattern};
use crate::{ConfigError, UrlError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// One level of a site description
///
/// A node is either a navigation node, whose selector yields links to follow
/// and which carries the template for the next level, or a container node,
/// whose selector yields resources to download. The two shapes are separate
/// [`NodeKind`] variants, so a container can never carry a child template.
///
/// Nodes deserialize from (and serialize to) the flat [`RawSiteNode`] record,
/// validating the shape on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSiteNode", into = "RawSiteNode")]
pub struct SiteNode {
    /// Page this node targets; unset on templates until instantiated
    pub url: Option<Url>,
    pub kind: NodeKind,
}

/// The two shapes a [`SiteNode`] can take
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Navigation(Navigation),
    Container(Container),
}

/// An intermediate node: follows links to instances of `child`
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// CSS selector for the link elements (their `href` is followed)
    pub child_selector: String,
    /// Template for the next level, cloned for every followed link
    pub child: Arc<SiteNode>,
    pub pagination: Option<SiblingPagination>,
}

/// Sibling-page synthesis for a navigation node
///
/// The first matched href is searched for `turn_page`; the captured digits
/// are replaced with `1..=sibling_num` to produce one child per page.
#[derive(Debug, Clone, PartialEq)]
pub struct SiblingPagination {
    pub turn_page: PagePattern,
    pub sibling_num: u32,
}

/// A terminal node: downloads the resources its selector matches
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub resources: ResourceSelector,
    /// Selector whose text describes every resource found on the page
    pub info_text: Option<String>,
    pub paging: Option<IncrementPaging>,
}

/// Forward-increment paging for a container node
///
/// The next page is `{first_page}{turn_page}{container_id + 1}`. This paging
/// has no natural end: it stops when a page fails to fetch, when a page
/// matches no resource elements, or when `max_pages` pages have been visited.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementPaging {
    pub turn_page: String,
    pub container_id: u32,
    pub max_pages: Option<u32>,
    /// URL of the page paging started from; set on the first expansion
    pub first_page: Option<Url>,
    /// Pages of this chain expanded before the current one
    pub pages_seen: u32,
}

impl SiteNode {
    /// Creates a navigation node following `child_selector` links to `child`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the selector is not valid CSS or when the
    /// child template already has a URL.
    pub fn navigation(child_selector: &str, child: SiteNode) -> Result<Self, ConfigError> {
        check_css(child_selector)?;
        if child.url.is_some() {
            return Err(ConfigError::InvalidNode(
                "child templates get their url from the parent page".to_string(),
            ));
        }

        Ok(Self {
            url: None,
            kind: NodeKind::Navigation(Navigation {
                child_selector: child_selector.to_string(),
                child: Arc::new(child),
                pagination: None,
            }),
        })
    }

    /// Creates a container node from a `selector[attribute][defaultSuffix]` expression
    pub fn container(resource_selector: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            url: None,
            kind: NodeKind::Container(Container {
                resources: ResourceSelector::parse(resource_selector)?,
                info_text: None,
                paging: None,
            }),
        })
    }

    /// Sets the target URL of a root node
    pub fn with_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let parsed = normalize_url(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("'{url}': {e}")))?;
        self.url = Some(parsed);
        Ok(self)
    }

    /// Attaches an info-text selector to a container node
    pub fn with_info_text(mut self, selector: &str) -> Result<Self, ConfigError> {
        check_css(selector)?;
        match &mut self.kind {
            NodeKind::Container(container) => {
                container.info_text = Some(selector.to_string());
                Ok(self)
            }
            NodeKind::Navigation(_) => Err(ConfigError::InvalidNode(
                "info-text only applies to container nodes".to_string(),
            )),
        }
    }

    /// Enables sibling pagination on a navigation node
    pub fn with_pagination(mut self, turn_page: &str, sibling_num: u32) -> Result<Self, ConfigError> {
        let turn_page = PagePattern::new(turn_page)?;
        if sibling_num == 0 {
            return Err(ConfigError::Validation(
                "sibling-num must be at least 1 when turn-page is set".to_string(),
            ));
        }

        match &mut self.kind {
            NodeKind::Navigation(nav) => {
                nav.pagination = Some(SiblingPagination {
                    turn_page,
                    sibling_num,
                });
                Ok(self)
            }
            NodeKind::Container(_) => Err(ConfigError::InvalidNode(
                "regex turn-page pagination only applies to navigation nodes".to_string(),
            )),
        }
    }

    /// Enables forward-increment paging on a container node
    pub fn with_increment_paging(
        mut self,
        turn_page: &str,
        container_id: u32,
        max_pages: Option<u32>,
    ) -> Result<Self, ConfigError> {
        if max_pages == Some(0) {
            return Err(ConfigError::Validation("max-pages must be at least 1".to_string()));
        }

        match &mut self.kind {
            NodeKind::Container(container) => {
                container.paging = Some(IncrementPaging {
                    turn_page: turn_page.to_string(),
                    container_id,
                    max_pages,
                    first_page: None,
                    pages_seen: 0,
                });
                Ok(self)
            }
            NodeKind::Navigation(_) => Err(ConfigError::InvalidNode(
                "increment paging only applies to container nodes".to_string(),
            )),
        }
    }

    /// Returns true if this node downloads resources rather than navigating
    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container(_))
    }

    /// The raw child selector text (a compound expression for containers)
    pub fn child_selector(&self) -> String {
        match &self.kind {
            NodeKind::Navigation(nav) => nav.child_selector.clone(),
            NodeKind::Container(container) => container.resources.to_string(),
        }
    }

    /// Creates a fresh instance of this node's child template bound to `url`
    ///
    /// Returns `None` for container nodes. Each call yields an independent
    /// value; instances never share state with each other or the template.
    pub fn instantiate_child(&self, url: Url) -> Option<SiteNode> {
        match &self.kind {
            NodeKind::Navigation(nav) => {
                let mut child = SiteNode::clone(&nav.child);
                child.url = Some(url);
                Some(child)
            }
            NodeKind::Container(_) => None,
        }
    }

    /// Builds the page after `current` in an increment-paged container chain
    ///
    /// Returns `Ok(None)` when the node does not page, or when the chain has
    /// reached `max_pages`. The returned node remembers the chain's first page
    /// so every later URL is built from the same prefix.
    pub fn next_container_page(&self, current: &Url) -> Result<Option<SiteNode>, UrlError> {
        let NodeKind::Container(Container {
            paging: Some(paging),
            ..
        }) = &self.kind
        else {
            return Ok(None);
        };

        let seen = paging.pages_seen + 1;
        if paging.max_pages.is_some_and(|max| seen >= max) {
            return Ok(None);
        }
        let Some(next_id) = paging.container_id.checked_add(1) else {
            return Ok(None);
        };

        let first_page = paging.first_page.clone().unwrap_or_else(|| current.clone());
        let next_url = normalize_url(&format!("{first_page}{}{next_id}", paging.turn_page))?;

        let mut next = self.clone();
        next.url = Some(next_url);
        if let NodeKind::Container(Container {
            paging: Some(next_paging),
            ..
        }) = &mut next.kind
        {
            next_paging.container_id = next_id;
            next_paging.first_page = Some(first_page);
            next_paging.pages_seen = seen;
        }
        Ok(Some(next))
    }

    /// Renders the subtree as an indented outline, one node per line
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        let mut node = Some(self);
        let mut depth = 0;
        while let Some(current) = node {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&current.to_string());
            out.push('\n');
            node = match &current.kind {
                NodeKind::Navigation(nav) => Some(nav.child.as_ref()),
                NodeKind::Container(_) => None,
            };
            depth += 1;
        }
        out
    }
}

impl fmt::Display for SiteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.url.as_ref().map_or("<template>", Url::as_str);
        match &self.kind {
            NodeKind::Navigation(nav) => {
                write!(f, "navigation {url} follow '{}'", nav.child_selector)?;
                if let Some(pagination) = &nav.pagination {
                    write!(
                        f,
                        " pages '{}' x{}",
                        pagination.turn_page.as_str(),
                        pagination.sibling_num
                    )?;
                }
            }
            NodeKind::Container(container) => {
                write!(f, "container {url} collect '{}'", container.resources)?;
                if let Some(info) = &container.info_text {
                    write!(f, " info '{info}'")?;
                }
                if let Some(paging) = &container.paging {
                    write!(f, " page {}{}", paging.turn_page, paging.container_id)?;
                }
            }
        }
        Ok(())
    }
}

/// The flat, serializable form of a [`SiteNode`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawSiteNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub child_selector: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<RawSiteNode>>,

    #[serde(default)]
    pub is_container: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_page: Option<String>,

    #[serde(default)]
    pub sibling_num: u32,

    #[serde(default)]
    pub container_id: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

impl TryFrom<RawSiteNode> for SiteNode {
    type Error = ConfigError;

    fn try_from(raw: RawSiteNode) -> Result<Self, Self::Error> {
        let mut node = if raw.is_container {
            if raw.child.is_some() {
                return Err(ConfigError::InvalidNode(format!(
                    "container '{}' cannot have a child template",
                    raw.child_selector
                )));
            }
            if raw.sibling_num != 0 {
                return Err(ConfigError::InvalidNode(format!(
                    "container '{}': sibling-num only applies to navigation nodes",
                    raw.child_selector
                )));
            }

            let mut node = SiteNode::container(&raw.child_selector)?;
            if let Some(info) = &raw.info_text {
                node = node.with_info_text(info)?;
            }
            if let Some(turn_page) = &raw.turn_page {
                node = node.with_increment_paging(turn_page, raw.container_id, raw.max_pages)?;
            }
            node
        } else {
            let child = raw.child.ok_or_else(|| {
                ConfigError::InvalidNode(format!(
                    "navigation node '{}' requires a child template",
                    raw.child_selector
                ))
            })?;
            if raw.info_text.is_some() || raw.max_pages.is_some() || raw.container_id != 0 {
                return Err(ConfigError::InvalidNode(format!(
                    "navigation node '{}': info-text, container-id and max-pages only apply to containers",
                    raw.child_selector
                )));
            }

            let child = SiteNode::try_from(*child)?;
            let mut node = SiteNode::navigation(&raw.child_selector, child)?;
            if let Some(turn_page) = &raw.turn_page {
                node = node.with_pagination(turn_page, raw.sibling_num)?;
            }
            node
        };

        if let Some(url) = &raw.url {
            node = node.with_url(url)?;
        }
        Ok(node)
    }
}

impl From<SiteNode> for RawSiteNode {
    fn from(node: SiteNode) -> Self {
        let url = node.url.map(String::from);
        match node.kind {
            NodeKind::Navigation(nav) => {
                let (turn_page, sibling_num) = nav
                    .pagination
                    .map(|p| (Some(p.turn_page.as_str().to_string()), p.sibling_num))
                    .unwrap_or((None, 0));
                RawSiteNode {
                    url,
                    child_selector: nav.child_selector,
                    child: Some(Box::new(RawSiteNode::from(SiteNode::clone(&nav.child)))),
                    turn_page,
                    sibling_num,
                    ..RawSiteNode::default()
                }
            }
            NodeKind::Container(container) => {
                let (turn_page, container_id, max_pages) = container
                    .paging
                    .map(|p| (Some(p.turn_page), p.container_id, p.max_pages))
                    .unwrap_or((None, 0, None));
                RawSiteNode {
                    url,
                    child_selector: container.resources.to_string(),
                    is_container: true,
                    info_text: container.info_text,
                    turn_page,
                    container_id,
                    max_pages,
                    ..RawSiteNode::default()
                }
            }
        }
    }
}

/// A node whose URL has been resolved: the unit of work on the pending queue
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlTask {
    node: SiteNode,
    url: Url,
}

impl CrawlTask {
    /// Wraps a node that already targets a URL
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNode`] if the node has no URL.
    pub fn new(node: SiteNode) -> Result<Self, ConfigError> {
        let url = node
            .url
            .clone()
            .ok_or_else(|| ConfigError::InvalidNode(format!("node has no url: {node}")))?;
        Ok(Self { node, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn node(&self) -> &SiteNode {
        &self.node
    }
}

impl fmt::Display for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

//! Site descriptor model
//!
//! This module defines how an operator describes a site to crawl:
//!
//! - `SiteNode`: one level of the description, either navigation or container
//! - `ResourceSelector`: the `selector[attribute][defaultSuffix]` expression of a container
//! - `CrawlTask`: a node bound to a concrete URL, queued for a worker
//! - `ResourceInfo`: what is remembered about each downloaded resource

mod node;
mod resource;
mod selector;

// Re-export main types
pub use node::{
    Container, CrawlTask, IncrementPaging, Navigation, NodeKind, RawSiteNode, SiblingPagination,
    SiteNode,
};
pub use resource::{content_hash, ResourceInfo};
pub use selector::{check_css, ResourceSelector};

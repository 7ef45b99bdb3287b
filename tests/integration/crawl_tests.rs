//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end over real HTTP.

use site_harvester::config::{
    BackendKind, Config, CrawlerConfig, HistoryConfig, RetryConfig, UserAgentConfig,
};
use site_harvester::crawler::Coordinator;
use site_harvester::site::{ResourceInfo, SiteNode};
use site_harvester::storage::{HistoryBackend, JsonFileBackend};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SOURCE_ID: &str = "integration";

/// Creates a test configuration crawling `site` into `dir`
fn create_test_config(dir: &Path, site: SiteNode) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 4,
            queue_factor: 20,
            store_dir: dir.join("store").display().to_string(),
        },
        retry: RetryConfig {
            max_attempts: 3,
            delay_ms: 10, // Very short for testing
        },
        history: HistoryConfig {
            backend: BackendKind::Json,
            path: dir.join("history").display().to_string(),
            source_id: SOURCE_ID.to_string(),
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
        },
        sites: vec![site],
    }
}

fn saved_history(dir: &Path) -> HashMap<String, ResourceInfo> {
    JsonFileBackend::new(dir.join("history"))
        .load(SOURCE_ID)
        .expect("Failed to read history snapshot")
}

fn stored_files(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("store"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn image(bytes: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(bytes.to_vec())
        .insert_header("content-type", "image/jpeg")
}

/// index -> album pages -> images
fn gallery_tree(base_url: &str) -> SiteNode {
    let album = SiteNode::container("div.photos img[data-src][jpg]")
        .unwrap()
        .with_info_text("h1.title")
        .unwrap();
    SiteNode::navigation("ul.albums a", album)
        .unwrap()
        .with_url(&format!("{}/index.html", base_url))
        .unwrap()
}

async fn mount_gallery(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(html(
            r#"<html><body><ul class="albums">
                <li><a href="/albums/1">First</a></li>
                <li><a href="albums/2">Second</a></li>
            </ul></body></html>"#,
        ))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/albums/1"))
        .respond_with(html(
            r#"<html><body><h1 class="title"> Cats </h1><div class="photos">
                <img data-src="/img/cat-1.jpg">
                <img data-src="/img/cat-2">
            </div></body></html>"#,
        ))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/albums/2"))
        .respond_with(html(
            r#"<html><body><h1 class="title">Dogs</h1><div class="photos">
                <img data-src="/img/dog.png">
                <img data-src="/img/cat-1.jpg">
            </div></body></html>"#,
        ))
        .mount(mock_server)
        .await;

    for (image_path, bytes) in [
        ("/img/cat-1.jpg", b"cat-1".as_slice()),
        ("/img/cat-2", b"cat-2".as_slice()),
        ("/img/dog.png", b"dog".as_slice()),
    ] {
        Mock::given(method("GET"))
            .and(path(image_path))
            .respond_with(image(bytes))
            .mount(mock_server)
            .await;
    }
}

#[tokio::test]
async fn test_full_crawl_navigation_to_container() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_gallery(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), gallery_tree(&base_url));

    let coordinator =
        Coordinator::new(config, CancellationToken::new()).expect("Failed to create coordinator");
    let stats = coordinator.run().await.expect("Crawl failed");

    assert_eq!(stats.tasks_processed, 3);
    assert_eq!(stats.pages_visited, 3);
    assert_eq!(stats.resources_downloaded, 3);
    assert_eq!(stats.resources_skipped + stats.resources_in_progress, 1);
    assert_eq!(stats.resources_failed, 0);
    assert!(!stats.cancelled);

    let history = saved_history(dir.path());
    assert_eq!(history.len(), 3);
    assert_eq!(stored_files(dir.path()), 3);

    let mut by_url: HashMap<String, ResourceInfo> = history
        .into_values()
        .map(|info| (info.source_url.clone(), info))
        .collect();

    let cat = by_url.remove(&format!("{}/img/cat-2", base_url)).unwrap();
    assert_eq!(cat.extension, "jpg");
    assert_eq!(cat.description, "Cats");
    let bytes = std::fs::read(dir.path().join("store").join(cat.file_name())).unwrap();
    assert_eq!(bytes, b"cat-2");

    let dog = by_url.remove(&format!("{}/img/dog.png", base_url)).unwrap();
    assert_eq!(dog.extension, "png");
    assert_eq!(dog.description, "Dogs");
}

#[tokio::test]
async fn test_dedup_across_restarts() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/album"))
        .respond_with(html(r#"<div class="photos"><img data-src="/img/only.jpg"></div>"#))
        .expect(2)
        .mount(&mock_server)
        .await;

    // Downloaded by the first run only
    Mock::given(method("GET"))
        .and(path("/img/only.jpg"))
        .respond_with(image(b"only"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let site = SiteNode::container("div.photos img[data-src][jpg]")
        .unwrap()
        .with_url(&format!("{}/album", base_url))
        .unwrap();

    let first = Coordinator::new(create_test_config(dir.path(), site.clone()), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.resources_downloaded, 1);

    let second = Coordinator::new(create_test_config(dir.path(), site), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(second.resources_downloaded, 0);
    assert_eq!(second.resources_skipped, 1);

    assert_eq!(saved_history(dir.path()).len(), 1);
    assert_eq!(stored_files(dir.path()), 1);
}

#[tokio::test]
async fn test_retry_then_success() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/album"))
        .respond_with(html(r#"<div class="photos"><img data-src="/img/flaky.jpg"></div>"#))
        .mount(&mock_server)
        .await;

    // Two failures, then the real image
    Mock::given(method("GET"))
        .and(path("/img/flaky.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/flaky.jpg"))
        .respond_with(image(b"finally"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let site = SiteNode::container("div.photos img[data-src][jpg]")
        .unwrap()
        .with_url(&format!("{}/album", base_url))
        .unwrap();

    let stats = Coordinator::new(create_test_config(dir.path(), site), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(stats.resources_downloaded, 1);
    assert_eq!(stats.resources_failed, 0);

    let history = saved_history(dir.path());
    assert_eq!(history.len(), 1);
    let info = history.values().next().unwrap();
    let bytes = std::fs::read(dir.path().join("store").join(info.file_name())).unwrap();
    assert_eq!(bytes, b"finally");
}

#[tokio::test]
async fn test_retries_exhausted_records_nothing() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/album"))
        .respond_with(html(r#"<div class="photos"><img data-src="/img/broken.jpg"></div>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/broken.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let site = SiteNode::container("div.photos img[data-src][jpg]")
        .unwrap()
        .with_url(&format!("{}/album", base_url))
        .unwrap();

    let stats = Coordinator::new(create_test_config(dir.path(), site), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(stats.resources_failed, 1);
    assert!(saved_history(dir.path()).is_empty());
    assert_eq!(stored_files(dir.path()), 0);
}

#[tokio::test]
async fn test_pagination_siblings() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // The listing only links to page 2; pages 1 and 3 are synthesized
    Mock::given(method("GET"))
        .and(path("/hot"))
        .respond_with(html(
            r#"<div class="pager"><a href="/list?page=2">2</a><a href="/list?page=99">last</a></div>"#,
        ))
        .mount(&mock_server)
        .await;

    for page in 1..=3 {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", page.to_string()))
            .respond_with(html(&format!(
                r#"<div class="photos"><img data-src="/img/p{page}.jpg"></div>"#
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/img/p{page}.jpg")))
            .respond_with(image(b"page image"))
            .mount(&mock_server)
            .await;
    }

    let page = SiteNode::container("div.photos img[data-src][jpg]").unwrap();
    let site = SiteNode::navigation("div.pager a", page)
        .unwrap()
        .with_pagination(r"page=(\d+)", 3)
        .unwrap()
        .with_url(&format!("{}/hot", base_url))
        .unwrap();

    let dir = TempDir::new().unwrap();
    let stats = Coordinator::new(create_test_config(dir.path(), site), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(stats.tasks_processed, 4);
    assert_eq!(stats.resources_downloaded, 3);
    assert_eq!(saved_history(dir.path()).len(), 3);
}

#[tokio::test]
async fn test_increment_paging_stops_at_empty_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    for page in 2..=3 {
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(query_param("page", page.to_string()))
            .respond_with(html(&format!(r#"<img class="item" src="/img/f{page}.jpg">"#)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(query_param("page", "4"))
        .respond_with(html("<p>the end</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(query_param("page", "5"))
        .respond_with(html(r#"<img class="item" src="/img/never.jpg">"#))
        .expect(0)
        .mount(&mock_server)
        .await;

    // First page: mounted last so the page-specific mocks above win
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(html(r#"<img class="item" src="/img/f1.jpg">"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/img/f\d\.jpg$"))
        .respond_with(image(b"feed image"))
        .mount(&mock_server)
        .await;

    let site = SiteNode::container("img.item[src][jpg]")
        .unwrap()
        .with_increment_paging("&page=", 1, None)
        .unwrap()
        .with_url(&format!("{}/feed?from=top", base_url))
        .unwrap();

    let dir = TempDir::new().unwrap();
    let stats = Coordinator::new(create_test_config(dir.path(), site), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(stats.pages_visited, 4);
    assert_eq!(stats.pages_failed, 0);
    assert_eq!(stats.resources_downloaded, 3);
}

#[tokio::test]
async fn test_gbk_page_description() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // <h1>美食</h1><img src="/img/food.jpg"> encoded as GBK
    let mut body = b"<html><body><h1>".to_vec();
    body.extend_from_slice(&[0xC3, 0xC0, 0xCA, 0xB3]);
    body.extend_from_slice(br#"</h1><img src="/img/food.jpg"></body></html>"#);

    Mock::given(method("GET"))
        .and(path("/food"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .insert_header("content-type", "text/html; charset=GBK"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/food.jpg"))
        .respond_with(image(b"noodles"))
        .mount(&mock_server)
        .await;

    let site = SiteNode::container("img[src][jpg]")
        .unwrap()
        .with_info_text("h1")
        .unwrap()
        .with_url(&format!("{}/food", base_url))
        .unwrap();

    let dir = TempDir::new().unwrap();
    Coordinator::new(create_test_config(dir.path(), site), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    let history = saved_history(dir.path());
    let info = history.values().next().unwrap();
    assert_eq!(info.description, "美食");
}

#[tokio::test]
async fn test_cancelled_crawl_flushes_history() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_gallery(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), gallery_tree(&base_url));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = Coordinator::new(config, cancel).unwrap().run().await.unwrap();

    assert!(stats.cancelled);
    assert_eq!(stats.resources_downloaded, 0);
    assert!(dir
        .path()
        .join("history")
        .join(format!("{}.json", SOURCE_ID))
        .exists());
}

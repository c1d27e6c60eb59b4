//! Integration tests for the crawler
//!
//! These tests run whole runs against wiremock servers or a scripted
//! fetcher and check counters, persisted state and resumption.

use async_trait::async_trait;
use pricewatch::config::{parse_config, Config};
use pricewatch::crawler::{handlers, Coordinator, FetchError, FetchedPage, Fetcher, Label, Router};
use pricewatch::output::{ProductSink, SinkError};
use pricewatch::storage::{RunStatus, SqliteStorage, Storage};
use pricewatch::{CandidateProduct, PricewatchError, RunPhase};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHOP: &str = "https://shop.example.com";

/// Builds a test-mode configuration seeded at `{base}/leky`
fn create_test_config(base: &str, dir: &Path) -> Config {
    let toml = format!(
        r##"
[crawler]
max-concurrent-fetches = 1
max-request-retries = 1
retry-delay-ms = 1
request-timeout-secs = 5
checkpoint-interval = 2

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
summary-path = "{summary}"

[run]
name = "test-shop"
mode = "test"
root-url = "{base}/"
test-url = "{base}/leky"

[site]
category-links = "nav a"
subcategory-links = "#subs a"
breadcrumbs = ".crumbs li"

[site.pagination]
page-index = "ul.pages li"
page-url-template = "{{base}}/strana-{{n}}"

[site.product]
item = "div.item"
id = {{ selector = "h2", attr = "data-sku" }}
name = {{ selector = "h2" }}
price = {{ selector = ".price" }}
"##,
        base = base,
        db = dir.join("pricewatch.db").display(),
        summary = dir.join("summary.md").display(),
    );
    parse_config(&toml).expect("test config should be valid")
}

fn item(sku: u32, price: Option<&str>) -> String {
    let price = price
        .map(|p| format!(r#"<span class="price">{}</span>"#, p))
        .unwrap_or_default();
    format!(
        r#"<div class="item"><h2 data-sku="{sku}">Product {sku}</h2>{price}</div>"#,
        sku = sku,
        price = price
    )
}

fn page(body: &str) -> String {
    format!("<html><body>{}</body></html>", body)
}

/// The catalog every scenario crawls
///
/// `/leky` links two subcategories, one of them a filtered view. The
/// subcategory lists five items (one without a price) and a page index
/// ending in 4. Pages 2 and 3 repeat three of the items.
fn catalog() -> Vec<(&'static str, String)> {
    let mut subcategory = String::from(
        r#"<ul class="crumbs"><li>Léky</li><li>Bolest</li></ul>
           <ul class="pages"><li>1</li><li>2</li><li>3</li><li>4</li><li>»</li></ul>"#,
    );
    subcategory.push_str(&item(1, Some("59,90 Kč")));
    subcategory.push_str(&item(2, Some("129 Kč")));
    subcategory.push_str(&item(3, Some("1 299,00 Kč")));
    subcategory.push_str(&item(4, Some("15,50")));
    subcategory.push_str(&item(5, None));

    vec![
        (
            "/leky",
            page(
                r#"<div id="subs">
                    <a href="/leky/bolest">Bolest</a>
                    <a href="/leky?razeni=cena">Podle ceny</a>
                </div>"#,
            ),
        ),
        ("/leky/bolest", page(&subcategory)),
        (
            "/leky/bolest/strana-2",
            page(&format!("{}{}", item(1, Some("59,90 Kč")), item(2, Some("129 Kč")))),
        ),
        ("/leky/bolest/strana-3", page(&item(3, Some("1 299,00 Kč")))),
        ("/leky/bolest/strana-4", page("<p>Nothing here</p>")),
    ]
}

/// Serves pages from memory, optionally cancelling a token when one path is
/// fetched
struct ScriptedFetcher {
    pages: HashMap<String, String>,
    cancel_on: Option<(String, CancellationToken)>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new(pages: Vec<(&str, String)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(path, body)| (path.to_string(), body))
                .collect(),
            cancel_on: None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn cancelling_on(mut self, path: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((path.to_string(), token));
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.path().to_string());

        if let Some((path, token)) = &self.cancel_on {
            if url.path() == path {
                token.cancel();
            }
        }

        match self.pages.get(url.path()) {
            Some(body) => Ok(FetchedPage {
                url: url.clone(),
                status: 200,
                body: body.clone(),
            }),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}

/// Sink that rejects every batch
struct FailingSink;

impl ProductSink for FailingSink {
    fn record_products(
        &self,
        _run_id: i64,
        _products: &[CandidateProduct],
    ) -> Result<usize, SinkError> {
        Err(SinkError::Rejected("warehouse offline".to_string()))
    }
}

fn open_db(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(&dir.path().join("pricewatch.db")).expect("Failed to open database")
}

async fn mount_catalog(server: &MockServer) {
    for (page_path, body) in catalog() {
        Mock::given(method("GET"))
            .and(path(page_path))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "text/html; charset=utf-8"),
            )
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_category_crawl_end_to_end() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());

    let mut coordinator =
        Coordinator::new(config, "hash".to_string(), true).expect("Failed to create coordinator");
    let summary = coordinator.run().await.expect("Run should succeed");

    // One subcategory plus pages 2..=4
    assert_eq!(summary.pages, 4);
    assert_eq!(summary.items_found, 4);
    assert_eq!(summary.items_no_price, 1);
    assert_eq!(summary.items_duplicate, 3);
    assert_eq!(summary.requests, 5);
    assert_eq!(summary.urls_seen, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.ledger_size, 4);
    assert_eq!(summary.status, "completed");
    assert_eq!(summary.phase, "finalized");
    assert_eq!(coordinator.phase(), RunPhase::Finalized);

    // The filtered view was never requested
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.query().is_none()));
    assert_eq!(requests.len(), 5);

    let storage = open_db(&dir);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(storage.load_ledger(run.id).unwrap().len(), 4);

    let products = storage.load_products(run.id).unwrap();
    assert_eq!(products.len(), 4);
    let first = products
        .iter()
        .find(|p| p.item_id.as_deref() == Some("1"))
        .unwrap();
    assert_eq!(first.current_price, 59.9);
    assert_eq!(first.currency, "CZK");
    assert_eq!(first.category.as_deref(), Some("Léky > Bolest"));

    let markdown = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(markdown.contains("| Items found | 4 |"));
}

#[tokio::test]
async fn test_failed_request_does_not_block_draining() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/leky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(
            r#"<div id="subs">
                <a href="/leky/rozbite">Rozbité</a>
                <a href="/leky/bolest">Bolest</a>
            </div>"#,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/leky/rozbite"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/leky/bolest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&item(7, Some("10 Kč")))))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());

    let mut coordinator = Coordinator::new(config, "hash".to_string(), true).unwrap();
    let summary = coordinator.run().await.expect("Run should succeed");

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.requests, 2);
    assert_eq!(summary.items_found, 1);
    assert_eq!(summary.status, "completed");
    assert_eq!(summary.frontier_pending, 0);
    assert_eq!(coordinator.phase(), RunPhase::Finalized);

    // First attempt plus one retry, never re-enqueued
    let broken = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/leky/rozbite")
        .count();
    assert_eq!(broken, 2);
}

#[tokio::test]
async fn test_failed_pagination_page_keeps_other_pages() {
    let server = MockServer::start().await;

    for (page_path, body) in catalog() {
        let response = if page_path == "/leky/bolest/strana-3" {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_string(body)
        };
        Mock::given(method("GET"))
            .and(path(page_path))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());

    let mut coordinator = Coordinator::new(config, "hash".to_string(), true).unwrap();
    let summary = coordinator.run().await.expect("Run should succeed");

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pages, 4);
    assert_eq!(summary.requests, 4);
    assert_eq!(summary.items_found, 4);
    assert_eq!(summary.items_duplicate, 2);
    assert_eq!(summary.status, "completed");
    assert_eq!(summary.frontier_pending, 0);
    assert_eq!(coordinator.phase(), RunPhase::Finalized);

    let storage = open_db(&dir);
    assert_eq!(storage.count_products(summary.run_id).unwrap(), 4);
}

#[tokio::test]
async fn test_resume_does_not_recount_items() {
    let dir = TempDir::new().unwrap();

    // First run stops while page 3 is being fetched
    let first = Coordinator::new(create_test_config(SHOP, dir.path()), "hash".to_string(), true)
        .unwrap();
    let token = first.cancellation_token();
    let fetcher = Arc::new(
        ScriptedFetcher::new(catalog()).cancelling_on("/leky/bolest/strana-3", token),
    );
    let interrupted = first
        .with_fetcher(fetcher.clone())
        .run()
        .await
        .expect("Interrupted run still finalizes");

    assert_eq!(interrupted.status, "interrupted");
    assert_eq!(interrupted.requests, 4);
    assert_eq!(interrupted.items_found, 4);
    assert_eq!(interrupted.frontier_pending, 1);
    assert!(!fetcher.fetched().contains(&"/leky/bolest/strana-4".to_string()));

    // Second run picks up the same run and only fetches what is left
    let resumed_fetcher = Arc::new(ScriptedFetcher::new(catalog()));
    let mut second =
        Coordinator::new(create_test_config(SHOP, dir.path()), "hash".to_string(), false)
            .unwrap()
            .with_fetcher(resumed_fetcher.clone());
    let resumed = second.run().await.expect("Resumed run should succeed");

    assert_eq!(resumed.run_id, interrupted.run_id);
    assert_eq!(resumed.status, "completed");
    assert_eq!(resumed_fetcher.fetched(), vec!["/leky/bolest/strana-4"]);
    assert_eq!(resumed.requests, 5);
    assert_eq!(resumed.items_found, 4);
    assert_eq!(resumed.items_duplicate, 3);
    assert_eq!(resumed.pages, 4);
    assert_eq!(resumed.urls_seen, 5);

    let storage = open_db(&dir);
    assert_eq!(storage.count_products(resumed.run_id).unwrap(), 4);
}

#[tokio::test]
async fn test_deadline_interrupts_throttle_wait() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(SHOP, dir.path());
    config.crawler.max_requests_per_minute = Some(1);
    config.crawler.run_deadline_secs = Some(1);

    let fetcher = Arc::new(ScriptedFetcher::new(catalog()));
    let mut coordinator = Coordinator::new(config, "hash".to_string(), true)
        .unwrap()
        .with_fetcher(fetcher.clone());

    // The second request would wait a full minute for its throttle slot
    let summary = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("Run should stop at the deadline")
        .expect("Run should finalize");

    assert_eq!(summary.status, "interrupted");
    assert_eq!(summary.requests, 1);
    assert_eq!(summary.frontier_pending, 1);
    assert_eq!(fetcher.fetched(), vec!["/leky"]);
    assert_eq!(coordinator.phase(), RunPhase::Finalized);
}

#[tokio::test]
async fn test_fresh_flag_starts_a_new_run() {
    let dir = TempDir::new().unwrap();

    let mut first = Coordinator::new(create_test_config(SHOP, dir.path()), "hash".to_string(), true)
        .unwrap()
        .with_fetcher(Arc::new(ScriptedFetcher::new(catalog())));
    first.cancellation_token().cancel();
    let cancelled = first.run().await.unwrap();
    assert_eq!(cancelled.status, "interrupted");
    assert_eq!(cancelled.requests, 0);

    let mut second =
        Coordinator::new(create_test_config(SHOP, dir.path()), "hash".to_string(), true)
            .unwrap()
            .with_fetcher(Arc::new(ScriptedFetcher::new(catalog())));
    let fresh = second.run().await.unwrap();

    assert_ne!(fresh.run_id, cancelled.run_id);
    assert_eq!(fresh.items_found, 4);
    assert_eq!(fresh.status, "completed");
}

#[tokio::test]
async fn test_unroutable_label_fails_the_run() {
    let dir = TempDir::new().unwrap();

    let mut router = Router::new();
    router.register(Label::Category, handlers::handle_listing);

    let mut coordinator =
        Coordinator::new(create_test_config(SHOP, dir.path()), "hash".to_string(), true)
            .unwrap()
            .with_fetcher(Arc::new(ScriptedFetcher::new(catalog())))
            .with_router(router);

    let result = coordinator.run().await;
    assert!(matches!(
        result,
        Err(PricewatchError::UnroutableLabel(Label::Subcategory))
    ));
    assert_eq!(coordinator.phase(), RunPhase::Finalized);

    let storage = open_db(&dir);
    let run = storage.get_latest_run("test-shop").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_sink_failure_is_counted_and_run_continues() {
    let dir = TempDir::new().unwrap();

    let mut coordinator =
        Coordinator::new(create_test_config(SHOP, dir.path()), "hash".to_string(), true)
            .unwrap()
            .with_fetcher(Arc::new(ScriptedFetcher::new(catalog())))
            .with_sink(Arc::new(FailingSink));

    let summary = coordinator.run().await.unwrap();

    // One rejected batch per page that produced new products
    assert_eq!(summary.sink_failed, 1);
    assert_eq!(summary.items_found, 4);
    assert_eq!(summary.items_duplicate, 3);
    assert_eq!(summary.status, "completed");

    let storage = open_db(&dir);
    assert_eq!(storage.count_products(summary.run_id).unwrap(), 0);
}

#[tokio::test]
async fn test_full_mode_follows_categories_and_detail_pages() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(SHOP, dir.path());
    config.run.mode = pricewatch::config::RunMode::Full;
    config.site.product_links = Some("a.detail".to_string());

    let detail = |sku: &str, price: &str| {
        page(&format!(
            r#"<script type="application/ld+json">
            {{"@context": "https://schema.org", "@type": "Product", "sku": "{sku}",
              "name": "Product {sku}",
              "offers": {{"@type": "Offer", "price": "{price}", "priceCurrency": "EUR",
                          "availability": "https://schema.org/InStock"}}}}
            </script>"#,
            sku = sku,
            price = price
        ))
    };

    let pages = vec![
        ("/", page(r#"<nav><a href="/vitaminy">Vitamíny</a></nav>"#)),
        (
            "/vitaminy",
            page(
                r#"<a class="detail" href="/p/c-vitamin">C</a>
                   <a class="detail" href="/p/d-vitamin">D</a>
                   <a class="detail" href="/p/c-vitamin#reviews">C again</a>"#,
            ),
        ),
        ("/p/c-vitamin", detail("c-1", "99.00")),
        ("/p/d-vitamin", detail("d-1", "0")),
    ];

    let mut coordinator = Coordinator::new(config, "hash".to_string(), true)
        .unwrap()
        .with_fetcher(Arc::new(ScriptedFetcher::new(pages)));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.requests, 4);
    assert_eq!(summary.pages, 1);
    assert_eq!(summary.urls_seen, 4);
    assert_eq!(summary.items_found, 1);
    assert_eq!(summary.items_no_price, 1);

    let storage = open_db(&dir);
    let products = storage.load_products(summary.run_id).unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].item_id.as_deref(), Some("c-1"));
    assert_eq!(products[0].currency, "EUR");
    assert_eq!(products[0].in_stock, Some(true));
    assert_eq!(products[0].category.as_deref(), Some("Vitamíny"));
}

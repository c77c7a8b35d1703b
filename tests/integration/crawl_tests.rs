//! Integration tests for the crawler
//!
//! These tests serve sites from wiremock mock servers and drive them with a
//! minimal browser that loads pages over plain HTTP, so robots.txt, header
//! checks, link extraction and the audit outputs run end to end.

use access_sweep::browser::{
    BrowserFault, BrowserResult, Driver, DriverFactory, SpawnOptions, WindowSize,
};
use access_sweep::config::{load_config, Config};
use access_sweep::crawler::{run_workers, CrawlContext};
use access_sweep::output::{import_sites, CsvSinks};
use access_sweep::state::Analytics;
use access_sweep::url::{netloc, UrlFilter};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A browser that fetches pages with a plain HTTP GET and runs no scripts
struct HttpDriver {
    client: reqwest::blocking::Client,
    loaded: Arc<Mutex<Vec<String>>>,
    current: Option<(String, String)>,
    size: WindowSize,
}

impl Driver for HttpDriver {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let body = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.text())
            .map_err(|e| BrowserFault::Timeout(e.to_string()))?;
        self.loaded.lock().unwrap().push(url.to_string());
        self.current = Some((url.to_string(), body));
        Ok(())
    }

    fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self.current.as_ref().map(|(u, _)| u.clone()).unwrap_or_default())
    }

    fn page_source(&mut self) -> BrowserResult<String> {
        Ok(self.current.as_ref().map(|(_, b)| b.clone()).unwrap_or_default())
    }

    fn title(&mut self) -> BrowserResult<String> {
        let source = self.page_source()?;
        Ok(source
            .split_once("<title>")
            .and_then(|(_, rest)| rest.split_once("</title>"))
            .map(|(title, _)| title.to_string())
            .unwrap_or_default())
    }

    fn execute_script(&mut self, script: &str) -> BrowserResult<Value> {
        if script.contains("document.baseURI") {
            return self.current_url().map(Value::String);
        }
        Ok(Value::Null)
    }

    fn execute_async_script(&mut self, script: &str) -> BrowserResult<Value> {
        self.execute_script(script)
    }

    fn screenshot_png(&mut self) -> BrowserResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn window_size(&mut self) -> BrowserResult<WindowSize> {
        Ok(self.size)
    }

    fn set_window_size(&mut self, size: WindowSize) -> BrowserResult<()> {
        self.size = size;
        Ok(())
    }

    fn window_position(&mut self) -> BrowserResult<(i32, i32)> {
        Ok((0, 0))
    }

    fn set_window_position(&mut self, _position: (i32, i32)) -> BrowserResult<()> {
        Ok(())
    }

    fn refresh(&mut self) -> BrowserResult<()> {
        Ok(())
    }

    fn quit(&mut self) -> BrowserResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct HttpDriverFactory {
    loaded: Arc<Mutex<Vec<String>>>,
}

impl HttpDriverFactory {
    fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }
}

impl DriverFactory for HttpDriverFactory {
    fn spawn(&self, options: &SpawnOptions) -> BrowserResult<Box<dyn Driver>> {
        Ok(Box::new(HttpDriver {
            client: reqwest::blocking::Client::new(),
            loaded: Arc::clone(&self.loaded),
            current: None,
            size: options.size,
        }))
    }
}

/// Writes a config and a site list for `seeds` into `dir` and loads it
fn create_test_config(dir: &Path, seeds: &[String], max_links: usize, crawler: &str) -> Config {
    let sites_dir = dir.join("sites");
    fs::create_dir_all(&sites_dir).unwrap();
    let mut sites = String::from("organisation,url,sector\n");
    for (i, seed) in seeds.iter().enumerate() {
        sites.push_str(&format!("Org {},{},Central\n", i, seed));
    }
    fs::write(sites_dir.join("sites.csv"), sites).unwrap();

    let text = format!(
        r#"
[audit]
audit-name = "integration"
results-path = "{results}"
max-links-per-domain = {max_links}
thread-count = 1
base-urls-visit-path = "{sites}"

[browser]
family = "chrome"
user-agent = "AccessSweep/1.0"
user-agent-product-token = "AccessSweep"
script-timeout = 5
page-load-timeout = 5

[crawler]
{crawler}

[[viewport]]
name = "medium"
width = 1280
height = 800

[[plugin]]
name = "default"
"#,
        results = dir.join("results").display(),
        sites = sites_dir.display(),
    );
    let config_path = dir.join("config.toml");
    fs::write(&config_path, text).unwrap();
    load_config(&config_path).unwrap()
}

/// Imports the sites and crawls them with the HTTP driver
fn run_audit(config: Config, factory: &Arc<HttpDriverFactory>) -> Arc<Analytics> {
    let sites = import_sites(&config).unwrap();
    let config = Arc::new(config);
    let analytics = Arc::new(Analytics::new(config.audit.max_links_per_domain));
    for site in &sites {
        analytics.add_base_url(&site.url);
    }
    let netlocs: Vec<String> = sites
        .iter()
        .filter_map(|s| url::Url::parse(&s.url).ok())
        .filter_map(|u| netloc(&u))
        .collect();

    let ctx = CrawlContext::new(
        Arc::clone(&config),
        Arc::clone(&analytics),
        UrlFilter::standard(false, netlocs),
        Arc::new(CsvSinks::new(config.results_dir())),
    )
    .unwrap();

    let factory: Arc<dyn DriverFactory> = factory.clone();
    run_workers(&ctx, factory, sites).unwrap();
    analytics
}

fn read_results(config_dir: &Path, file: &str) -> String {
    let results = config_dir.join("results").join("integration");
    fs::read_to_string(results.join(file)).unwrap_or_default()
}

fn html_page(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(format!(
            "<html><head><title>Page</title></head><body>{}</body></html>",
            body
        ))
}

#[test]
fn test_cap_duplicate_and_foreign_links() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    let base = format!("{}/", server.uri());

    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html_page(format!(
                r#"<a href="/a">A</a>
                   <a href="/b">B</a>
                   <a href="https://other.gov/x">Other</a>
                   <a href="{}a">A again</a>"#,
                base
            )))
            .mount(&server),
    );
    for page in ["/a", "/b"] {
        rt.block_on(
            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(html_page(String::new()))
                .mount(&server),
        );
    }

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(
        dir.path(),
        &[base.clone()],
        3,
        "follow-robots-txt = false\nperform-header-check = false",
    );
    let factory = Arc::new(HttpDriverFactory::default());

    let analytics = run_audit(config, &factory);

    let mut loaded = factory.loaded();
    loaded.sort();
    assert_eq!(
        loaded,
        vec![base.clone(), format!("{}a", base), format!("{}b", base)]
    );
    assert_eq!(analytics.pages_scanned_for(&base), 3);

    let pages_scanned = read_results(dir.path(), "pages_scanned.csv");
    assert!(pages_scanned.contains(&format!("{},3,Central", base)));
    let default_rows = read_results(dir.path(), "default.csv");
    assert_eq!(default_rows.lines().count(), 4);
}

#[test]
fn test_robots_and_header_check_filter_pages() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    let base = format!("{}/", server.uri());

    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("User-agent: *\nDisallow: /private"),
            )
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html_page(
                r#"<a href="/ok">ok</a>
                   <a href="/private/page">private</a>
                   <a href="/gone">gone</a>
                   <a href="/download">download</a>
                   <a href="/old">old</a>"#
                    .to_string(),
            ))
            .mount(&server),
    );
    for page in ["/ok", "/new"] {
        rt.block_on(
            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(html_page(String::new()))
                .mount(&server),
        );
    }
    rt.block_on(
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404).insert_header("content-type", "text/html"))
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("HEAD"))
            .and(path("/download"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/zip"))
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("HEAD"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&server),
    );

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(
        dir.path(),
        &[base.clone()],
        10,
        "follow-robots-txt = true\nperform-header-check = true\nrecord-unexpected-response-codes = true",
    );
    let factory = Arc::new(HttpDriverFactory::default());

    let analytics = run_audit(config, &factory);

    let mut loaded = factory.loaded();
    loaded.sort();
    assert_eq!(
        loaded,
        vec![base.clone(), format!("{}new", base), format!("{}ok", base)]
    );
    assert_eq!(analytics.pages_scanned_for(&base), 3);

    let unexpected = read_results(dir.path(), "unexpected_response_codes.csv");
    assert!(unexpected.contains(&format!("{}gone,404", base)));
    assert!(unexpected.contains(&format!("{}download,-1", base)));
    assert!(!unexpected.contains("private"));

    let audit_log = read_results(dir.path(), "audit_log.csv");
    assert!(audit_log.contains(&format!("{}new", base)));
    assert!(!audit_log.contains(&format!("{}old", base)));
}

#[test]
fn test_two_sites_on_one_host_split_by_prefix() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    let root = format!("{}/", server.uri());
    let parks = format!("{}/parks/", server.uri());

    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html_page(
                r#"<a href="/about">about</a><a href="/parks/map">map</a>"#.to_string(),
            ))
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/parks/"))
            .respond_with(html_page(
                r#"<a href="/parks/map">map</a><a href="/about">about</a>"#.to_string(),
            ))
            .mount(&server),
    );
    for page in ["/about", "/parks/map"] {
        rt.block_on(
            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(html_page(String::new()))
                .mount(&server),
        );
    }

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(
        dir.path(),
        &[root.clone(), parks.clone()],
        10,
        "follow-robots-txt = false\nperform-header-check = false",
    );
    let factory = Arc::new(HttpDriverFactory::default());

    let analytics = run_audit(config, &factory);

    assert_eq!(analytics.pages_scanned_for(&root), 2);
    assert_eq!(analytics.pages_scanned_for(&parks), 2);
    assert!(analytics.is_url_in_pages_scanned(&parks, &format!("{}map", parks)));
    assert!(!analytics.is_url_in_pages_scanned(&root, &format!("{}map", parks)));
    assert_eq!(analytics.total_pages_scanned(), 4);
}

//! HTTP header pre-check
//!
//! Before a page is loaded in the browser, a cheap request checks that:
//! - the server answers with an acceptable status code
//! - the response is an HTML document
//! - the URL is resolved through any redirects to its final form
//!
//! Sites that answer HEAD badly are checked with GET instead; a 405 reply to
//! HEAD switches to GET on the fly.

use crate::output::{ResultSink, Row};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Status codes a page may answer with and still be audited
pub const OK_STATUS_CODES: &[i32] = &[200, 301, 302, 307, 308];

/// Status reported when no usable response was received
pub const NO_STATUS: i32 = -1;

pub const HEADER_CHECK_ATTEMPTS: usize = 3;

const HEADER_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_REDIRECTS: usize = 10;

/// Outcome of a header check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCheck {
    /// HTTP status, or [`NO_STATUS`] when the request failed or the response
    /// was not HTML
    pub status: i32,
    /// URL after redirects; the requested URL when the check failed
    pub final_url: String,
}

impl HeaderCheck {
    fn failed(url: &str) -> Self {
        Self {
            status: NO_STATUS,
            final_url: url.to_string(),
        }
    }

    pub fn is_acceptable(&self) -> bool {
        OK_STATUS_CODES.contains(&self.status)
    }
}

/// Issues header checks with a shared, redirect-following client
pub struct HeaderChecker {
    client: Client,
}

impl HeaderChecker {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(HEADER_TIMEOUT)
            .timeout(HEADER_TIMEOUT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// Checks `url`, using HEAD unless the site is known not to support it
    pub fn check(&self, url: &str, supports_head: bool) -> HeaderCheck {
        let mut method = if supports_head {
            Method::HEAD
        } else {
            tracing::info!(
                "{} is marked as not supporting HEAD requests, using GET to check headers",
                url
            );
            Method::GET
        };

        let mut last_response: Option<Response> = None;
        for attempt in 1..=HEADER_CHECK_ATTEMPTS {
            match self.client.request(method.clone(), url).send() {
                Ok(response)
                    if response.status() == StatusCode::METHOD_NOT_ALLOWED
                        && method == Method::HEAD =>
                {
                    tracing::warn!(
                        "{} does not support HEAD requests, retrying with GET (status code 405)",
                        url
                    );
                    method = Method::GET;
                    last_response = Some(response);
                }
                Ok(response) => {
                    tracing::info!("{} has status code {}", url, response.status().as_u16());
                    last_response = Some(response);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Failed to get headers; attempt: {}, {}: {}", attempt, url, e);
                    if attempt == HEADER_CHECK_ATTEMPTS {
                        tracing::error!("Giving up on headers check; attempt: {}, {}", attempt, url);
                        return HeaderCheck::failed(url);
                    }
                }
            }
        }

        let Some(response) = last_response else {
            return HeaderCheck::failed(url);
        };

        if !is_html_response(url, &response) {
            return HeaderCheck::failed(url);
        }

        HeaderCheck {
            status: i32::from(response.status().as_u16()),
            final_url: response.url().to_string(),
        }
    }
}

/// True when the response declares a `text/html` Content-Type
fn is_html_response(url: &str, response: &Response) -> bool {
    match response.headers().get(CONTENT_TYPE) {
        Some(value) => {
            let content_type = value.to_str().unwrap_or_default();
            if content_type.starts_with("text/html") {
                true
            } else {
                tracing::info!(
                    "URL filtered due to a non-text/html response {}: {}",
                    url,
                    content_type
                );
                false
            }
        }
        None => {
            tracing::error!("No Content-Type header on {}", url);
            false
        }
    }
}

/// Appends a rejected status code to `unexpected_response_codes.csv`
pub fn record_unexpected_status(
    sink: &dyn ResultSink,
    base_url: &str,
    parent_url: &str,
    url: &str,
    status: i32,
) {
    let row = Row::new()
        .with("base_url", base_url)
        .with("parent_url", parent_url)
        .with("url", url)
        .with("status_code", status);
    if let Err(e) = sink.append_rows("unexpected_response_codes.csv", &[row]) {
        tracing::error!("Could not record status code {} for {}: {}", status, url, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CsvSinks;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_checker() -> HeaderChecker {
        HeaderChecker::new("AccessSweep/1.0").unwrap()
    }

    fn html(status: u16) -> ResponseTemplate {
        ResponseTemplate::new(status).insert_header("content-type", "text/html; charset=utf-8")
    }

    #[test]
    fn test_ok_status_codes() {
        for status in [200, 301, 302, 307, 308] {
            let check = HeaderCheck {
                status,
                final_url: String::new(),
            };
            assert!(check.is_acceptable());
        }
        for status in [NO_STATUS, 204, 404, 500] {
            let check = HeaderCheck {
                status,
                final_url: String::new(),
            };
            assert!(!check.is_acceptable());
        }
    }

    #[test]
    fn test_head_html_page() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .and(path("/page"))
                .respond_with(html(200))
                .expect(1)
                .mount(&server),
        );

        let url = format!("{}/page", server.uri());
        let check = create_test_checker().check(&url, true);

        assert_eq!(check.status, 200);
        assert_eq!(check.final_url, url);
        rt.block_on(server.verify());
    }

    #[test]
    fn test_redirect_is_resolved() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .and(path("/old"))
                .respond_with(
                    ResponseTemplate::new(301).insert_header("location", "/new"),
                )
                .mount(&server),
        );
        rt.block_on(
            Mock::given(method("HEAD"))
                .and(path("/new"))
                .respond_with(html(200))
                .mount(&server),
        );

        let check = create_test_checker().check(&format!("{}/old", server.uri()), true);
        assert_eq!(check.status, 200);
        assert_eq!(check.final_url, format!("{}/new", server.uri()));
    }

    #[test]
    fn test_405_switches_to_get() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(405))
                .expect(1)
                .mount(&server),
        );
        rt.block_on(
            Mock::given(method("GET"))
                .respond_with(html(200))
                .expect(1)
                .mount(&server),
        );

        let check = create_test_checker().check(&format!("{}/page", server.uri()), true);
        assert_eq!(check.status, 200);
        rt.block_on(server.verify());
    }

    #[test]
    fn test_no_head_support_uses_get() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("GET"))
                .respond_with(html(200))
                .expect(1)
                .mount(&server),
        );

        let check = create_test_checker().check(&format!("{}/page", server.uri()), false);
        assert_eq!(check.status, 200);
        rt.block_on(server.verify());
    }

    #[test]
    fn test_non_html_is_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .respond_with(
                    ResponseTemplate::new(200).insert_header("content-type", "application/pdf"),
                )
                .mount(&server),
        );

        let url = format!("{}/report", server.uri());
        let check = create_test_checker().check(&url, true);
        assert_eq!(check, HeaderCheck::failed(&url));
    }

    #[test]
    fn test_not_found_keeps_status() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .respond_with(html(404))
                .mount(&server),
        );

        let check = create_test_checker().check(&format!("{}/missing", server.uri()), true);
        assert_eq!(check.status, 404);
        assert!(!check.is_acceptable());
    }

    #[test]
    fn test_connection_failure_gives_no_status() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("http://127.0.0.1:{}/page", port);
        let check = create_test_checker().check(&url, true);
        assert_eq!(check.status, NO_STATUS);
        assert_eq!(check.final_url, url);
    }

    #[test]
    fn test_record_unexpected_status() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = CsvSinks::new(dir.path());

        record_unexpected_status(&sinks, "https://example.gov/", "https://example.gov/", "https://example.gov/gone", 404);

        let written =
            std::fs::read_to_string(dir.path().join("unexpected_response_codes.csv")).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("base_url,parent_url,url,status_code"));
        assert_eq!(
            lines.next(),
            Some("https://example.gov/,https://example.gov/,https://example.gov/gone,404")
        );
    }
}

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

use crate::catalog::Cover;
use crate::config::ImportConfig;

/// Fetches a book page. `Ok(None)` means the server answered but not with a
/// 200 HTML document.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<Option<String>>;
}

/// Fetches cover art. Never fails: a missing cover is an expected outcome.
#[async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch_cover(&self, url: Option<&str>) -> CoverFetchOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverFetchOutcome {
    Fetched(Cover),
    Skipped(CoverSkip),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSkip {
    NoUrl,
    Request(String),
    Status(u16),
    EmptyBody,
}

impl std::fmt::Display for CoverSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoverSkip::NoUrl => f.write_str("no cover url"),
            CoverSkip::Request(err) => write!(f, "request failed: {err}"),
            CoverSkip::Status(status) => write!(f, "unexpected status {status}"),
            CoverSkip::EmptyBody => f.write_str("empty body"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    page_timeout: Duration,
    cover_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ImportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            page_timeout: Duration::from_secs(config.page_timeout_secs.max(1)),
            cover_timeout: Duration::from_secs(config.cover_timeout_secs.max(1)),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!(url, status = %response.status(), "page fetch: non-200 status");
            return Ok(None);
        }
        if !is_html(response.headers().get(CONTENT_TYPE)) {
            tracing::debug!(url, "page fetch: not html");
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl CoverFetcher for HttpFetcher {
    async fn fetch_cover(&self, url: Option<&str>) -> CoverFetchOutcome {
        let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
            return CoverFetchOutcome::Skipped(CoverSkip::NoUrl);
        };

        let response = match self
            .client
            .get(url)
            .timeout(self.cover_timeout)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return CoverFetchOutcome::Skipped(CoverSkip::Request(err.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return CoverFetchOutcome::Skipped(CoverSkip::Status(status.as_u16()));
        }

        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => CoverFetchOutcome::Skipped(CoverSkip::EmptyBody),
            Ok(bytes) => CoverFetchOutcome::Fetched(Cover {
                file_name: cover_file_name(url),
                bytes: bytes.to_vec(),
            }),
            Err(err) => CoverFetchOutcome::Skipped(CoverSkip::Request(err.to_string())),
        }
    }
}

fn is_html(content_type: Option<&reqwest::header::HeaderValue>) -> bool {
    content_type
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("html"))
}

/// Last path segment of the cover URL, used as the stored file name.
pub fn cover_file_name(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_owned(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_owned(),
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| "cover".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_file_name_uses_last_segment() {
        assert_eq!(
            cover_file_name("https://www.30book.com/Media/Book/1234.jpg"),
            "1234.jpg"
        );
        assert_eq!(cover_file_name("https://example.com/a/b.png?x=1"), "b.png");
        assert_eq!(cover_file_name("https://example.com/"), "cover");
    }

    #[test]
    fn html_detection_ignores_case_and_charset() {
        let html = reqwest::header::HeaderValue::from_static("Text/HTML; charset=utf-8");
        let json = reqwest::header::HeaderValue::from_static("application/json");
        assert!(is_html(Some(&html)));
        assert!(!is_html(Some(&json)));
        assert!(!is_html(None));
    }

    /// Serves `/covers/1.jpg` and `/book/1/`; everything else is a 404.
    fn spawn_cover_server() -> (String, std::thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());

        let handle = std::thread::spawn(move || {
            // One request per assertion in the tests below.
            for request in server.incoming_requests().take(3) {
                let (status, body, content_type): (u16, &[u8], &str) = match request.url() {
                    "/covers/1.jpg" => (200, &[0xff, 0xd8, 0xff], "image/jpeg"),
                    "/book/1/" => (200, b"<html><body>ok</body></html>", "text/html"),
                    _ => (404, b"not found", "text/plain"),
                };
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                        .expect("build header");
                let response = tiny_http::Response::from_data(body.to_vec())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        (base_url, handle)
    }

    #[tokio::test]
    async fn cover_fetch_reports_status_and_keeps_bytes() -> anyhow::Result<()> {
        let (base_url, server) = spawn_cover_server();
        let fetcher = HttpFetcher::new(&ImportConfig::default())?;

        assert_eq!(
            fetcher
                .fetch_cover(Some(&format!("{base_url}/covers/missing.jpg")))
                .await,
            CoverFetchOutcome::Skipped(CoverSkip::Status(404))
        );
        assert_eq!(
            fetcher
                .fetch_cover(Some(&format!("{base_url}/covers/1.jpg")))
                .await,
            CoverFetchOutcome::Fetched(Cover {
                file_name: "1.jpg".to_owned(),
                bytes: vec![0xff, 0xd8, 0xff],
            })
        );
        assert_eq!(
            fetcher.fetch_page(&format!("{base_url}/book/2/")).await?,
            None
        );

        let _ = server.join();
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_cover_is_a_request_skip() -> anyhow::Result<()> {
        let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        let fetcher = HttpFetcher::new(&ImportConfig::default())?;

        let outcome = fetcher
            .fetch_cover(Some(&format!("http://127.0.0.1:{port}/covers/1.jpg")))
            .await;
        assert!(
            matches!(outcome, CoverFetchOutcome::Skipped(CoverSkip::Request(_))),
            "{outcome:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_cover_url_is_skipped() -> anyhow::Result<()> {
        let fetcher = HttpFetcher::new(&ImportConfig::default())?;
        assert_eq!(
            fetcher.fetch_cover(None).await,
            CoverFetchOutcome::Skipped(CoverSkip::NoUrl)
        );
        assert_eq!(
            fetcher.fetch_cover(Some("  ")).await,
            CoverFetchOutcome::Skipped(CoverSkip::NoUrl)
        );
        Ok(())
    }
}

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{Html, Selector};
use url::Url;

use crate::cli::CollectArgs;
use crate::config::ImportConfig;

const PAGE_PLACEHOLDER: &str = "{page}";

pub async fn run(args: CollectArgs) -> anyhow::Result<()> {
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() {
        anyhow::bail!("url list output already exists: {}", out_path.display());
    }
    if !args.listing_url.contains(PAGE_PLACEHOLDER) && args.pages > 1 {
        anyhow::bail!("--listing-url must contain {PAGE_PLACEHOLDER} when --pages > 1");
    }
    let pattern = Regex::new(&args.link_pattern).context("compile --link-pattern")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs.max(1)))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build listing http client")?;
    let user_agent = ImportConfig::default_user_agent();

    let mut collector = LinkCollector::new(pattern);
    for page in 1..=args.pages {
        let listing_url = listing_page_url(&args.listing_url, page);
        let html = match fetch_listing(&client, &user_agent, &listing_url).await {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(url = %listing_url, ?err, "listing page skipped");
                continue;
            }
        };
        let base = Url::parse(&listing_url).context("parse listing url")?;
        let added = collector.add_page(&base, &html);
        tracing::info!(page, url = %listing_url, added, "listing page collected");
    }

    let file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&out_path)
        .with_context(|| format!("create url list: {}", out_path.display()))?;
    let mut out = BufWriter::new(file);
    for url in collector.urls() {
        writeln!(out, "{url}").context("write url list line")?;
    }
    out.flush().context("flush url list")?;

    tracing::info!(count = collector.urls().len(), out = %out_path.display(), "url list written");
    Ok(())
}

pub fn listing_page_url(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

async fn fetch_listing(
    client: &reqwest::Client,
    user_agent: &str,
    url: &str,
) -> anyhow::Result<String> {
    let response = client
        .get(url)
        .header(USER_AGENT, user_agent)
        .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;
    response
        .text()
        .await
        .with_context(|| format!("read listing body: {url}"))
}

/// Book links seen so far, de-duplicated in first-seen order.
pub struct LinkCollector {
    pattern: Regex,
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl LinkCollector {
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            seen: HashSet::new(),
            urls: Vec::new(),
        }
    }

    /// Returns how many new links the page contributed.
    pub fn add_page(&mut self, base: &Url, html: &str) -> usize {
        let document = Html::parse_document(html);
        let Ok(anchors) = Selector::parse("a[href]") else {
            return 0;
        };

        let mut added = 0;
        for anchor in document.select(&anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(mut link) = base.join(href.trim()) else {
                continue;
            };
            if link.scheme() != "http" && link.scheme() != "https" {
                continue;
            }
            link.set_fragment(None);
            let link = link.to_string();
            if !self.pattern.is_match(&link) {
                continue;
            }
            if self.seen.insert(link.clone()) {
                self.urls.push(link);
                added += 1;
            }
        }
        added
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"<!doctype html>
<html><body>
  <a href="/book/123/first-book/">First</a>
  <a href="https://shop.example/book/123/first-book/#reviews">First again</a>
  <a href="book/456/second/">Second (relative)</a>
  <a href="/author/9/">Author page</a>
  <a href="mailto:shop@example.com">Mail</a>
</body></html>
"##;

    #[test]
    fn collects_matching_links_once() -> anyhow::Result<()> {
        let mut collector = LinkCollector::new(Regex::new(r"/book/\d+/")?);
        let base = Url::parse("https://shop.example/shop/page/1/")?;

        assert_eq!(collector.add_page(&base, LISTING), 2);
        assert_eq!(collector.add_page(&base, LISTING), 0);
        assert_eq!(
            collector.urls(),
            [
                "https://shop.example/book/123/first-book/".to_owned(),
                "https://shop.example/shop/page/1/book/456/second/".to_owned(),
            ]
        );
        Ok(())
    }

    #[test]
    fn listing_template_substitutes_page() {
        assert_eq!(
            listing_page_url("https://shop.example/shop/page/{page}/", 3),
            "https://shop.example/shop/page/3/"
        );
    }
}

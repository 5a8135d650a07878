//! Link admission filter and search-page scraping helpers shared by both
//! discovery strategies.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::config::SiteConfig;
use crate::error::AppError;
use crate::work_queue::dedupe_urls;

/// Result cards on the search page. Used both for DOM growth detection and
/// link extraction.
pub const CARD_SELECTORS: &str = "#recipes a.h5[href], .cn-item a.h5[href], a.recipe-card[href]";

static NEXT_PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cook_load_next_page_html\('([^']+)'").expect("valid regex"));

static CARD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CARD_SELECTORS).expect("valid selector"));

/// Decides whether a raw discovered link enters the queue.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    base_url: Url,
    allowed_hosts: Vec<String>,
    content_prefix: String,
}

impl LinkFilter {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            base_url: site.base_url.clone(),
            allowed_hosts: site.allowed_hosts(),
            content_prefix: site.content_prefix.clone(),
        }
    }

    /// Resolve `candidate` against the base URL and keep it only if it is an
    /// http(s) link on the site host. The fragment is dropped.
    pub fn normalize(&self, candidate: &str) -> Option<Url> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }
        let mut url = self.base_url.join(candidate).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?;
        if !self.allowed_hosts.iter().any(|allowed| allowed == host) {
            return None;
        }
        url.set_fragment(None);
        Some(url)
    }

    /// Normalized form of `candidate` if it is a content page.
    pub fn admit(&self, candidate: &str) -> Option<String> {
        let url = self.normalize(candidate)?;
        url.path()
            .starts_with(&self.content_prefix)
            .then(|| url.to_string())
    }

    /// Filter a batch of raw links, dropping duplicates within the batch.
    pub fn admit_batch<I, S>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admitted: Vec<String> = candidates
            .into_iter()
            .filter_map(|c| self.admit(c.as_ref()))
            .collect();
        dedupe_urls(&admitted)
    }
}

/// Raw `href` values of every result card in `html`.
pub fn card_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&CARD_SELECTOR)
        .filter_map(|node| node.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// The AJAX "next page" URL template embedded in the search page, if any.
pub fn find_ajax_template(html: &str) -> Option<String> {
    NEXT_PAGE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve `template` against `base_url` and set its `p` query parameter to
/// `page`. Other parameters keep their order.
pub fn build_ajax_url(template: &str, base_url: &Url, page: u32) -> Result<Url, AppError> {
    let mut url = base_url
        .join(template)
        .map_err(|e| AppError::Generic(format!("Invalid pagination template '{template}': {e}")))?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    match pairs.iter_mut().find(|(k, _)| k == "p") {
        Some(pair) => pair.1 = page.to_string(),
        None => pairs.push(("p".to_string(), page.to_string())),
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url)
}

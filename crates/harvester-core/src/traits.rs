use std::future::Future;

use crate::error::AppError;
use crate::models::RecipeRecord;

/// Fetches raw HTML content from a URL. Non-success statuses are errors.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns a fetched page into a recipe record.
///
/// Returns `None` when the page is not a recipe page or a mandatory field
/// (title, ingredients, instructions) is missing.
pub trait Extractor: Send + Sync + Clone {
    fn extract(&self, html: &str, url: &str) -> Option<RecipeRecord>;
}

/// Buffered, durable destination for harvested records.
pub trait RecordSink: Send + Sync + Clone {
    /// Buffer a record, flushing when the buffer reaches its threshold.
    fn append(&self, record: RecipeRecord) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Write out everything buffered so far.
    fn flush(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Flush the remainder. Called once at shutdown.
    fn finalize(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        self.flush()
    }
}

/// Element query for page automation: a CSS selector, optionally narrowed
/// to elements whose text contains `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub css: String,
    pub text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A live, scriptable browser tab.
pub trait BrowserPage: Send + Sync {
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Number of elements currently matching `locator`.
    fn count(&self, locator: &Locator) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Value of `attribute` on every matching element, in document order.
    fn attribute_values(
        &self,
        locator: &Locator,
        attribute: &str,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Click the first matching element. Returns `false` if nothing matched.
    fn click(&self, locator: &Locator) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Factory for browser pages. A launch failure means the browser strategy
/// is unusable for this run.
pub trait PageLauncher: Send + Sync {
    type Page: BrowserPage;

    fn launch(&self) -> impl Future<Output = Result<Self::Page, AppError>> + Send;
}

/// Launcher used when browser support is not available; every launch fails,
/// so `auto` discovery falls back to HTTP.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

/// Uninhabited page type for [`NoBrowser`].
#[derive(Debug)]
pub enum NoPage {}

impl BrowserPage for NoPage {
    async fn navigate(&self, _url: &str) -> Result<(), AppError> {
        match *self {}
    }

    async fn count(&self, _locator: &Locator) -> Result<usize, AppError> {
        match *self {}
    }

    async fn attribute_values(
        &self,
        _locator: &Locator,
        _attribute: &str,
    ) -> Result<Vec<String>, AppError> {
        match *self {}
    }

    async fn click(&self, _locator: &Locator) -> Result<bool, AppError> {
        match *self {}
    }
}

impl PageLauncher for NoBrowser {
    type Page = NoPage;

    async fn launch(&self) -> Result<NoPage, AppError> {
        Err(AppError::BrowserError(
            "browser automation is not available in this build".into(),
        ))
    }
}

#[cfg(feature = "browser")]
pub mod browser;
pub mod fetcher;
pub mod parser;

#[cfg(feature = "browser")]
pub use browser::{ChromiumLauncher, ChromiumPage};
pub use fetcher::ReqwestFetcher;
pub use parser::RecipeParser;

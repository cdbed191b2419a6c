pub mod browser_manager;
pub mod driver;
pub mod extractor;
pub mod scroll;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{BrowserLauncher, LaunchOptions, PageDriver};
pub use extractor::{ExtractOptions, PageExtractor, TEXT_STRATEGIES};
pub use scroll::{ScrollOutcome, ScrollPolicy, ScrollStop};

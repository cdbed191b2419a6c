pub mod api;
pub mod core;
pub mod jobs;
pub mod notify;
pub mod scraping;
pub mod text;

// --- Primary core exports ---
pub use core::config;
pub use core::types;
pub use core::types::*;
pub use core::{AppState, DeliveryError, RelayConfig, RelayError};

pub mod app_state;
pub mod config;
pub mod error;
pub mod types;

pub use app_state::AppState;
pub use config::RelayConfig;
pub use error::{DeliveryError, RelayError};

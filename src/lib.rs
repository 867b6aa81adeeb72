pub mod batch;
pub mod browser;
pub mod core;
pub mod extract;
pub mod output;
pub mod pacing;
pub mod server;
pub mod session;

// --- Primary exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{Config, ScrapeError};
pub use crate::server::AppState;

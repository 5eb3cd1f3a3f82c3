//! Candle Feed
//!
//! Market-data plumbing for the option runner: candle types, the source
//! trait, the shared deduplicated window and the background collector.

pub mod collector;
pub mod types;
pub mod window;
pub mod sources {
    pub mod http;
}

pub use collector::{CandleCollector, CollectorConfig};
pub use sources::http::HttpCandleSource;
pub use types::*;
pub use window::{CandleWindow, SharedWindow, WindowSnapshot, DEFAULT_CAPACITY};

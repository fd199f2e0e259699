// Library surface: the assessment engine plus the pieces the terminal
// front-end in main.rs is assembled from.
pub mod align;
pub mod api;
pub mod app;
pub mod app_dirs;
pub mod backend;
pub mod config;
pub mod definition;
pub mod error;
pub mod evaluation;
pub mod history;
pub mod input;
pub mod integrity;
pub mod keystroke;
pub mod metrics;
pub mod outbox;
pub mod runtime;
pub mod session;
pub mod texts;
pub mod time_series;
pub mod ui;
pub mod util;

pub use error::{AssessError, Result};

/// Front-end redraw and deadline poll interval
pub const TICK_RATE_MS: u64 = 100;

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! shelly-update-server library — the pieces behind the binary.
//!
//! - `models` — stock device ID -> HomeKit model resolution
//! - `history` — per-client request history with age-based pruning
//! - `routes` — `/update` and `/log` handlers and the router
//! - `sweeper` — periodic history pruning task
//! - `replay` — offline access-log replay through the resolver
//! - `config` — configuration loading and validation

pub mod config;
pub mod history;
pub mod models;
pub mod replay;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod util;

// Re-export key types at crate root for convenience.
pub use config::{Config, RedirectTemplate};
pub use history::{ClientLogStore, LogEntry};
pub use models::{ResolveError, StockModelMap};
pub use state::AppState;

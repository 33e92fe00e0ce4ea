//! Client-side streaming playback engine.
//!
//! The crate is organized by responsibility:
//!
//! - `model`: tracks, the play queue, playback sessions and the observable state
//! - `auth`: signed stream token acquisition with request coalescing
//! - `api`: HTTP clients for the token and play-completion endpoints
//! - `audio`: the stream source state machine and its decode backends
//! - `engine`: the playback orchestrator and its helpers (retries, position
//!   sampling, media control surface)
//! - `config`, `error`, `logging`: ambient plumbing

pub mod api;
pub mod audio;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;

pub use error::{AudioLoadError, LoadErrorKind, PlaybackError, Result};

//! Audio backends and the stream source state machine
//!
//! A backend turns a token-qualified locator into an [`AudioHandle`]; the
//! [`StreamSource`] wraps whichever handle is current and enforces the
//! playback lifecycle, so the engine never sees backend specifics.

mod rodio_backend;
mod source;

use async_trait::async_trait;

use crate::error::AudioLoadError;

pub use rodio_backend::RodioBackend;
pub use source::{LoadOutcome, SourceState, StreamSource};

/// Fetches and decodes a resource
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn open(&self, uri: &str) -> Result<Box<dyn AudioHandle>, AudioLoadError>;
}

/// A decoded resource ready to play. Dropping the handle releases it.
pub trait AudioHandle: Send {
    /// Start or resume output; `Err` carries the platform's refusal reason
    fn play(&mut self) -> Result<(), String>;
    fn pause(&mut self);
    fn seek(&mut self, position: f64) -> Result<(), String>;
    /// Position in seconds as reported by the backend
    fn position(&self) -> f64;
    /// Authoritative duration, when the container declares one
    fn duration(&self) -> Option<f64>;
    /// True once every sample has been played
    fn is_finished(&self) -> bool;
    fn set_volume(&mut self, volume: f32);
}

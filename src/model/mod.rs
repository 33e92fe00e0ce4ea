//! Model module - playback data types and state
//!
//! - `types`: core type definitions (track, ids, repeat mode)
//! - `queue`: the play queue with shuffle/repeat policy
//! - `session`: token-scoped playback sessions
//! - `playback`: the observable playback state and completion spans

mod playback;
mod queue;
mod session;
mod types;

pub use types::{RepeatMode, Track, TrackId};

pub use queue::{Queue, Step};

pub use session::{PlaybackSession, TokenGrant};

pub use playback::{CompletionAck, CompletionReport, PlaySpan, PlaybackState};

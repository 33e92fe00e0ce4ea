//! Play queue with shuffle and repeat policy

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::types::{RepeatMode, Track};
use crate::error::{PlaybackError, Result};

/// Result of moving the queue cursor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The cursor now points at this index
    Moved(usize),
    /// Repeat-one: the cursor stayed, the current track restarts
    Repeat,
    /// Edge of the queue reached with repeat off; cursor unchanged
    Exhausted,
    /// Nothing queued
    Empty,
}

/// Ordered track list plus a cursor.
///
/// `order` holds the traversal order as indices into `tracks` (the original
/// order). It is the identity permutation unless shuffle is on. The cursor
/// and every index this type reports are positions in traversal order.
pub struct Queue {
    tracks: Vec<Track>,
    order: Vec<usize>,
    cursor: Option<usize>,
    repeat: RepeatMode,
    shuffle: bool,
    rng: StdRng,
}

impl Queue {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Queue with a caller-provided shuffle RNG
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            order: Vec::new(),
            cursor: None,
            repeat: RepeatMode::Off,
            shuffle: false,
            rng,
        }
    }

    /// Replace the queue atomically; nothing changes when validation fails.
    ///
    /// An empty list is rejected, use [`Queue::clear`] to empty the queue.
    /// With shuffle on, the start track becomes the anchor and every other
    /// track is shuffled after it.
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        if tracks.is_empty() {
            return Err(PlaybackError::InvalidQueue("no tracks".to_string()));
        }
        if start_index >= tracks.len() {
            return Err(PlaybackError::InvalidQueue(format!(
                "start index {} out of range for {} tracks",
                start_index,
                tracks.len()
            )));
        }
        let mut seen = HashSet::with_capacity(tracks.len());
        if let Some(dup) = tracks.iter().find(|t| !seen.insert(&t.id)) {
            return Err(PlaybackError::InvalidQueue(format!("duplicate track id {}", dup.id)));
        }

        let len = tracks.len();
        self.tracks = tracks;
        if self.shuffle {
            let mut rest: Vec<usize> = (0..len).filter(|&i| i != start_index).collect();
            rest.shuffle(&mut self.rng);
            self.order = std::iter::once(start_index).chain(rest).collect();
            self.cursor = Some(0);
        } else {
            self.order = (0..len).collect();
            self.cursor = Some(start_index);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.order.clear();
        self.cursor = None;
    }

    pub fn current(&self) -> Option<&Track> {
        self.cursor.map(|c| &self.tracks[self.order[c]])
    }

    /// Cursor position in traversal order
    pub fn index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 == self.order.len())
    }

    /// Tracks in traversal order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().map(|&i| &self.tracks[i])
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Point the cursor at `index` (traversal order)
    pub fn jump_to(&mut self, index: usize) -> Result<&Track> {
        if index >= self.order.len() {
            return Err(PlaybackError::InvalidQueue(format!(
                "index {} out of range for {} tracks",
                index,
                self.order.len()
            )));
        }
        self.cursor = Some(index);
        Ok(&self.tracks[self.order[index]])
    }

    pub fn advance(&mut self) -> Step {
        let Some(cursor) = self.cursor else {
            return Step::Empty;
        };
        if self.repeat == RepeatMode::One {
            return Step::Repeat;
        }
        if cursor + 1 < self.order.len() {
            self.cursor = Some(cursor + 1);
            Step::Moved(cursor + 1)
        } else if self.repeat == RepeatMode::All {
            self.cursor = Some(0);
            Step::Moved(0)
        } else {
            Step::Exhausted
        }
    }

    pub fn retreat(&mut self) -> Step {
        let Some(cursor) = self.cursor else {
            return Step::Empty;
        };
        if self.repeat == RepeatMode::One {
            return Step::Repeat;
        }
        if cursor > 0 {
            self.cursor = Some(cursor - 1);
            Step::Moved(cursor - 1)
        } else if self.repeat == RepeatMode::All {
            let last = self.order.len() - 1;
            self.cursor = Some(last);
            Step::Moved(last)
        } else {
            Step::Exhausted
        }
    }

    /// Toggle shuffle.
    ///
    /// Enabling shuffles only what comes after the cursor; the current track
    /// and the history before it stay put. Disabling restores the original
    /// order and moves the cursor to the current track's original index.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if self.shuffle == enabled {
            return;
        }
        self.shuffle = enabled;
        let Some(cursor) = self.cursor else {
            return;
        };

        if enabled {
            self.order[cursor + 1..].shuffle(&mut self.rng);
        } else {
            let original = self.order[cursor];
            self.order = (0..self.tracks.len()).collect();
            self.cursor = Some(original);
        }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

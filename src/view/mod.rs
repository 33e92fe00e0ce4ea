//! View module - UI rendering
//!
//! - `utils`: shared formatting helpers
//! - `layout`: now-playing bar and the queue list
//! - `progress`: progress bar
//! - `overlays`: error notification and help popup

mod layout;
mod overlays;
mod progress;
mod utils;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};
use tunestream::model::PlaybackState;

use crate::app::UiState;
use crate::surface::SurfaceState;

pub struct AppView;

impl AppView {
    pub fn render(frame: &mut Frame, playback: &PlaybackState, surface: &SurfaceState, ui_state: &UiState) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Media surface mirror
                Constraint::Min(0),    // Queue
                Constraint::Length(3), // Progress bar with playback info
            ])
            .split(frame.area());

        layout::render_top_bar(frame, chunks[0], surface, ui_state.status.as_deref());
        layout::render_queue(frame, chunks[1], playback, ui_state);
        progress::render_progress_bar(frame, chunks[2], playback);

        if let Some(error) = ui_state.visible_error(playback) {
            overlays::render_error_notification(frame, &error);
        }

        if ui_state.show_help_popup {
            overlays::render_help_popup(frame);
        }
    }
}

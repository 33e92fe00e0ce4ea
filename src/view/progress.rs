//! Progress bar rendering

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Gauge},
    Frame,
};
use tunestream::model::{PlaybackState, RepeatMode};

use super::utils::format_seconds;

pub fn render_progress_bar(frame: &mut Frame, area: Rect, playback: &PlaybackState) {
    let status_text = match &playback.track {
        None => " No track playing".to_string(),
        Some(track) => {
            let icon = if playback.is_loading {
                "…"
            } else if playback.is_playing {
                "▶"
            } else {
                "⏸"
            };
            let album = track.album.as_deref().map(|a| format!(" ({})", a)).unwrap_or_default();
            format!(" {} {} | {}{}", icon, track.title, track.artist, album)
        }
    };

    let shuffle_text = if playback.shuffle { "Shuffle: On" } else { "Shuffle: Off" };
    let repeat_text = match playback.repeat_mode {
        RepeatMode::Off => "Repeat: Off",
        RepeatMode::All => "Repeat: All",
        RepeatMode::One => "Repeat: One",
    };
    let volume_text = if playback.muted {
        "Vol: muted".to_string()
    } else {
        format!("Vol: {:.0}%", playback.volume * 100.0)
    };

    let time_str = format!(
        "{} / {}",
        format_seconds(playback.position_seconds),
        format_seconds(playback.duration_seconds)
    );

    let title = format!("{} ", status_text);
    let controls_info = format!(" {} | {} | {} ", shuffle_text, repeat_text, volume_text);

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_bottom(Line::from(controls_info).right_aligned()),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(playback.progress_ratio())
        .label(time_str);

    frame.render_widget(gauge, area);
}

//! Layout rendering (media surface bar, queue list)

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Padding, Paragraph},
    Frame,
};
use tunestream::engine::MediaPlayback;
use tunestream::model::PlaybackState;

use super::utils::{calculate_num_width, format_seconds, truncate_string};
use crate::app::UiState;
use crate::surface::SurfaceState;

pub fn render_top_bar(frame: &mut Frame, area: Rect, surface: &SurfaceState, status: Option<&str>) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),     // Mirrored metadata
            Constraint::Length(34), // Status line
        ])
        .split(area);

    let icon = match surface.playback {
        MediaPlayback::Playing => "▶",
        MediaPlayback::Paused => "⏸",
        MediaPlayback::Stopped => "⏹",
    };
    let now_playing = match &surface.metadata {
        Some(metadata) => {
            let position = surface
                .position
                .map(|p| format!(" @ {}", format_seconds(p.position_seconds)))
                .unwrap_or_default();
            format!("{} {} - {}{}", icon, metadata.title, metadata.artist, position)
        }
        None => "Nothing playing".to_string(),
    };

    let title = match surface.volume {
        Some(volume) => format!(" Media Controls · {:.0}% ", volume * 100.0),
        None => " Media Controls ".to_string(),
    };
    let surface_widget = Paragraph::new(now_playing)
        .style(Style::default().fg(Color::Cyan))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .padding(Padding::horizontal(1)),
        );
    frame.render_widget(surface_widget, chunks[0]);

    let status = Paragraph::new(status.unwrap_or(""))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(" Status "));
    frame.render_widget(status, chunks[1]);
}

pub fn render_queue(frame: &mut Frame, area: Rect, playback: &PlaybackState, ui_state: &UiState) {
    let num_width = calculate_num_width(playback.queue.len());
    let content_width = area.width.saturating_sub(4) as usize;
    let fixed_width = 1 + num_width + 3 + 3 + 8;
    let remaining = content_width.saturating_sub(fixed_width);
    let title_width = (remaining * 55) / 100;
    let artist_width = remaining.saturating_sub(title_width);

    let items: Vec<ListItem> = playback
        .queue
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let is_current = playback.queue_index == Some(i);
            let marker = if is_current && playback.is_playing { "▶" } else { " " };
            let text = format!(
                "{}{:>num$}   {}   {}   {:>8}",
                marker,
                i + 1,
                truncate_string(&track.title, title_width),
                truncate_string(&track.artist, artist_width),
                format_seconds(track.duration_seconds),
                num = num_width,
            );

            let style = if i == ui_state.selected {
                Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
            } else if is_current {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(text).style(style)
        })
        .collect();

    let title = format!(" Queue ({}) ", playback.queue.len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default()); // Highlight handled by item styles

    let mut list_state = ListState::default();
    list_state.select(Some(ui_state.selected));

    frame.render_stateful_widget(list, area, &mut list_state);
}

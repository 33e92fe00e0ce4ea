//! Key event handling

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;
use tunestream::engine::{MediaCommand, PlaybackEngine};
use tunestream::model::PlaybackState;

use crate::app::UiState;

const SEEK_STEP_SECONDS: f64 = 5.0;
const VOLUME_STEP: f32 = 0.05;

/// Transport keys go through the media surface like hardware media keys;
/// queue and settings keys call the engine directly.
pub async fn handle_key_event(
    key: KeyEvent,
    ui: &mut UiState,
    engine: &PlaybackEngine,
    media: &mpsc::UnboundedSender<MediaCommand>,
    playback: &PlaybackState,
) {
    if key.kind != KeyEventKind::Press {
        return;
    }

    // Error popup blocks everything else
    if ui.visible_error(playback).is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
            ui.dismiss_error(playback);
        }
        return;
    }

    if ui.show_help_popup {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('H')) {
            ui.show_help_popup = false;
        }
        return;
    }

    let command = match key.code {
        KeyCode::Char(' ') => Some(MediaCommand::Toggle),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(MediaCommand::Next),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(MediaCommand::Previous),
        KeyCode::Char('x') | KeyCode::Char('X') => Some(MediaCommand::Stop),
        KeyCode::Left => Some(MediaCommand::SeekBy(-SEEK_STEP_SECONDS)),
        KeyCode::Right => Some(MediaCommand::SeekBy(SEEK_STEP_SECONDS)),
        _ => None,
    };
    if let Some(command) = command {
        tracing::debug!(?command, "Media key");
        if media.send(command).is_err() {
            tracing::warn!("Engine no longer accepts media commands");
        }
        return;
    }

    let result = match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => {
            ui.should_quit = true;
            Ok(())
        }
        KeyCode::Char('h') | KeyCode::Char('H') => {
            ui.show_help_popup = true;
            Ok(())
        }
        KeyCode::Up => {
            ui.move_up();
            Ok(())
        }
        KeyCode::Down => {
            ui.move_down(playback.queue.len());
            Ok(())
        }
        KeyCode::Enter => engine.play_track_at(ui.selected).await,
        KeyCode::Char('+') | KeyCode::Char('=') => engine.set_volume(playback.volume + VOLUME_STEP).await,
        KeyCode::Char('-') => engine.set_volume(playback.volume - VOLUME_STEP).await,
        KeyCode::Char('m') | KeyCode::Char('M') => engine.set_muted(!playback.muted).await,
        KeyCode::Char('r') | KeyCode::Char('R') => engine.cycle_repeat_mode().await,
        KeyCode::Char('s') | KeyCode::Char('S') => engine.set_shuffle(!playback.shuffle).await,
        KeyCode::Char('t') | KeyCode::Char('T') => engine.refresh_session().await,
        _ => Ok(()),
    };

    if let Err(e) = result {
        ui.set_error(&e);
    }
}

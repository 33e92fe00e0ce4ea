mod app;
mod input;
mod surface;
mod view;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{broadcast::error::TryRecvError, watch};

use tunestream::api::ApiClient;
use tunestream::audio::RodioBackend;
use tunestream::config::Config;
use tunestream::engine::PlaybackEngine;
use tunestream::logging;
use tunestream::model::Track;

use app::UiState;
use surface::{SurfaceState, TerminalSurface};
use view::AppView;

/// Terminal player for token-gated audio streams
#[derive(Parser, Debug)]
#[command(name = "tunestream", version, about)]
struct Cli {
    /// JSON file holding an array of tracks
    queue: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Queue index to start at
    #[arg(short, long, default_value_t = 0)]
    start: usize,

    /// Load the first track without starting playback
    #[arg(long)]
    cue: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== tunestream starting ===");

    let config = Config::load_or_default(cli.config.as_deref())?;
    let tracks = load_queue(&cli.queue)?;
    tracing::info!(tracks = tracks.len(), start = cli.start, cue = cli.cue, "Queue loaded");

    let api = Arc::new(ApiClient::new(&config.api)?);
    let backend = Arc::new(RodioBackend::new(api.http())?);
    let (surface, surface_state) = TerminalSurface::new();

    let engine = PlaybackEngine::builder(api.clone(), backend, api.clone())
        .config(config.engine.clone())
        .retry(config.retry.clone())
        .media_session(Box::new(surface))
        .spawn();

    if cli.cue {
        engine.cue_queue(tracks, cli.start).await?;
    } else {
        engine.play_queue(tracks, cli.start).await?;
    }

    tracing::info!("Starting TUI...");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &engine, surface_state).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    engine.shutdown().await?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    tracing::info!("tunestream shutting down");
    Ok(())
}

fn load_queue(path: &Path) -> Result<Vec<Track>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading queue file {}", path.display()))?;
    let tracks: Vec<Track> = serde_json::from_str(&content)
        .with_context(|| format!("parsing queue file {}", path.display()))?;
    anyhow::ensure!(!tracks.is_empty(), "queue file {} has no tracks", path.display());
    Ok(tracks)
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    engine: &PlaybackEngine,
    surface: watch::Receiver<SurfaceState>,
) -> Result<()> {
    let mut ui = UiState::default();
    let mut events = engine.events();
    let media = engine.media_commands();

    loop {
        loop {
            match events.try_recv() {
                Ok(event) => ui.on_engine_event(&event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "UI fell behind engine events");
                }
                Err(_) => break,
            }
        }

        let playback = engine.state();
        let surface_state = surface.borrow().clone();

        terminal.draw(|f| {
            AppView::render(f, &playback, &surface_state, &ui);
        })?;

        // Short poll keeps the progress bar smooth
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                input::handle_key_event(key, &mut ui, engine, &media, &playback).await;
            }
        }

        if ui.should_quit {
            break;
        }
    }

    Ok(())
}

//! mayfly-tui — Terminal client for ephemeral code-joinable chats.
//! Uses Ratatui + Crossterm for rendering.

mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use tracing::info;

use mayfly_core::config::Config;

use app::App;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Initialize tracing to a file (not stdout, since we own the terminal)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(|| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open("mayfly-tui.log")
                .unwrap_or_else(|_| {
                    // Fallback: /dev/null
                    std::fs::File::open("/dev/null").unwrap()
                })
        })
        .try_init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_path = project_root.join("config.yaml");
    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Bad config at {}: {:#}", config_path.display(), e);
            return Ok(());
        }
    };

    match config.relay_url.as_deref() {
        Some(url) => info!("starting TUI (relay: {})", url),
        None => info!("starting TUI (loopback mode, no relay configured)"),
    }

    let mut app = App::new(config);

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    // Main event loop
    loop {
        // Draw
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Handle session events (non-blocking)
        app.drain_events();

        // Handle terminal events
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                match (key.code, key.modifiers) {
                    // Quit
                    (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                        app.should_quit = true;
                    }
                    (KeyCode::Char('q'), KeyModifiers::CONTROL) => {
                        app.should_quit = true;
                    }
                    // Fresh session with a minted code
                    (KeyCode::Char('n'), KeyModifiers::CONTROL) => app.create_session(),
                    // Leave the chat (or quit from the home screen)
                    (KeyCode::Esc, _) => app.on_escape().await,
                    // Join / send
                    (KeyCode::Enter, _) => app.submit().await,
                    // Input handling
                    (KeyCode::Char(c), _) => app.push_char(c),
                    (KeyCode::Backspace, _) => app.pop_char(),
                    // Scroll
                    (KeyCode::PageUp, _) => app.scroll_up(),
                    (KeyCode::PageDown, _) => app.scroll_down(),
                    _ => {}
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    // Stop the running session, if any
    app.shutdown().await;

    Ok(())
}

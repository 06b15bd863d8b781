mod app;
mod constants;
mod controller;
mod core;
mod error;
mod highlight;
mod input;
mod markup;
mod prefs;
mod protocol;
mod timer;
mod transport;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use constants::{
    DEFAULT_EXPORT_PATH, DEFAULT_HTTP_URL, DEFAULT_LOG_FILE, DEFAULT_STATE_FILE, DEFAULT_WS_URL,
    UI_TICK_MS,
};
use controller::{Controller, Endpoints};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use prefs::{JsonFileStore, KeyValueStore};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;
use transport::{ThreadTransport, Transport};
use url::Url;

#[derive(Parser)]
#[command(name = "logtail")]
#[command(about = "Live log tail over WebSocket with HTTP polling fallback")]
struct Cli {
    #[arg(long, env = "LOGTAIL_WS_URL", default_value = DEFAULT_WS_URL, help = "WebSocket tail endpoint")]
    ws_url: Url,

    #[arg(long, env = "LOGTAIL_HTTP_URL", default_value = DEFAULT_HTTP_URL, help = "HTTP snapshot endpoint used for polling")]
    http_url: Url,

    #[arg(long, env = "LOGTAIL_TOKEN", help = "Access token sent with the socket connection")]
    token: Option<String>,

    #[arg(long, help = "Log file to tail instead of the server's latest")]
    file: Option<String>,

    #[arg(long, env = "LOGTAIL_STATE_FILE", default_value = DEFAULT_STATE_FILE, help = "Where preferences are stored")]
    state_file: PathBuf,

    #[arg(long, env = "LOGTAIL_LOG_FILE", default_value = DEFAULT_LOG_FILE, help = "Diagnostics log written by this client")]
    log_file: PathBuf,

    #[arg(long, default_value = DEFAULT_EXPORT_PATH, help = "Destination of the HTML export")]
    export_path: PathBuf,

    #[arg(long, help = "Start with HTTP polling instead of connecting")]
    no_connect: bool,
}

fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let filter =
        EnvFilter::try_from_env("LOGTAIL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_file)?;

    let (tx, rx) = mpsc::channel();
    let transport = ThreadTransport::new(tx).context("building HTTP client")?;
    let store = JsonFileStore::open(&cli.state_file);
    let endpoints = Endpoints {
        socket: cli.ws_url,
        snapshot: cli.http_url,
    };
    let mut controller = Controller::new(transport, store, endpoints, cli.token);
    let now = Instant::now();
    controller.start(now, cli.file, !cli.no_connect);
    info!(connect = !cli.no_connect, "starting");
    let mut app = App::new(controller, rx, cli.export_path);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.controller.disconnect(Instant::now());
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
    }

    Ok(())
}

fn run_app<T: Transport, S: KeyValueStore>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<T, S>,
) -> Result<()> {
    loop {
        app.poll_transport(Instant::now());

        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(UI_TICK_MS))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key, Instant::now())
                }
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }

        if app.should_quit {
            info!("quitting");
            return Ok(());
        }
    }
}

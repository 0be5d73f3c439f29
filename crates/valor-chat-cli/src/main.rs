//! ValorMM chat - terminal client for the multimodal inference backend.
//!
//! This is the entry point for the `valor` binary.

mod app;
mod headless;
mod ingest;
mod terminal;
mod ui;

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;
use valor_chat_core::{
    stream_turn, AttachmentStaging, ChatRequest, ClientConfig, ConversationState, HttpTransport,
    ModelConfig, TurnController, TurnEvent,
};

use app::{App, BackendHealth, InputMode, HEALTH_INTERVAL};
use terminal::{TerminalSession, Tui};

/// ValorMM chat - terminal client for the multimodal inference backend.
#[derive(Parser, Debug)]
#[command(name = "valor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL.
    #[arg(long, env = "VALOR_URL", default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Connection timeout in seconds.
    #[arg(long, env = "VALOR_CONNECT_TIMEOUT", default_value_t = 5)]
    connect_timeout: u64,

    /// Health check timeout in seconds.
    #[arg(long, env = "VALOR_HEALTH_TIMEOUT", default_value_t = 3)]
    health_timeout: u64,

    /// Model identifier sent to the backend.
    #[arg(long, env = "VALOR_MODEL_ID")]
    model_id: Option<String>,

    /// Load the model with 4-bit quantization (true/false).
    #[arg(long, env = "VALOR_QUANT_4BIT")]
    quant_4bit: Option<bool>,

    /// Force CPU inference (true/false).
    #[arg(long, env = "VALOR_USE_CPU")]
    use_cpu: Option<bool>,

    /// Longest image edge before downscaling.
    #[arg(long, env = "VALOR_MAX_IMAGE_EDGE")]
    max_image_edge: Option<u32>,

    /// Generation length cap.
    #[arg(long, env = "VALOR_MAX_NEW_TOKENS")]
    max_new_tokens: Option<u32>,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "VALOR_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question without the TUI and print the answer.
    Ask {
        /// Message text.
        text: String,

        /// Attach an image or PDF (repeatable).
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Use the non-streaming endpoint and print the answer at once.
        #[arg(long)]
        no_stream: bool,
    },
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut model = ModelConfig::default();
        if let Some(ref id) = self.model_id {
            model.model_id.clone_from(id);
        }
        if let Some(v) = self.quant_4bit {
            model.quant_4bit = v;
        }
        if let Some(v) = self.use_cpu {
            model.use_cpu = v;
        }
        if let Some(v) = self.max_image_edge {
            model.max_image_edge = v;
        }
        if let Some(v) = self.max_new_tokens {
            model.max_new_tokens = v;
        }
        ClientConfig {
            base_url: self.url.clone(),
            connect_timeout_seconds: self.connect_timeout,
            health_timeout_seconds: self.health_timeout,
            model,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = args.client_config();
    let model = config.model.clone();
    let transport = Arc::new(HttpTransport::new(config)?);

    match args.command {
        Some(Command::Ask {
            text,
            files,
            no_stream,
        }) => run_ask(&transport, model, text, files, no_stream).await,
        None => {
            run_tui(transport, model).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Install the tracing subscriber.
///
/// The TUI owns the terminal, so it logs only with `--debug`. Headless runs
/// always log warnings to stderr.
fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let headless = args.command.is_some();
    if !headless && !args.debug {
        return Ok(());
    }

    let default_filter = if args.debug {
        "valor=debug,valor_chat_core=debug,warn"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (writer, ansi) = match &args.log_file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(File::create(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .init();
    Ok(())
}

// =============================================================================
// Headless Mode
// =============================================================================

/// Run one turn and print the answer.
async fn run_ask(
    transport: &HttpTransport,
    model: ModelConfig,
    text: String,
    files: Vec<PathBuf>,
    no_stream: bool,
) -> anyhow::Result<ExitCode> {
    let mut conversation = ConversationState::new();
    let mut staging = AttachmentStaging::new();
    let mut turn = TurnController::new();

    let offered = files.len();
    if let Some(missing) = files.iter().find(|p| !p.is_file()) {
        anyhow::bail!("no such file: {}", missing.display());
    }
    let accepted = staging.add(ingest::candidates(files));
    if accepted < offered {
        eprintln!(
            "skipped {} file(s): only images and PDFs are accepted",
            offered - accepted
        );
    }

    let mut input = text;
    let Some(request) = turn.begin(&mut conversation, &mut input, &mut staging, &model) else {
        anyhow::bail!("nothing to send: empty message and no attachments");
    };

    let outcome = if no_stream {
        let (mut out, mut meta) = (std::io::stdout(), std::io::stderr());
        headless::complete_answer(transport, request, &mut out, &mut meta).await
    } else {
        let outcome = headless::stream_answer(
            transport,
            request,
            &mut turn,
            &mut conversation,
            &mut std::io::stdout(),
        )
        .await;
        println!();
        outcome
    };
    Ok(headless::finish(&outcome, &mut std::io::stderr()))
}

// =============================================================================
// TUI
// =============================================================================

/// Everything the event loop needs to start background work.
struct Backend {
    transport: Arc<HttpTransport>,
    turn_tx: mpsc::Sender<TurnEvent>,
    health_tx: mpsc::Sender<BackendHealth>,
}

impl Backend {
    /// Spawn the I/O half of a turn.
    fn start_turn(&self, request: ChatRequest) {
        let transport = Arc::clone(&self.transport);
        let tx = self.turn_tx.clone();
        tokio::spawn(async move {
            stream_turn(transport.as_ref(), request, tx).await;
        });
    }

    /// Spawn one health check.
    fn check_health(&self) {
        let transport = Arc::clone(&self.transport);
        let tx = self.health_tx.clone();
        tokio::spawn(async move {
            let health = match transport.health().await {
                Ok(true) => BackendHealth::Up,
                Ok(false) => BackendHealth::Down("health check returned ok=false".to_string()),
                Err(e) => BackendHealth::Down(e.to_string()),
            };
            let _ = tx.send(health).await;
        });
    }
}

async fn run_tui(transport: Arc<HttpTransport>, model: ModelConfig) -> anyhow::Result<()> {
    let mut session = TerminalSession::enter()?;
    let mut app = App::new(transport.config().base_url.clone(), model);
    run_event_loop(session.terminal(), &mut app, transport).await
}

/// Main event loop.
///
/// Redraws immediately on every turn event so deltas appear as they arrive.
async fn run_event_loop(
    terminal: &mut Tui,
    app: &mut App,
    transport: Arc<HttpTransport>,
) -> anyhow::Result<()> {
    let (turn_tx, mut turn_rx) = mpsc::channel::<TurnEvent>(128);
    let (health_tx, mut health_rx) = mpsc::channel::<BackendHealth>(4);
    let backend = Backend {
        transport,
        turn_tx,
        health_tx,
    };

    let mut health_interval = tokio::time::interval(HEALTH_INTERVAL);

    loop {
        app.tick_animation();
        app.prepare_frame();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.is_busy() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt, &backend);
                    }
                }
            }

            Some(event) = turn_rx.recv() => {
                if app.handle_turn_event(event) {
                    app.prepare_frame();
                    terminal.draw(|f| ui::render(f, app))?;
                }
            }

            Some(health) = health_rx.recv() => {
                app.set_backend_health(health);
            }

            _ = health_interval.tick() => {
                backend.check_health();
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle input events.
fn handle_input(app: &mut App, event: Event, backend: &Backend) {
    match event {
        Event::Key(key) => {
            if key.kind != KeyEventKind::Press {
                return;
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                app.should_quit = true;
                return;
            }
            match app.input_mode {
                InputMode::Normal => handle_normal_mode(app, key.code, key.modifiers, backend),
                InputMode::AttachingFile => handle_attach_mode(app, key.code),
            }
        }
        Event::Paste(text) => {
            if app.input_mode == InputMode::AttachingFile {
                app.insert_str(text.trim());
            } else {
                app.handle_paste(&text);
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Handle input in normal mode.
///
/// Typing goes to the input line; Esc toggles command mode.
fn handle_normal_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers, backend: &Backend) {
    if code == KeyCode::Esc {
        if app.command_mode {
            app.command_mode = false;
        } else if app.error_message.is_some() {
            app.clear_error();
        } else {
            app.command_mode = true;
        }
        return;
    }

    match code {
        KeyCode::PageUp => {
            app.scroll_chat_up(10);
            return;
        }
        KeyCode::PageDown => {
            app.scroll_chat_down(10);
            return;
        }
        _ => {}
    }

    if app.command_mode {
        handle_command_mode(app, code);
    } else {
        handle_input_mode(app, code, modifiers, backend);
    }
}

/// Handle input in command mode (Esc was pressed).
fn handle_command_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('q') => {
            app.should_quit = true;
        }
        KeyCode::Char('a') => {
            app.enter_dialog_mode(InputMode::AttachingFile);
        }
        KeyCode::Char('x') => {
            app.clear_attachments();
        }
        KeyCode::Char(c @ '1'..='9') => {
            if let Some(n) = c.to_digit(10) {
                app.remove_attachment(n as usize);
            }
        }
        KeyCode::Char('j') => {
            app.scroll_chat_down(1);
        }
        KeyCode::Char('k') => {
            app.scroll_chat_up(1);
        }
        KeyCode::Enter | KeyCode::Char('i') => {
            app.command_mode = false;
        }
        _ => {}
    }
}

/// Handle typing into the chat input.
fn handle_input_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers, backend: &Backend) {
    match code {
        KeyCode::Enter => {
            if let Some(request) = app.submit() {
                backend.start_turn(request);
            }
        }
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) => match c {
            'a' => app.move_cursor_start(),
            'e' => app.move_cursor_end(),
            'u' => app.clear_input(),
            'w' => app.delete_word(),
            _ => {}
        },
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        _ => {}
    }
}

/// Handle input in the attach-file dialog.
fn handle_attach_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Esc => {
            app.exit_dialog_mode();
        }
        KeyCode::Enter => {
            app.attach_from_dialog();
            app.exit_dialog_mode();
        }
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        _ => {}
    }
}
